//! Per-request scoped state threaded through the pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::message::{Request, Response};
use crate::options::ServerOptions;

/// The endpoint a transaction was routed to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EndpointType {
    #[default]
    Unknown,
    Authorization,
    Token,
    Introspection,
    Revocation,
    Userinfo,
    Logout,
    Configuration,
    Cryptography,
}

/// HTTP method of the transport snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Other(String),
}

/// The transport-level facts a host adapter hands over when building a
/// transaction. The pipeline itself never touches the HTTP stack.
#[derive(Clone, Debug, Default)]
pub struct Transport {
    pub method: HttpMethod,
    /// URL scheme (`https`).
    pub scheme: Option<String>,
    /// Host header value, including any port.
    pub host: Option<String>,
    /// Path prefix the server is mounted under.
    pub path_base: Option<String>,
    /// Request path relative to the path base.
    pub path: Option<String>,
    /// Decoded query string pairs.
    pub query: Vec<(String, String)>,
    /// Decoded form body pairs.
    pub form: Vec<(String, String)>,
    /// Raw `Authorization` header value, when present.
    pub authorization: Option<String>,
}

/// Well-known property-bag keys used to convey cross-handler state.
pub mod property_keys {
    /// Redirect URI that survived validation, consumed when applying the
    /// authorization response.
    pub const VALIDATED_REDIRECT_URI: &str = "validated_redirect_uri";

    /// Post-logout redirect URI that survived validation.
    pub const VALIDATED_POST_LOGOUT_REDIRECT_URI: &str = "validated_post_logout_redirect_uri";

    /// Final destination computed when applying a redirect-based response.
    pub const RESPONSE_DESTINATION: &str = "response_destination";

    /// Set when the host allowed the logout demand to proceed.
    pub const LOGOUT_ALLOWED: &str = "logout_allowed";

    /// JWT form of the userinfo document, produced when the application
    /// registered for signed userinfo responses.
    pub const SIGNED_USERINFO: &str = "signed_userinfo";
}

/// Per-request scoped state: endpoint kind, request/response messages,
/// properties bag, transport snapshot, options snapshot and cancellation.
///
/// All handlers of a given transaction execute single-threadedly and
/// cooperatively; the transaction moves through the stage contexts by value.
#[derive(Debug)]
pub struct Transaction {
    pub endpoint_type: EndpointType,
    pub issuer: Option<Url>,
    pub request: Request,
    pub response: Response,
    pub properties: HashMap<String, Value>,
    pub transport: Option<Transport>,
    pub options: Arc<ServerOptions>,
    pub cancellation: CancellationToken,
}

impl Transaction {
    pub fn new(options: Arc<ServerOptions>) -> Self {
        Self {
            endpoint_type: EndpointType::Unknown,
            issuer: options.issuer.clone(),
            request: Request::default(),
            response: Response::default(),
            properties: HashMap::new(),
            transport: None,
            options,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint_type: EndpointType) -> Self {
        self.endpoint_type = endpoint_type;
        self
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Read a property from the cross-handler bag.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Read a string property from the cross-handler bag.
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Store a property in the cross-handler bag.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
    }

    /// The transport method, defaulting to GET when no transport is
    /// attached.
    pub fn method(&self) -> HttpMethod {
        self.transport
            .as_ref()
            .map(|transport| transport.method.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_round_trip() {
        let mut transaction = Transaction::new(Arc::new(ServerOptions::default()));
        transaction.set_property(property_keys::VALIDATED_REDIRECT_URI, "https://app/cb");
        assert_eq!(
            transaction.property_str(property_keys::VALIDATED_REDIRECT_URI),
            Some("https://app/cb")
        );
        assert!(transaction.property("missing").is_none());
    }

    #[test]
    fn issuer_snapshot_comes_from_options() {
        let options = ServerOptions::default().issuer(Url::parse("https://id.example.com").unwrap());
        let transaction = Transaction::new(Arc::new(options));
        assert_eq!(
            transaction.issuer.as_ref().map(Url::as_str),
            Some("https://id.example.com/")
        );
    }
}
