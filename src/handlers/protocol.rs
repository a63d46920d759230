//! Transaction-level handlers: issuer/endpoint inference and error
//! response assembly.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use url::Url;

use crate::constants::{errors, params};
use crate::errors::{Result, ServerError};
use crate::events::{ProcessErrorContext, ProcessRequestContext};
use crate::message::{Message, Parameter, Request};
use crate::pipeline::EventHandler;
use crate::transaction::{EndpointType, Transaction, property_keys};

/// Infers the issuer from the transport snapshot when none was configured.
pub(crate) struct InferIssuerFromHost;

#[async_trait]
impl EventHandler<ProcessRequestContext> for InferIssuerFromHost {
    async fn handle(&self, context: &mut ProcessRequestContext) -> Result<()> {
        if context.transaction.issuer.is_some() {
            return Ok(());
        }
        let Some(transport) = context.transaction.transport.as_ref() else {
            return Ok(());
        };

        let scheme = transport.scheme.as_deref().unwrap_or("https");
        let Some(host) = transport.host.as_deref().filter(|host| !host.is_empty()) else {
            return Err(ServerError::invalid_operation(
                "the issuer cannot be inferred without a host header",
            ));
        };
        let path_base = transport
            .path_base
            .as_deref()
            .unwrap_or("")
            .trim_end_matches('/');

        let candidate = format!("{scheme}://{host}{path_base}");
        let issuer = Url::parse(&candidate).map_err(|_| {
            ServerError::invalid_operation(format!("'{candidate}' is not an absolute issuer URL"))
        })?;
        if issuer.cannot_be_a_base() {
            return Err(ServerError::invalid_operation(format!(
                "'{candidate}' is not an absolute issuer URL"
            )));
        }

        context.transaction.issuer = Some(issuer);
        Ok(())
    }
}

/// Matches the request path against the configured endpoint paths when the
/// host did not route the transaction itself.
pub(crate) struct InferEndpointType;

#[async_trait]
impl EventHandler<ProcessRequestContext> for InferEndpointType {
    async fn handle(&self, context: &mut ProcessRequestContext) -> Result<()> {
        if context.transaction.endpoint_type != EndpointType::Unknown {
            return Ok(());
        }
        let Some(path) = context
            .transaction
            .transport
            .as_ref()
            .and_then(|transport| transport.path.as_deref())
        else {
            return Ok(());
        };
        let path = normalize_path(path);

        let options = context.transaction.options.clone();
        let candidates = [
            (&options.authorization_endpoint, EndpointType::Authorization),
            (&options.token_endpoint, EndpointType::Token),
            (&options.introspection_endpoint, EndpointType::Introspection),
            (&options.revocation_endpoint, EndpointType::Revocation),
            (&options.userinfo_endpoint, EndpointType::Userinfo),
            (&options.logout_endpoint, EndpointType::Logout),
            (&options.configuration_endpoint, EndpointType::Configuration),
            (&options.jwks_endpoint, EndpointType::Cryptography),
        ];
        for (configured, endpoint_type) in candidates {
            if let Some(configured) = configured.as_deref()
                && normalize_path(configured) == path
            {
                context.transaction.endpoint_type = endpoint_type;
                break;
            }
        }
        Ok(())
    }
}

fn normalize_path(path: &str) -> &str {
    let path = path.trim_end_matches('/');
    if path.is_empty() { "/" } else { path }
}

/// Copies the accumulated error triple into the response message.
pub(crate) struct AttachErrorParameters;

#[async_trait]
impl EventHandler<ProcessErrorContext> for AttachErrorParameters {
    async fn handle(&self, context: &mut ProcessErrorContext) -> Result<()> {
        let error = context.error.clone().unwrap_or_else(|| errors::SERVER_ERROR.to_string());
        tracing::info!(
            error = %error,
            endpoint = ?context.transaction.endpoint_type,
            "request rejected"
        );
        context.transaction.response.set_error(Some(&error));
        context
            .transaction
            .response
            .set_error_description(context.error_description.clone().as_deref());
        context
            .transaction
            .response
            .set_error_uri(context.error_uri.clone().as_deref());
        Ok(())
    }
}

/// For authorization-endpoint failures, the error is returned to the
/// client via redirect when the redirect URI can be trusted: either it
/// already survived validation, or it matches the registered client
/// byte-for-byte. Everything else renders locally (JSON for the
/// body-based endpoints).
pub(crate) struct AttachErrorDestination {
    pub services: SharedServices,
}

impl AttachErrorDestination {
    /// Late redirect validation for errors raised before the redirect gate
    /// ran.
    async fn trusted_redirect_uri(&self, context: &ProcessErrorContext) -> Result<Option<String>> {
        if let Some(redirect_uri) = context
            .transaction
            .property_str(property_keys::VALIDATED_REDIRECT_URI)
        {
            return Ok(Some(redirect_uri.to_string()));
        }
        let Some(applications) = self.services.applications.as_deref() else {
            return Ok(None);
        };
        let (Some(client_id), Some(redirect_uri)) = (
            context.transaction.request.client_id(),
            context.transaction.request.redirect_uri(),
        ) else {
            return Ok(None);
        };
        let Some(application) = applications.find_by_client_id(client_id).await? else {
            return Ok(None);
        };
        Ok(application
            .has_redirect_uri(redirect_uri)
            .then(|| redirect_uri.to_string()))
    }
}

#[async_trait]
impl EventHandler<ProcessErrorContext> for AttachErrorDestination {
    async fn handle(&self, context: &mut ProcessErrorContext) -> Result<()> {
        if context.transaction.endpoint_type != EndpointType::Authorization {
            return Ok(());
        }
        let Some(redirect_uri) = self.trusted_redirect_uri(context).await? else {
            return Ok(());
        };

        if let Some(state) = context.transaction.request.state().map(str::to_string) {
            context.transaction.response.set_state(Some(&state));
        }
        let destination = append_parameters(
            &redirect_uri,
            context.transaction.response.message(),
            ResponseLocation::Query,
        )?;
        context
            .transaction
            .set_property(property_keys::RESPONSE_DESTINATION, destination);
        Ok(())
    }
}

/// Where redirect-based response parameters land.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ResponseLocation {
    Query,
    Fragment,
}

/// Append the response parameters to a redirect URI, in the query string or
/// the fragment component.
pub(crate) fn append_parameters(
    redirect_uri: &str,
    message: &Message,
    location: ResponseLocation,
) -> Result<String> {
    let mut url = Url::parse(redirect_uri).map_err(|_| {
        ServerError::invalid_operation(format!("'{redirect_uri}' is not an absolute URL"))
    })?;

    match location {
        ResponseLocation::Query => {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in message.iter() {
                if let Some(value) = value.as_str() {
                    pairs.append_pair(name, value);
                }
            }
        }
        ResponseLocation::Fragment => {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (name, value) in message.iter() {
                if let Some(value) = value.as_str() {
                    serializer.append_pair(name, value);
                }
            }
            let fragment = serializer.finish();
            url.set_fragment(if fragment.is_empty() { None } else { Some(&fragment) });
        }
    }
    Ok(url.into())
}

/// Build the request message from the decoded query pairs.
pub(crate) fn extract_from_query(transaction: &mut Transaction) {
    let pairs = transaction
        .transport
        .as_ref()
        .map(|transport| transport.query.clone())
        .unwrap_or_default();
    if !pairs.is_empty() {
        transaction.request = Request::from_pairs(pairs);
    }
}

/// Build the request message from the decoded form body pairs.
pub(crate) fn extract_from_form(transaction: &mut Transaction) {
    let pairs = transaction
        .transport
        .as_ref()
        .map(|transport| transport.form.clone())
        .unwrap_or_default();
    if !pairs.is_empty() {
        transaction.request = Request::from_pairs(pairs);
    }
}

/// Fold HTTP Basic credentials into `client_id`/`client_secret` parameters
/// so the client-authentication gates see one shape regardless of how the
/// client authenticated.
pub(crate) fn extract_basic_credentials(transaction: &mut Transaction) {
    let Some(header) = transaction
        .transport
        .as_ref()
        .and_then(|transport| transport.authorization.as_deref())
    else {
        return;
    };
    let Some(encoded) = header.strip_prefix("Basic ") else {
        return;
    };
    let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
        return;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return;
    };
    let Some((client_id, client_secret)) = decoded.split_once(':') else {
        return;
    };

    let message = transaction.request.message_mut();
    message.add(params::CLIENT_ID, Parameter::from(client_id));
    message.add(params::CLIENT_SECRET, Parameter::from(client_secret));
}

/// Fold a bearer Authorization header into the `access_token` parameter.
pub(crate) fn extract_bearer_token(transaction: &mut Transaction) {
    let Some(header) = transaction
        .transport
        .as_ref()
        .and_then(|transport| transport.authorization.as_deref())
    else {
        return;
    };
    let Some(token) = header.strip_prefix("Bearer ") else {
        return;
    };
    let token = token.trim().to_string();
    transaction
        .request
        .message_mut()
        .add(params::ACCESS_TOKEN, Parameter::from(token));
}

/// Shared service handle type used by the endpoint handler constructors.
pub(crate) type SharedServices = Arc<crate::handlers::Services>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ServerOptions;
    use crate::transaction::Transport;

    fn transaction_with_transport(transport: Transport) -> Transaction {
        Transaction::new(Arc::new(ServerOptions::default())).with_transport(transport)
    }

    #[tokio::test]
    async fn issuer_is_inferred_from_scheme_host_and_path_base() {
        let transaction = transaction_with_transport(Transport {
            scheme: Some("https".to_string()),
            host: Some("id.example.com:8443".to_string()),
            path_base: Some("/auth/".to_string()),
            ..Default::default()
        });
        let mut context = ProcessRequestContext::new(transaction);
        InferIssuerFromHost.handle(&mut context).await.unwrap();
        assert_eq!(
            context.transaction.issuer.as_ref().map(Url::as_str),
            Some("https://id.example.com:8443/auth")
        );
    }

    #[tokio::test]
    async fn issuer_inference_without_host_fails() {
        let transaction = transaction_with_transport(Transport::default());
        let mut context = ProcessRequestContext::new(transaction);
        let error = InferIssuerFromHost.handle(&mut context).await.unwrap_err();
        assert!(matches!(error, ServerError::InvalidOperation { .. }));
    }

    #[tokio::test]
    async fn endpoint_type_is_inferred_from_path() {
        let transaction = transaction_with_transport(Transport {
            path: Some("/connect/token/".to_string()),
            ..Default::default()
        });
        let mut context = ProcessRequestContext::new(transaction);
        InferEndpointType.handle(&mut context).await.unwrap();
        assert_eq!(context.transaction.endpoint_type, EndpointType::Token);
    }

    #[test]
    fn fragment_parameters_do_not_touch_the_query() {
        let mut message = Message::new();
        message.add("access_token", "at");
        message.add("state", "xyz");
        let destination =
            append_parameters("https://app/cb?keep=1", &message, ResponseLocation::Fragment)
                .unwrap();
        assert_eq!(destination, "https://app/cb?keep=1#access_token=at&state=xyz");
    }

    #[test]
    fn basic_credentials_are_folded_into_parameters() {
        let mut transaction = transaction_with_transport(Transport {
            authorization: Some(format!("Basic {}", STANDARD.encode("c1:s3cret"))),
            ..Default::default()
        });
        extract_basic_credentials(&mut transaction);
        assert_eq!(transaction.request.client_id(), Some("c1"));
        assert_eq!(transaction.request.client_secret(), Some("s3cret"));
    }
}
