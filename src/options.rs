//! Server options consumed by the pipeline and the entity managers.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Immutable snapshot of the authorization server configuration.
///
/// A transaction captures an `Arc` of this at entry, so option changes never
/// affect requests already in flight.
#[derive(Clone)]
pub struct ServerOptions {
    /// Issuer identifier. When absent, it is inferred per transaction from
    /// the transport snapshot attached by the host.
    pub issuer: Option<Url>,

    /// Authorization endpoint path. `None` disables the endpoint.
    pub authorization_endpoint: Option<String>,

    /// Token endpoint path. `None` disables the endpoint.
    pub token_endpoint: Option<String>,

    /// Introspection endpoint path. `None` disables the endpoint.
    pub introspection_endpoint: Option<String>,

    /// Revocation endpoint path. `None` disables the endpoint.
    pub revocation_endpoint: Option<String>,

    /// Userinfo endpoint path. `None` disables the endpoint.
    pub userinfo_endpoint: Option<String>,

    /// Logout endpoint path. `None` disables the endpoint.
    pub logout_endpoint: Option<String>,

    /// Discovery document path. `None` disables the endpoint.
    pub configuration_endpoint: Option<String>,

    /// JWKS document path. `None` disables the endpoint.
    pub jwks_endpoint: Option<String>,

    /// Whether the authorization code flow is enabled.
    pub allow_authorization_code_flow: bool,

    /// Whether the implicit flow is enabled.
    pub allow_implicit_flow: bool,

    /// Whether the hybrid flow is enabled.
    pub allow_hybrid_flow: bool,

    /// Whether the refresh token grant is enabled.
    pub allow_refresh_token_flow: bool,

    /// Whether the client credentials grant is enabled.
    pub allow_client_credentials_flow: bool,

    /// Whether the resource owner password grant is enabled.
    pub allow_password_flow: bool,

    /// Whether the device code grant is enabled.
    pub allow_device_code_flow: bool,

    /// Require PKCE for authorization code requests.
    pub require_pkce: bool,

    /// Authorization code lifetime
    pub authorization_code_lifetime: Duration,

    /// Access token lifetime
    pub access_token_lifetime: Duration,

    /// Identity token lifetime
    pub identity_token_lifetime: Duration,

    /// Refresh token lifetime
    pub refresh_token_lifetime: Duration,

    /// Operate without the persistence layer, relying entirely on
    /// self-contained tokens for state.
    pub enable_degraded_mode: bool,

    /// Skip the scope-existence check against the scope manager.
    pub disable_scope_validation: bool,

    /// Skip endpoint permission enforcement on registered applications.
    pub ignore_endpoint_permissions: bool,

    /// Skip grant-type permission enforcement on registered applications.
    pub ignore_grant_type_permissions: bool,

    /// Skip response-type permission enforcement on registered applications.
    pub ignore_response_type_permissions: bool,

    /// Skip scope permission enforcement on registered applications.
    pub ignore_scope_permissions: bool,

    /// Do not create authorization entries on sign-in.
    pub disable_authorization_storage: bool,

    /// Do not create token entries on sign-in.
    pub disable_token_storage: bool,

    /// Disable the manager-level entity cache.
    pub disable_entity_caching: bool,

    /// Skip the byte-for-byte post-filter applied after store finders.
    /// Only safe when the backend is known to be case-sensitive.
    pub disable_additional_filtering: bool,

    /// Mark the previous refresh token redeemed when a new one is issued.
    pub use_rolling_refresh_tokens: bool,

    /// Return opaque reference handles instead of the access token payload.
    pub use_reference_access_tokens: bool,

    /// Return opaque reference handles instead of the refresh token payload.
    pub use_reference_refresh_tokens: bool,

    /// Leave the authorization response to the host application pipeline.
    pub authorization_endpoint_passthrough: bool,

    /// Leave the token response to the host application pipeline.
    pub token_endpoint_passthrough: bool,

    /// Leave the userinfo response to the host application pipeline.
    pub userinfo_endpoint_passthrough: bool,

    /// Leave the logout response to the host application pipeline.
    pub logout_endpoint_passthrough: bool,

    /// Signing credentials, most recent first. The first entry signs newly
    /// issued tokens; all entries are published through the JWKS endpoint.
    pub signing_credentials: Vec<SigningCredentials>,

    /// Claims advertised by the discovery document.
    pub claims_supported: Vec<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            issuer: None,
            authorization_endpoint: Some("/connect/authorize".to_string()),
            token_endpoint: Some("/connect/token".to_string()),
            introspection_endpoint: Some("/connect/introspect".to_string()),
            revocation_endpoint: Some("/connect/revoke".to_string()),
            userinfo_endpoint: Some("/connect/userinfo".to_string()),
            logout_endpoint: Some("/connect/logout".to_string()),
            configuration_endpoint: Some("/.well-known/openid-configuration".to_string()),
            jwks_endpoint: Some("/.well-known/jwks".to_string()),
            allow_authorization_code_flow: true,
            allow_implicit_flow: false,
            allow_hybrid_flow: false,
            allow_refresh_token_flow: true,
            allow_client_credentials_flow: true,
            allow_password_flow: false,
            allow_device_code_flow: false,
            require_pkce: false,
            authorization_code_lifetime: Duration::from_secs(300), // 5 minutes
            access_token_lifetime: Duration::from_secs(3600),      // 1 hour
            identity_token_lifetime: Duration::from_secs(1200),    // 20 minutes
            refresh_token_lifetime: Duration::from_secs(86400 * 14), // 14 days
            enable_degraded_mode: false,
            disable_scope_validation: false,
            ignore_endpoint_permissions: false,
            ignore_grant_type_permissions: false,
            ignore_response_type_permissions: false,
            ignore_scope_permissions: false,
            disable_authorization_storage: false,
            disable_token_storage: false,
            disable_entity_caching: false,
            disable_additional_filtering: false,
            use_rolling_refresh_tokens: false,
            use_reference_access_tokens: false,
            use_reference_refresh_tokens: false,
            authorization_endpoint_passthrough: false,
            token_endpoint_passthrough: false,
            userinfo_endpoint_passthrough: false,
            logout_endpoint_passthrough: false,
            signing_credentials: Vec::new(),
            claims_supported: vec![
                "sub".to_string(),
                "name".to_string(),
                "given_name".to_string(),
                "family_name".to_string(),
                "preferred_username".to_string(),
                "profile".to_string(),
                "website".to_string(),
                "birthdate".to_string(),
                "email".to_string(),
                "email_verified".to_string(),
                "phone_number".to_string(),
                "phone_number_verified".to_string(),
                "address".to_string(),
            ],
        }
    }
}

impl ServerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the issuer identifier.
    pub fn issuer(mut self, issuer: Url) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// Enable the implicit flow.
    pub fn allow_implicit_flow(mut self) -> Self {
        self.allow_implicit_flow = true;
        self
    }

    /// Enable the hybrid flow.
    pub fn allow_hybrid_flow(mut self) -> Self {
        self.allow_hybrid_flow = true;
        self
    }

    /// Enable the resource owner password grant.
    pub fn allow_password_flow(mut self) -> Self {
        self.allow_password_flow = true;
        self
    }

    /// Require PKCE on every authorization code request.
    pub fn require_pkce(mut self) -> Self {
        self.require_pkce = true;
        self
    }

    /// Set the access token lifetime.
    pub fn access_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.access_token_lifetime = lifetime;
        self
    }

    /// Set the authorization code lifetime.
    pub fn authorization_code_lifetime(mut self, lifetime: Duration) -> Self {
        self.authorization_code_lifetime = lifetime;
        self
    }

    /// Set the refresh token lifetime.
    pub fn refresh_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.refresh_token_lifetime = lifetime;
        self
    }

    /// Register signing credentials. The first registration becomes the
    /// active signing key.
    pub fn add_signing_credentials(mut self, credentials: SigningCredentials) -> Self {
        self.signing_credentials.push(credentials);
        self
    }

    /// Whether the given grant type is enabled.
    pub fn is_grant_type_allowed(&self, grant_type: &str) -> bool {
        use crate::constants::grant_types;

        match grant_type {
            grant_types::AUTHORIZATION_CODE => self.allow_authorization_code_flow,
            grant_types::CLIENT_CREDENTIALS => self.allow_client_credentials_flow,
            grant_types::DEVICE_CODE => self.allow_device_code_flow,
            grant_types::PASSWORD => self.allow_password_flow,
            grant_types::REFRESH_TOKEN => self.allow_refresh_token_flow,
            _ => false,
        }
    }

    /// The active signing credentials, if any were registered.
    pub fn active_signing_credentials(&self) -> Option<&SigningCredentials> {
        self.signing_credentials.first()
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("issuer", &self.issuer)
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("enable_degraded_mode", &self.enable_degraded_mode)
            .field("require_pkce", &self.require_pkce)
            .field("signing_credentials", &self.signing_credentials.len())
            .finish_non_exhaustive()
    }
}

/// A signing key together with its published metadata.
#[derive(Clone)]
pub struct SigningCredentials {
    /// Key identifier carried in JWT headers and the JWKS document.
    pub key_id: String,

    /// Signing algorithm.
    pub algorithm: Algorithm,

    pub(crate) encoding_key: EncodingKey,

    pub(crate) decoding_key: DecodingKey,

    /// Public key in JWK form, published by the JWKS endpoint. Symmetric
    /// keys carry `None` and are never published.
    pub public_jwk: Option<serde_json::Value>,
}

impl SigningCredentials {
    /// Symmetric HMAC-SHA256 credentials. Not published through JWKS.
    pub fn hmac(secret: &[u8], key_id: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            algorithm: Algorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            public_jwk: None,
        }
    }

    /// RSA credentials from PEM-encoded keys.
    pub fn rsa_pem(
        private_key: &[u8],
        public_key: &[u8],
        key_id: impl Into<String>,
    ) -> crate::errors::Result<Self> {
        Ok(Self {
            key_id: key_id.into(),
            algorithm: Algorithm::RS256,
            encoding_key: EncodingKey::from_rsa_pem(private_key)?,
            decoding_key: DecodingKey::from_rsa_pem(public_key)?,
            public_jwk: None,
        })
    }

    /// Attach the public JWK published by the JWKS endpoint.
    pub fn with_public_jwk(mut self, jwk: serde_json::Value) -> Self {
        self.public_jwk = Some(jwk);
        self
    }
}

impl fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}
