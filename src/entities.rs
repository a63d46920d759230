//! Persisted entities and their descriptors.
//!
//! Identifiers are opaque strings; the store exclusively owns persistent
//! state and the managers hold transient copies per operation. Scope and
//! property sets serialize as JSON arrays/objects in single string columns
//! at the store boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A registered OAuth client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    /// Opaque entity identifier.
    pub id: String,

    /// Unique, case-sensitive client identifier.
    pub client_id: String,

    /// Hashed client secret. `None` for public clients.
    pub client_secret_hash: Option<String>,

    pub client_type: ClientType,

    pub consent_type: ConsentType,

    pub display_name: Option<String>,

    /// Redirect URIs matched by exact string equality.
    pub redirect_uris: Vec<String>,

    pub post_logout_redirect_uris: Vec<String>,

    /// Opaque permission strings naming endpoints, grant types, response
    /// types and scopes the client may use.
    pub permissions: Vec<String>,

    pub properties: HashMap<String, serde_json::Value>,

    /// Regenerated on every update; writes are conditional on the prior
    /// value.
    pub concurrency_token: String,
}

/// A long-lived consent record for a (subject, client) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authorization {
    pub id: String,

    pub application_id: Option<String>,

    /// Case-sensitive end-user identifier.
    pub subject: Option<String>,

    pub status: AuthorizationStatus,

    pub kind: AuthorizationType,

    pub scopes: Vec<String>,

    pub properties: HashMap<String, serde_json::Value>,

    pub creation_date: DateTime<Utc>,

    pub concurrency_token: String,
}

/// A short-lived or refreshable grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,

    /// Opaque server-issued handle used when reference tokens are enabled.
    pub reference_id: Option<String>,

    pub application_id: Option<String>,

    pub authorization_id: Option<String>,

    pub subject: Option<String>,

    pub kind: TokenType,

    pub status: TokenStatus,

    pub creation_date: DateTime<Utc>,

    pub expiration_date: Option<DateTime<Utc>>,

    pub redemption_date: Option<DateTime<Utc>>,

    /// Serialized token material, kept server-side.
    pub payload: Option<String>,

    pub properties: HashMap<String, serde_json::Value>,

    pub concurrency_token: String,
}

/// A named permission with its audiences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub id: String,

    /// Unique scope name.
    pub name: String,

    pub display_name: Option<String>,

    pub description: Option<String>,

    /// Audiences attached to access tokens carrying this scope.
    pub resources: Vec<String>,

    pub properties: HashMap<String, serde_json::Value>,

    pub concurrency_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Confidential,
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentType {
    Explicit,
    External,
    Implicit,
    Systematic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    Valid,
    Revoked,
}

/// Authorization kind. String comparisons against persisted values are
/// case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationType {
    AdHoc,
    Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
    AuthorizationCode,
    DeviceCode,
    UserCode,
    IdToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Valid,
    Redeemed,
    Revoked,
    Inactive,
}

impl fmt::Display for AuthorizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorizationType::AdHoc => write!(f, "ad_hoc"),
            AuthorizationType::Permanent => write!(f, "permanent"),
        }
    }
}

impl FromStr for AuthorizationType {
    type Err = ();

    // Case-insensitive on purpose: persisted values may come from backends
    // with mixed collation history.
    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "ad_hoc" | "adhoc" => Ok(AuthorizationType::AdHoc),
            "permanent" => Ok(AuthorizationType::Permanent),
            _ => Err(()),
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
            TokenType::AuthorizationCode => "authorization_code",
            TokenType::DeviceCode => "device_code",
            TokenType::UserCode => "user_code",
            TokenType::IdToken => "id_token",
        };
        write!(f, "{value}")
    }
}

fn new_concurrency_token() -> String {
    Uuid::new_v4().to_string()
}

impl Application {
    /// Build a new application entity from a descriptor. The secret, when
    /// present, must already be hashed by the caller.
    pub fn from_descriptor(descriptor: &ApplicationDescriptor, secret_hash: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            client_id: descriptor.client_id.clone().unwrap_or_default(),
            client_secret_hash: secret_hash,
            client_type: descriptor.client_type.unwrap_or(ClientType::Public),
            consent_type: descriptor.consent_type.unwrap_or(ConsentType::Explicit),
            display_name: descriptor.display_name.clone(),
            redirect_uris: descriptor.redirect_uris.clone(),
            post_logout_redirect_uris: descriptor.post_logout_redirect_uris.clone(),
            permissions: descriptor.permissions.clone(),
            properties: descriptor.properties.clone(),
            concurrency_token: new_concurrency_token(),
        }
    }

    /// Copy descriptor attributes onto this entity, leaving the identifier,
    /// secret hash and concurrency token untouched.
    pub fn apply_descriptor(&mut self, descriptor: &ApplicationDescriptor) {
        if let Some(client_id) = &descriptor.client_id {
            self.client_id = client_id.clone();
        }
        if let Some(client_type) = descriptor.client_type {
            self.client_type = client_type;
        }
        if let Some(consent_type) = descriptor.consent_type {
            self.consent_type = consent_type;
        }
        self.display_name = descriptor.display_name.clone();
        self.redirect_uris = descriptor.redirect_uris.clone();
        self.post_logout_redirect_uris = descriptor.post_logout_redirect_uris.clone();
        self.permissions = descriptor.permissions.clone();
        self.properties = descriptor.properties.clone();
    }

    pub fn is_confidential(&self) -> bool {
        self.client_type == ClientType::Confidential
    }

    pub fn is_public(&self) -> bool {
        self.client_type == ClientType::Public
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|entry| entry == permission)
    }

    /// Exact, case-sensitive redirect URI membership.
    pub fn has_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|entry| entry == uri)
    }

    pub fn has_post_logout_redirect_uri(&self, uri: &str) -> bool {
        self.post_logout_redirect_uris.iter().any(|entry| entry == uri)
    }

    /// Bump the concurrency token ahead of a conditional write.
    pub fn regenerate_concurrency_token(&mut self) -> String {
        std::mem::replace(&mut self.concurrency_token, new_concurrency_token())
    }
}

impl Authorization {
    pub fn from_descriptor(descriptor: &AuthorizationDescriptor) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            application_id: descriptor.application_id.clone(),
            subject: descriptor.subject.clone(),
            status: descriptor.status.unwrap_or(AuthorizationStatus::Valid),
            kind: descriptor.kind.unwrap_or(AuthorizationType::Permanent),
            scopes: descriptor.scopes.clone(),
            properties: descriptor.properties.clone(),
            creation_date: Utc::now(),
            concurrency_token: new_concurrency_token(),
        }
    }

    pub fn is_ad_hoc(&self) -> bool {
        self.kind == AuthorizationType::AdHoc
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == AuthorizationType::Permanent
    }

    pub fn is_revoked(&self) -> bool {
        self.status == AuthorizationStatus::Revoked
    }

    pub fn is_valid(&self) -> bool {
        self.status == AuthorizationStatus::Valid
    }

    /// Whether every entry of `scopes` is granted, byte-exact.
    pub fn has_scopes<'a, I: IntoIterator<Item = &'a str>>(&self, scopes: I) -> bool {
        scopes
            .into_iter()
            .all(|scope| self.scopes.iter().any(|entry| entry == scope))
    }

    pub fn regenerate_concurrency_token(&mut self) -> String {
        std::mem::replace(&mut self.concurrency_token, new_concurrency_token())
    }
}

impl Token {
    pub fn from_descriptor(descriptor: &TokenDescriptor) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            reference_id: descriptor.reference_id.clone(),
            application_id: descriptor.application_id.clone(),
            authorization_id: descriptor.authorization_id.clone(),
            subject: descriptor.subject.clone(),
            kind: descriptor.kind.unwrap_or(TokenType::Access),
            status: descriptor.status.unwrap_or(TokenStatus::Valid),
            creation_date: descriptor.creation_date.unwrap_or_else(Utc::now),
            expiration_date: descriptor.expiration_date,
            redemption_date: None,
            payload: descriptor.payload.clone(),
            properties: descriptor.properties.clone(),
            concurrency_token: new_concurrency_token(),
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.status == TokenStatus::Revoked
    }

    pub fn is_redeemed(&self) -> bool {
        self.status == TokenStatus::Redeemed
    }

    pub fn has_expired(&self) -> bool {
        self.expiration_date
            .is_some_and(|expiration| expiration <= Utc::now())
    }

    /// Valid status and not past expiration.
    pub fn is_valid(&self) -> bool {
        self.status == TokenStatus::Valid && !self.has_expired()
    }

    pub fn regenerate_concurrency_token(&mut self) -> String {
        std::mem::replace(&mut self.concurrency_token, new_concurrency_token())
    }
}

impl Scope {
    pub fn from_descriptor(descriptor: &ScopeDescriptor) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: descriptor.name.clone().unwrap_or_default(),
            display_name: descriptor.display_name.clone(),
            description: descriptor.description.clone(),
            resources: descriptor.resources.clone(),
            properties: descriptor.properties.clone(),
            concurrency_token: new_concurrency_token(),
        }
    }

    pub fn regenerate_concurrency_token(&mut self) -> String {
        std::mem::replace(&mut self.concurrency_token, new_concurrency_token())
    }
}

/// Mutable view used to create or update an [`Application`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationDescriptor {
    pub client_id: Option<String>,
    /// Plain-text secret; hashed by the manager before it reaches a store.
    pub client_secret: Option<String>,
    pub client_type: Option<ClientType>,
    pub consent_type: Option<ConsentType>,
    pub display_name: Option<String>,
    pub redirect_uris: Vec<String>,
    pub post_logout_redirect_uris: Vec<String>,
    pub permissions: Vec<String>,
    pub properties: HashMap<String, serde_json::Value>,
}

impl ApplicationDescriptor {
    /// Copy the observable attributes of an entity into this descriptor.
    pub fn from_entity(application: &Application) -> Self {
        Self {
            client_id: Some(application.client_id.clone()),
            client_secret: None,
            client_type: Some(application.client_type),
            consent_type: Some(application.consent_type),
            display_name: application.display_name.clone(),
            redirect_uris: application.redirect_uris.clone(),
            post_logout_redirect_uris: application.post_logout_redirect_uris.clone(),
            permissions: application.permissions.clone(),
            properties: application.properties.clone(),
        }
    }
}

/// Mutable view used to create or update an [`Authorization`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizationDescriptor {
    pub application_id: Option<String>,
    pub subject: Option<String>,
    pub status: Option<AuthorizationStatus>,
    pub kind: Option<AuthorizationType>,
    pub scopes: Vec<String>,
    pub properties: HashMap<String, serde_json::Value>,
}

impl AuthorizationDescriptor {
    pub fn from_entity(authorization: &Authorization) -> Self {
        Self {
            application_id: authorization.application_id.clone(),
            subject: authorization.subject.clone(),
            status: Some(authorization.status),
            kind: Some(authorization.kind),
            scopes: authorization.scopes.clone(),
            properties: authorization.properties.clone(),
        }
    }
}

/// Mutable view used to create or update a [`Token`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenDescriptor {
    pub reference_id: Option<String>,
    pub application_id: Option<String>,
    pub authorization_id: Option<String>,
    pub subject: Option<String>,
    pub kind: Option<TokenType>,
    pub status: Option<TokenStatus>,
    pub creation_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub payload: Option<String>,
    pub properties: HashMap<String, serde_json::Value>,
}

impl TokenDescriptor {
    pub fn from_entity(token: &Token) -> Self {
        Self {
            reference_id: token.reference_id.clone(),
            application_id: token.application_id.clone(),
            authorization_id: token.authorization_id.clone(),
            subject: token.subject.clone(),
            kind: Some(token.kind),
            status: Some(token.status),
            creation_date: Some(token.creation_date),
            expiration_date: token.expiration_date,
            payload: token.payload.clone(),
            properties: token.properties.clone(),
        }
    }
}

/// Mutable view used to create or update a [`Scope`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeDescriptor {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub resources: Vec<String>,
    pub properties: HashMap<String, serde_json::Value>,
}

impl ScopeDescriptor {
    pub fn from_entity(scope: &Scope) -> Self {
        Self {
            name: Some(scope.name.clone()),
            display_name: scope.display_name.clone(),
            description: scope.description.clone(),
            resources: scope.resources.clone(),
            properties: scope.properties.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_type_parses_case_insensitively() {
        assert_eq!(
            "AD_HOC".parse::<AuthorizationType>(),
            Ok(AuthorizationType::AdHoc)
        );
        assert_eq!(
            "Permanent".parse::<AuthorizationType>(),
            Ok(AuthorizationType::Permanent)
        );
        assert!("eternal".parse::<AuthorizationType>().is_err());
    }

    #[test]
    fn redirect_uri_match_is_exact() {
        let descriptor = ApplicationDescriptor {
            client_id: Some("c1".to_string()),
            redirect_uris: vec!["https://app/cb".to_string()],
            ..Default::default()
        };
        let application = Application::from_descriptor(&descriptor, None);
        assert!(application.has_redirect_uri("https://app/cb"));
        assert!(!application.has_redirect_uri("https://app/CB"));
        assert!(!application.has_redirect_uri("https://app/cb/"));
    }

    #[test]
    fn token_expiration_drives_validity() {
        let mut token = Token::from_descriptor(&TokenDescriptor {
            kind: Some(TokenType::AuthorizationCode),
            expiration_date: Some(Utc::now() + chrono::Duration::minutes(5)),
            ..Default::default()
        });
        assert!(token.is_valid());

        token.expiration_date = Some(Utc::now() - chrono::Duration::seconds(1));
        assert!(!token.is_valid());
        assert!(token.has_expired());

        token.expiration_date = Some(Utc::now() + chrono::Duration::minutes(5));
        token.status = TokenStatus::Revoked;
        assert!(!token.is_valid());
        assert!(token.is_revoked());
    }

    #[test]
    fn descriptor_round_trip_preserves_observable_attributes() {
        let descriptor = AuthorizationDescriptor {
            application_id: Some("app-1".to_string()),
            subject: Some("alice".to_string()),
            status: Some(AuthorizationStatus::Valid),
            kind: Some(AuthorizationType::Permanent),
            scopes: vec!["openid".to_string(), "profile".to_string()],
            properties: HashMap::new(),
        };
        let entity = Authorization::from_descriptor(&descriptor);
        let round_tripped = AuthorizationDescriptor::from_entity(&entity);
        assert_eq!(round_tripped.application_id, descriptor.application_id);
        assert_eq!(round_tripped.subject, descriptor.subject);
        assert_eq!(round_tripped.status, descriptor.status);
        assert_eq!(round_tripped.kind, descriptor.kind);
        assert_eq!(round_tripped.scopes, descriptor.scopes);
    }

    #[test]
    fn scope_subset_check_is_byte_exact() {
        let authorization = Authorization::from_descriptor(&AuthorizationDescriptor {
            scopes: vec!["openid".to_string(), "profile".to_string()],
            ..Default::default()
        });
        assert!(authorization.has_scopes(["openid"]));
        assert!(authorization.has_scopes(["openid", "profile"]));
        assert!(!authorization.has_scopes(["openid", "email"]));
        assert!(!authorization.has_scopes(["OpenID"]));
    }
}
