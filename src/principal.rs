//! The claims-carrying identity threaded through sign-in and issuance.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An authenticated identity together with the grant metadata the pipeline
/// attaches while processing a sign-in.
///
/// Hosts produce a principal from their own user store (interactive consent,
/// passthrough or programmatic grant); the server core only ever copies
/// claims out of it and binds issuance metadata onto it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    subject: Option<String>,
    claims: IndexMap<String, Value>,
    scopes: Vec<String>,
    audiences: Vec<String>,
    client_id: Option<String>,
    authorization_id: Option<String>,
    token_id: Option<String>,
    creation_date: Option<DateTime<Utc>>,
    expiration_date: Option<DateTime<Utc>>,
}

impl Principal {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            ..Self::default()
        }
    }

    /// The end-user identifier. Case-sensitive everywhere it is compared.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn set_subject(&mut self, subject: impl Into<String>) {
        self.subject = Some(subject.into());
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }

    pub fn set_claim(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.claims.insert(name.into(), value.into());
    }

    pub fn remove_claim(&mut self, name: &str) -> Option<Value> {
        self.claims.shift_remove(name)
    }

    pub fn claims(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.claims.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_claim(name, value);
        self
    }

    /// The scopes granted to this principal.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn set_scopes<I, S>(&mut self, scopes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_scopes(scopes);
        self
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|entry| entry == scope)
    }

    /// The audiences (resources) the issued tokens are valid for.
    pub fn audiences(&self) -> &[String] {
        &self.audiences
    }

    pub fn set_audiences<I, S>(&mut self, audiences: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.audiences = audiences.into_iter().map(Into::into).collect();
    }

    pub fn has_audience(&self, audience: &str) -> bool {
        self.audiences.iter().any(|entry| entry == audience)
    }

    /// The client the grant was issued to.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn set_client_id(&mut self, client_id: impl Into<String>) {
        self.client_id = Some(client_id.into());
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.set_client_id(client_id);
        self
    }

    /// The authorization entry backing this grant, once one is attached.
    pub fn authorization_id(&self) -> Option<&str> {
        self.authorization_id.as_deref()
    }

    pub fn set_authorization_id(&mut self, id: impl Into<String>) {
        self.authorization_id = Some(id.into());
    }

    /// The token entry this principal was deserialized from or serialized
    /// into.
    pub fn token_id(&self) -> Option<&str> {
        self.token_id.as_deref()
    }

    pub fn set_token_id(&mut self, id: impl Into<String>) {
        self.token_id = Some(id.into());
    }

    pub fn creation_date(&self) -> Option<DateTime<Utc>> {
        self.creation_date
    }

    pub fn set_creation_date(&mut self, date: DateTime<Utc>) {
        self.creation_date = Some(date);
    }

    pub fn expiration_date(&self) -> Option<DateTime<Utc>> {
        self.expiration_date
    }

    pub fn set_expiration_date(&mut self, date: DateTime<Utc>) {
        self.expiration_date = Some(date);
    }

    /// Whether the principal's expiration stamp is in the past.
    pub fn is_expired(&self) -> bool {
        self.expiration_date
            .is_some_and(|expiration| expiration <= Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_membership_is_byte_exact() {
        let principal = Principal::new("alice").with_scopes(vec!["openid", "Profile"]);
        assert!(principal.has_scope("Profile"));
        assert!(!principal.has_scope("profile"));
    }

    #[test]
    fn claims_preserve_insertion_order() {
        let mut principal = Principal::new("alice");
        principal.set_claim("name", "Alice");
        principal.set_claim("email", "alice@example.com");
        let names: Vec<&str> = principal.claims().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["name", "email"]);
    }
}
