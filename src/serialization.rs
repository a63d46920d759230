//! Token serialization contract and the default JWT implementation.
//!
//! The pipeline only ever talks to [`TokenSerializer`]; hosts can swap in
//! their own implementation (reference tokens backed by an HSM, encrypted
//! JWEs, ...) without touching the endpoint handlers.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Header, Validation, decode, decode_header, encode};
use serde_json::{Map, Value};
use url::Url;
use uuid::Uuid;

use crate::constants::{claims, token_type_hints};
use crate::errors::{Result, ServerError};
use crate::options::SigningCredentials;
use crate::principal::Principal;

/// Produces and consumes access, refresh and identity tokens and
/// authorization codes. A `deserialize_*` returning `Ok(None)` means the
/// presented material is not a token of the expected kind; the caller
/// turns that into a protocol error, never a panic.
#[async_trait]
pub trait TokenSerializer: Send + Sync {
    async fn serialize_access_token(&self, principal: &Principal) -> Result<String>;

    async fn serialize_refresh_token(&self, principal: &Principal) -> Result<String>;

    async fn serialize_identity_token(&self, principal: &Principal) -> Result<String>;

    async fn serialize_authorization_code(&self, principal: &Principal) -> Result<String>;

    async fn deserialize_access_token(&self, token: &str) -> Result<Option<Principal>>;

    async fn deserialize_refresh_token(&self, token: &str) -> Result<Option<Principal>>;

    async fn deserialize_identity_token(&self, token: &str) -> Result<Option<Principal>>;

    async fn deserialize_authorization_code(&self, token: &str) -> Result<Option<Principal>>;
}

/// Claim names owned by the serializer; everything else on a principal is
/// carried through verbatim.
const REGISTERED_CLAIMS: &[&str] = &[
    claims::ISSUER,
    claims::SUBJECT,
    claims::AUDIENCE,
    claims::EXPIRES_AT,
    claims::ISSUED_AT,
    claims::JWT_ID,
    claims::SCOPE,
    claims::CLIENT_ID,
    claims::AUTHORIZATION_ID,
    claims::TOKEN_USAGE,
    "nbf",
];

/// JWT-based [`TokenSerializer`] built on the configured signing
/// credentials.
pub struct JwtTokenSerializer {
    credentials: SigningCredentials,
    issuer: Option<Url>,
}

impl JwtTokenSerializer {
    pub fn new(credentials: SigningCredentials, issuer: Option<Url>) -> Self {
        Self { credentials, issuer }
    }

    fn serialize(&self, usage: &str, principal: &Principal) -> Result<String> {
        let mut body = Map::new();

        if let Some(issuer) = &self.issuer {
            body.insert(
                claims::ISSUER.to_string(),
                Value::String(issuer.as_str().trim_end_matches('/').to_string()),
            );
        }
        let subject = principal
            .subject()
            .ok_or_else(|| ServerError::internal("cannot serialize a principal without subject"))?;
        body.insert(claims::SUBJECT.to_string(), Value::String(subject.to_string()));

        match principal.audiences() {
            [] => {}
            [audience] => {
                body.insert(claims::AUDIENCE.to_string(), Value::String(audience.clone()));
            }
            audiences => {
                body.insert(
                    claims::AUDIENCE.to_string(),
                    Value::Array(
                        audiences
                            .iter()
                            .map(|audience| Value::String(audience.clone()))
                            .collect(),
                    ),
                );
            }
        }

        let now = Utc::now();
        body.insert(claims::ISSUED_AT.to_string(), Value::from(now.timestamp()));
        if let Some(expiration) = principal.expiration_date() {
            body.insert(claims::EXPIRES_AT.to_string(), Value::from(expiration.timestamp()));
        }

        let jti = principal
            .token_id()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        body.insert(claims::JWT_ID.to_string(), Value::String(jti));

        if !principal.scopes().is_empty() {
            body.insert(
                claims::SCOPE.to_string(),
                Value::String(principal.scopes().join(" ")),
            );
        }
        if let Some(client_id) = principal.client_id() {
            body.insert(claims::CLIENT_ID.to_string(), Value::String(client_id.to_string()));
        }
        if let Some(authorization_id) = principal.authorization_id() {
            body.insert(
                claims::AUTHORIZATION_ID.to_string(),
                Value::String(authorization_id.to_string()),
            );
        }
        body.insert(claims::TOKEN_USAGE.to_string(), Value::String(usage.to_string()));

        for (name, value) in principal.claims() {
            if !REGISTERED_CLAIMS.contains(&name) {
                body.insert(name.to_string(), value.clone());
            }
        }

        let mut header = Header::new(self.credentials.algorithm);
        header.kid = Some(self.credentials.key_id.clone());
        if usage == token_type_hints::ACCESS_TOKEN {
            header.typ = Some("at+jwt".to_string());
        }

        Ok(encode(&header, &Value::Object(body), &self.credentials.encoding_key)?)
    }

    fn deserialize(&self, usage: &str, token: &str) -> Result<Option<Principal>> {
        let Ok(header) = decode_header(token) else {
            return Ok(None);
        };
        if header.alg != self.credentials.algorithm {
            return Ok(None);
        }

        let mut validation = Validation::new(self.credentials.algorithm);
        validation.validate_aud = false;
        validation.leeway = 0;
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer.as_str().trim_end_matches('/')]);
        }

        let data = match decode::<Map<String, Value>>(
            token,
            &self.credentials.decoding_key,
            &validation,
        ) {
            Ok(data) => data,
            Err(error) => {
                tracing::debug!(%error, "token rejected during deserialization");
                return Ok(None);
            }
        };
        let body = data.claims;

        // A token presented at the wrong seam (a refresh token where a
        // code is expected, ...) is not valid there.
        if body.get(claims::TOKEN_USAGE).and_then(Value::as_str) != Some(usage) {
            return Ok(None);
        }
        let Some(subject) = body.get(claims::SUBJECT).and_then(Value::as_str) else {
            return Ok(None);
        };

        let mut principal = Principal::new(subject);
        if let Some(scope) = body.get(claims::SCOPE).and_then(Value::as_str) {
            principal.set_scopes(scope.split(' ').filter(|entry| !entry.is_empty()));
        }
        match body.get(claims::AUDIENCE) {
            Some(Value::String(audience)) => principal.set_audiences([audience.clone()]),
            Some(Value::Array(values)) => principal.set_audiences(
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string),
            ),
            _ => {}
        }
        if let Some(client_id) = body.get(claims::CLIENT_ID).and_then(Value::as_str) {
            principal.set_client_id(client_id);
        }
        if let Some(authorization_id) = body.get(claims::AUTHORIZATION_ID).and_then(Value::as_str) {
            principal.set_authorization_id(authorization_id);
        }
        if let Some(jti) = body.get(claims::JWT_ID).and_then(Value::as_str) {
            principal.set_token_id(jti);
        }
        if let Some(issued_at) = timestamp(&body, claims::ISSUED_AT) {
            principal.set_creation_date(issued_at);
        }
        if let Some(expires_at) = timestamp(&body, claims::EXPIRES_AT) {
            principal.set_expiration_date(expires_at);
        }

        for (name, value) in body {
            if !REGISTERED_CLAIMS.contains(&name.as_str()) {
                principal.set_claim(name, value);
            }
        }

        Ok(Some(principal))
    }
}

fn timestamp(body: &Map<String, Value>, claim: &str) -> Option<DateTime<Utc>> {
    body.get(claim)
        .and_then(Value::as_i64)
        .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single())
}

#[async_trait]
impl TokenSerializer for JwtTokenSerializer {
    async fn serialize_access_token(&self, principal: &Principal) -> Result<String> {
        self.serialize(token_type_hints::ACCESS_TOKEN, principal)
    }

    async fn serialize_refresh_token(&self, principal: &Principal) -> Result<String> {
        self.serialize(token_type_hints::REFRESH_TOKEN, principal)
    }

    async fn serialize_identity_token(&self, principal: &Principal) -> Result<String> {
        self.serialize(token_type_hints::ID_TOKEN, principal)
    }

    async fn serialize_authorization_code(&self, principal: &Principal) -> Result<String> {
        self.serialize(token_type_hints::AUTHORIZATION_CODE, principal)
    }

    async fn deserialize_access_token(&self, token: &str) -> Result<Option<Principal>> {
        self.deserialize(token_type_hints::ACCESS_TOKEN, token)
    }

    async fn deserialize_refresh_token(&self, token: &str) -> Result<Option<Principal>> {
        self.deserialize(token_type_hints::REFRESH_TOKEN, token)
    }

    async fn deserialize_identity_token(&self, token: &str) -> Result<Option<Principal>> {
        self.deserialize(token_type_hints::ID_TOKEN, token)
    }

    async fn deserialize_authorization_code(&self, token: &str) -> Result<Option<Principal>> {
        self.deserialize(token_type_hints::AUTHORIZATION_CODE, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serializer() -> JwtTokenSerializer {
        JwtTokenSerializer::new(
            SigningCredentials::hmac(b"test-signing-key-32-bytes-long!!", "test-key"),
            Some(Url::parse("https://id.example.com").unwrap()),
        )
    }

    fn principal() -> Principal {
        let mut principal = Principal::new("alice")
            .with_client_id("c1")
            .with_scopes(vec!["openid", "profile"])
            .with_claim("email", "alice@example.com");
        principal.set_authorization_id("auth-1");
        principal.set_token_id("token-1");
        principal.set_expiration_date(Utc::now() + chrono::Duration::hours(1));
        principal
    }

    #[tokio::test]
    async fn access_token_round_trip() {
        let serializer = serializer();
        let token = serializer
            .serialize_access_token(&principal())
            .await
            .unwrap();

        let restored = serializer
            .deserialize_access_token(&token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(restored.subject(), Some("alice"));
        assert_eq!(restored.client_id(), Some("c1"));
        assert_eq!(restored.authorization_id(), Some("auth-1"));
        assert_eq!(restored.token_id(), Some("token-1"));
        assert_eq!(restored.scopes(), ["openid", "profile"]);
        assert_eq!(restored.claim_str("email"), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn usage_mismatch_is_rejected() {
        let serializer = serializer();
        let code = serializer
            .serialize_authorization_code(&principal())
            .await
            .unwrap();

        assert!(
            serializer
                .deserialize_access_token(&code)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            serializer
                .deserialize_authorization_code(&code)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let serializer = serializer();
        let mut stale = principal();
        stale.set_expiration_date(Utc::now() - chrono::Duration::minutes(5));
        let token = serializer.serialize_access_token(&stale).await.unwrap();

        assert!(
            serializer
                .deserialize_access_token(&token)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn tampered_token_is_rejected() {
        let serializer = serializer();
        let token = serializer
            .serialize_access_token(&principal())
            .await
            .unwrap();
        let mut tampered = token.into_bytes();
        let last = tampered.len() - 1;
        tampered[last] = if tampered[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(tampered).unwrap();

        assert!(
            serializer
                .deserialize_access_token(&tampered)
                .await
                .unwrap()
                .is_none()
        );
    }
}
