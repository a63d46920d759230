//! Token manager: grant lifecycle, redemption and revocation.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use rand::RngCore;

use crate::entities::{Token, TokenDescriptor, TokenStatus};
use crate::errors::{Result, ValidationError};
use crate::managers::cache::{EntityCache, fingerprint};
use crate::options::ServerOptions;
use crate::stores::TokenStore;

/// Manages token entries on top of a pluggable store.
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    cache: Option<EntityCache<Token>>,
    additional_filtering: bool,
}

impl TokenManager {
    pub fn new(store: Arc<dyn TokenStore>, options: &ServerOptions) -> Self {
        Self {
            store,
            cache: (!options.disable_entity_caching).then(EntityCache::new),
            additional_filtering: !options.disable_additional_filtering,
        }
    }

    pub async fn create(&self, descriptor: &TokenDescriptor) -> Result<Token> {
        let token = Token::from_descriptor(descriptor);
        self.validate(&token)?;
        self.store.create(&token).await?;
        self.invalidate(&token).await;
        tracing::debug!(token = %token.id, kind = %token.kind, "token created");
        Ok(token)
    }

    pub async fn update(&self, token: &mut Token) -> Result<()> {
        self.validate(token)?;
        let previous = token.regenerate_concurrency_token();
        self.store.update(token, &previous).await?;
        self.invalidate(token).await;
        Ok(())
    }

    pub async fn delete(&self, token: &Token) -> Result<()> {
        self.store.delete(&token.id, &token.concurrency_token).await?;
        self.invalidate(token).await;
        Ok(())
    }

    pub async fn count(&self) -> Result<u64> {
        self.store.count().await
    }

    pub fn list(
        &self,
        count: Option<usize>,
        offset: Option<usize>,
    ) -> BoxStream<'static, Result<Token>> {
        self.store.list(count, offset)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Token>> {
        let key = fingerprint(&["token", "by_id", id]);
        if let Some(cache) = &self.cache
            && let Some(hit) = cache.get(&key).await
        {
            return Ok(Some(hit));
        }

        let found = self
            .store
            .find_by_id(id)
            .await?
            .filter(|token| !self.additional_filtering || token.id == id);

        if let (Some(cache), Some(token)) = (&self.cache, &found) {
            cache.insert(key, token.clone()).await;
        }
        Ok(found)
    }

    /// Lookup by the opaque server-issued handle, byte-exact.
    pub async fn find_by_reference_id(&self, reference_id: &str) -> Result<Option<Token>> {
        let key = fingerprint(&["token", "by_reference_id", reference_id]);
        if let Some(cache) = &self.cache
            && let Some(hit) = cache.get(&key).await
        {
            return Ok(Some(hit));
        }

        let found = self.store.find_by_reference_id(reference_id).await?.filter(|token| {
            !self.additional_filtering || token.reference_id.as_deref() == Some(reference_id)
        });

        if let (Some(cache), Some(token)) = (&self.cache, &found) {
            cache.insert(key, token.clone()).await;
        }
        Ok(found)
    }

    pub fn find_by_authorization_id(
        &self,
        authorization_id: &str,
    ) -> BoxStream<'static, Result<Token>> {
        self.store.find_by_authorization_id(authorization_id)
    }

    pub fn find_by_application_id(&self, application_id: &str) -> BoxStream<'static, Result<Token>> {
        self.store.find_by_application_id(application_id)
    }

    /// All tokens bound to a subject, re-filtered byte-for-byte.
    pub fn find_by_subject(&self, subject: &str) -> BoxStream<'static, Result<Token>> {
        let stream = self.store.find_by_subject(subject);
        if !self.additional_filtering {
            return stream;
        }
        let subject = subject.to_string();
        stream
            .filter(move |item| {
                let keep = match item {
                    Ok(token) => token.subject.as_deref() == Some(&subject),
                    Err(_) => true,
                };
                async move { keep }
            })
            .boxed()
    }

    /// Atomically transition the token from valid to redeemed. The first
    /// caller wins; every later caller (including concurrent racers losing
    /// on the concurrency token) observes `false`.
    pub async fn try_redeem(&self, token: &mut Token) -> Result<bool> {
        if token.status != TokenStatus::Valid {
            return Ok(false);
        }
        token.status = TokenStatus::Redeemed;
        token.redemption_date = Some(Utc::now());
        match self.update(token).await {
            Ok(()) => Ok(true),
            Err(error) if error.is_concurrency() => {
                tracing::warn!(token = %token.id, "token was concurrently redeemed");
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    /// Mark the token revoked. Idempotent: revoking an already-revoked
    /// token reports success without touching the store.
    pub async fn try_revoke(&self, token: &mut Token) -> Result<bool> {
        if token.is_revoked() {
            return Ok(true);
        }
        token.status = TokenStatus::Revoked;
        match self.update(token).await {
            Ok(()) => Ok(true),
            Err(error) if error.is_concurrency() => {
                tracing::warn!(token = %token.id, "token was concurrently updated during revocation");
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    /// Revoke every token derived from the given authorization. Returns the
    /// number of tokens transitioned.
    pub async fn revoke_by_authorization_id(&self, authorization_id: &str) -> Result<u64> {
        let tokens: Vec<Token> = self
            .find_by_authorization_id(authorization_id)
            .try_collect()
            .await?;
        let mut revoked = 0u64;
        for mut token in tokens {
            if token.is_revoked() {
                continue;
            }
            if self.try_revoke(&mut token).await? {
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    /// Remove tokens that are no longer valid and were created before
    /// `threshold`.
    pub async fn prune(&self, threshold: DateTime<Utc>) -> Result<u64> {
        let removed = self.store.prune(threshold).await?;
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
        tracing::info!(removed, "tokens pruned");
        Ok(removed)
    }

    /// Generate an opaque reference handle for reference tokens.
    pub fn new_reference_id(&self) -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn validate(&self, token: &Token) -> Result<()> {
        let mut messages = Vec::new();
        if token.id.is_empty() {
            messages.push("the token identifier cannot be empty".to_string());
        }
        if messages.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(messages).into())
        }
    }

    pub fn populate_descriptor(&self, token: &Token) -> TokenDescriptor {
        TokenDescriptor::from_entity(token)
    }

    async fn invalidate(&self, token: &Token) {
        if let Some(cache) = &self.cache {
            cache
                .invalidate(&fingerprint(&["token", "by_id", &token.id]))
                .await;
            if let Some(reference_id) = token.reference_id.as_deref() {
                cache
                    .invalidate(&fingerprint(&["token", "by_reference_id", reference_id]))
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::TokenType;
    use crate::stores::MemoryStore;

    fn manager() -> TokenManager {
        TokenManager::new(Arc::new(MemoryStore::new()), &ServerOptions::default())
    }

    fn code_descriptor() -> TokenDescriptor {
        TokenDescriptor {
            application_id: Some("app-1".to_string()),
            subject: Some("alice".to_string()),
            kind: Some(TokenType::AuthorizationCode),
            expiration_date: Some(Utc::now() + chrono::Duration::minutes(5)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn redeem_twice_yields_exactly_one_success() {
        let manager = manager();
        let token = manager.create(&code_descriptor()).await.unwrap();

        let mut first = token.clone();
        let mut second = token;
        assert!(manager.try_redeem(&mut first).await.unwrap());
        // The second copy still thinks it is valid, but the store-side
        // concurrency token has moved on: first wins.
        assert!(!manager.try_redeem(&mut second).await.unwrap());
    }

    #[tokio::test]
    async fn revocation_is_idempotent() {
        let manager = manager();
        let mut token = manager.create(&code_descriptor()).await.unwrap();

        assert!(manager.try_revoke(&mut token).await.unwrap());
        assert!(token.is_revoked());
        assert!(manager.try_revoke(&mut token).await.unwrap());
        assert!(token.is_revoked());
    }

    #[tokio::test]
    async fn revoke_by_authorization_cascades() {
        let manager = manager();
        let mut descriptor = code_descriptor();
        descriptor.authorization_id = Some("auth-1".to_string());
        descriptor.kind = Some(TokenType::Access);
        manager.create(&descriptor).await.unwrap();
        descriptor.kind = Some(TokenType::Refresh);
        manager.create(&descriptor).await.unwrap();

        let revoked = manager.revoke_by_authorization_id("auth-1").await.unwrap();
        assert_eq!(revoked, 2);
        assert_eq!(manager.revoke_by_authorization_id("auth-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reference_ids_are_unique_and_url_safe() {
        let manager = manager();
        let a = manager.new_reference_id();
        let b = manager.new_reference_id();
        assert_ne!(a, b);
        assert!(!a.contains('+') && !a.contains('/') && !a.contains('='));
    }
}
