//! Authorization manager: consent records and their lifecycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};

use crate::entities::{
    Authorization, AuthorizationDescriptor, AuthorizationStatus, AuthorizationType,
};
use crate::errors::{Result, ValidationError};
use crate::managers::cache::{EntityCache, fingerprint};
use crate::options::ServerOptions;
use crate::stores::AuthorizationStore;

/// Manages long-lived consent records on top of a pluggable store.
pub struct AuthorizationManager {
    store: Arc<dyn AuthorizationStore>,
    cache: Option<EntityCache<Authorization>>,
    additional_filtering: bool,
}

impl AuthorizationManager {
    pub fn new(store: Arc<dyn AuthorizationStore>, options: &ServerOptions) -> Self {
        Self {
            store,
            cache: (!options.disable_entity_caching).then(EntityCache::new),
            additional_filtering: !options.disable_additional_filtering,
        }
    }

    pub async fn create(&self, descriptor: &AuthorizationDescriptor) -> Result<Authorization> {
        let authorization = Authorization::from_descriptor(descriptor);
        self.validate(&authorization)?;
        self.store.create(&authorization).await?;
        self.invalidate(&authorization).await;
        tracing::debug!(
            authorization = %authorization.id,
            subject = authorization.subject.as_deref().unwrap_or(""),
            kind = %authorization.kind,
            "authorization created"
        );
        Ok(authorization)
    }

    pub async fn update(&self, authorization: &mut Authorization) -> Result<()> {
        self.validate(authorization)?;
        let previous = authorization.regenerate_concurrency_token();
        self.store.update(authorization, &previous).await?;
        self.invalidate(authorization).await;
        Ok(())
    }

    /// Delete the authorization, cascading to its tokens.
    pub async fn delete(&self, authorization: &Authorization) -> Result<()> {
        self.store
            .delete(&authorization.id, &authorization.concurrency_token)
            .await?;
        self.invalidate(authorization).await;
        Ok(())
    }

    pub async fn count(&self) -> Result<u64> {
        self.store.count().await
    }

    pub fn list(
        &self,
        count: Option<usize>,
        offset: Option<usize>,
    ) -> BoxStream<'static, Result<Authorization>> {
        self.store.list(count, offset)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Authorization>> {
        let key = fingerprint(&["authorization", "by_id", id]);
        if let Some(cache) = &self.cache
            && let Some(hit) = cache.get(&key).await
        {
            return Ok(Some(hit));
        }

        let found = self
            .store
            .find_by_id(id)
            .await?
            .filter(|authorization| !self.additional_filtering || authorization.id == id);

        if let (Some(cache), Some(authorization)) = (&self.cache, &found) {
            cache.insert(key, authorization.clone()).await;
        }
        Ok(found)
    }

    pub fn find_by_application_id(
        &self,
        application_id: &str,
    ) -> BoxStream<'static, Result<Authorization>> {
        self.store.find_by_application_id(application_id)
    }

    /// All authorizations for a (subject, client) pair, re-filtered so the
    /// subject matches byte-for-byte regardless of backend collation.
    pub fn find(&self, subject: &str, client: &str) -> BoxStream<'static, Result<Authorization>> {
        let stream = self.store.find_by_subject_and_client(subject, client);
        if !self.additional_filtering {
            return stream;
        }
        let subject = subject.to_string();
        stream
            .filter(move |item| {
                let keep = match item {
                    Ok(authorization) => authorization.subject.as_deref() == Some(&subject),
                    Err(_) => true,
                };
                async move { keep }
            })
            .boxed()
    }

    /// [`find`](Self::find) narrowed by status, type and scope subset.
    pub fn find_filtered(
        &self,
        subject: &str,
        client: &str,
        status: Option<AuthorizationStatus>,
        kind: Option<AuthorizationType>,
        scopes: Option<Vec<String>>,
    ) -> BoxStream<'static, Result<Authorization>> {
        self.find(subject, client)
            .filter(move |item| {
                let keep = match item {
                    Ok(authorization) => {
                        status.is_none_or(|status| authorization.status == status)
                            && kind.is_none_or(|kind| authorization.kind == kind)
                            && scopes.as_ref().is_none_or(|scopes| {
                                authorization.has_scopes(scopes.iter().map(String::as_str))
                            })
                    }
                    Err(_) => true,
                };
                async move { keep }
            })
            .boxed()
    }

    /// Revoke the authorization. Returns `false` when it was already
    /// revoked or a concurrent writer got there first.
    pub async fn try_revoke(&self, authorization: &mut Authorization) -> Result<bool> {
        if authorization.is_revoked() {
            return Ok(false);
        }
        authorization.status = AuthorizationStatus::Revoked;
        match self.update(authorization).await {
            Ok(()) => Ok(true),
            Err(error) if error.is_concurrency() => {
                tracing::warn!(
                    authorization = %authorization.id,
                    "authorization was concurrently revoked"
                );
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    /// Remove invalid authorizations and ad-hoc authorizations whose tokens
    /// are all invalid or expired.
    pub async fn prune(&self, threshold: DateTime<Utc>) -> Result<u64> {
        let removed = self.store.prune(threshold).await?;
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
        tracing::info!(removed, "authorizations pruned");
        Ok(removed)
    }

    pub fn validate(&self, authorization: &Authorization) -> Result<()> {
        let mut messages = Vec::new();

        if authorization
            .subject
            .as_deref()
            .is_none_or(|subject| subject.is_empty())
        {
            messages.push("the subject cannot be empty".to_string());
        }
        for scope in &authorization.scopes {
            if scope.is_empty() {
                messages.push("scopes cannot contain empty entries".to_string());
            } else if scope.contains(' ') {
                messages.push(format!("scope '{scope}' cannot contain spaces"));
            }
        }

        if messages.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(messages).into())
        }
    }

    pub fn populate_descriptor(&self, authorization: &Authorization) -> AuthorizationDescriptor {
        AuthorizationDescriptor::from_entity(authorization)
    }

    async fn invalidate(&self, authorization: &Authorization) {
        if let Some(cache) = &self.cache {
            cache
                .invalidate(&fingerprint(&["authorization", "by_id", &authorization.id]))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use futures::TryStreamExt;

    fn manager() -> AuthorizationManager {
        AuthorizationManager::new(Arc::new(MemoryStore::new()), &ServerOptions::default())
    }

    fn descriptor(subject: &str) -> AuthorizationDescriptor {
        AuthorizationDescriptor {
            application_id: Some("app-1".to_string()),
            subject: Some(subject.to_string()),
            kind: Some(AuthorizationType::Permanent),
            scopes: vec!["openid".to_string(), "profile".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn subject_post_filter_is_byte_exact() {
        let manager = manager();
        manager.create(&descriptor("Alice")).await.unwrap();

        let exact: Vec<Authorization> =
            manager.find("Alice", "app-1").try_collect().await.unwrap();
        assert_eq!(exact.len(), 1);

        // The memory backend matches case-insensitively; the post-filter
        // must drop the result.
        let folded: Vec<Authorization> =
            manager.find("alice", "app-1").try_collect().await.unwrap();
        assert!(folded.is_empty());
    }

    #[tokio::test]
    async fn find_filtered_restricts_by_scope_subset() {
        let manager = manager();
        manager.create(&descriptor("alice")).await.unwrap();

        let hits: Vec<Authorization> = manager
            .find_filtered(
                "alice",
                "app-1",
                Some(AuthorizationStatus::Valid),
                Some(AuthorizationType::Permanent),
                Some(vec!["openid".to_string()]),
            )
            .try_collect()
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let misses: Vec<Authorization> = manager
            .find_filtered(
                "alice",
                "app-1",
                None,
                None,
                Some(vec!["email".to_string()]),
            )
            .try_collect()
            .await
            .unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn revocation_is_single_shot() {
        let manager = manager();
        let mut authorization = manager.create(&descriptor("alice")).await.unwrap();

        assert!(manager.try_revoke(&mut authorization).await.unwrap());
        assert!(!manager.try_revoke(&mut authorization).await.unwrap());
        assert!(authorization.is_revoked());
    }

    #[tokio::test]
    async fn validation_rejects_scopes_with_spaces() {
        let manager = manager();
        let mut invalid = descriptor("alice");
        invalid.scopes = vec!["open id".to_string(), String::new()];
        let error = manager.create(&invalid).await.unwrap_err();
        let rendered = error.to_string();
        assert!(rendered.contains("cannot contain spaces"));
        assert!(rendered.contains("empty"));
    }
}
