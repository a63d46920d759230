//! Application manager: cache-aware CRUD and client validation.

use std::sync::Arc;

use futures::stream::BoxStream;
use url::Url;

use crate::entities::{Application, ApplicationDescriptor, ClientType};
use crate::errors::{Result, ServerError, ValidationError};
use crate::managers::cache::{EntityCache, fingerprint};
use crate::options::ServerOptions;
use crate::stores::ApplicationStore;

/// Manages registered OAuth clients on top of a pluggable store.
pub struct ApplicationManager {
    store: Arc<dyn ApplicationStore>,
    cache: Option<EntityCache<Application>>,
    additional_filtering: bool,
}

impl ApplicationManager {
    pub fn new(store: Arc<dyn ApplicationStore>, options: &ServerOptions) -> Self {
        Self {
            store,
            cache: (!options.disable_entity_caching).then(EntityCache::new),
            additional_filtering: !options.disable_additional_filtering,
        }
    }

    /// Register a new application. The descriptor's plain-text secret is
    /// hashed before anything reaches the store.
    pub async fn create(&self, descriptor: &ApplicationDescriptor) -> Result<Application> {
        let secret_hash = match descriptor.client_secret.as_deref() {
            Some(secret) => Some(
                bcrypt::hash(secret, bcrypt::DEFAULT_COST)
                    .map_err(|e| ServerError::crypto(format!("secret hashing failed: {e}")))?,
            ),
            None => None,
        };

        let application = Application::from_descriptor(descriptor, secret_hash);
        self.validate(&application)?;
        self.store.create(&application).await?;
        self.invalidate(&application).await;
        tracing::debug!(client_id = %application.client_id, "application created");
        Ok(application)
    }

    /// Persist changes to an existing application. Regenerates the
    /// concurrency token; a lost update surfaces as a `Concurrency` error.
    pub async fn update(&self, application: &mut Application) -> Result<()> {
        self.validate(application)?;
        let previous = application.regenerate_concurrency_token();
        self.store.update(application, &previous).await?;
        self.invalidate(application).await;
        Ok(())
    }

    /// Apply a descriptor to an existing application and persist it.
    pub async fn update_with(
        &self,
        application: &mut Application,
        descriptor: &ApplicationDescriptor,
    ) -> Result<()> {
        application.apply_descriptor(descriptor);
        if let Some(secret) = descriptor.client_secret.as_deref() {
            application.client_secret_hash = Some(
                bcrypt::hash(secret, bcrypt::DEFAULT_COST)
                    .map_err(|e| ServerError::crypto(format!("secret hashing failed: {e}")))?,
            );
        }
        self.update(application).await
    }

    pub async fn delete(&self, application: &Application) -> Result<()> {
        self.store
            .delete(&application.id, &application.concurrency_token)
            .await?;
        self.invalidate(application).await;
        tracing::debug!(client_id = %application.client_id, "application deleted");
        Ok(())
    }

    pub async fn count(&self) -> Result<u64> {
        self.store.count().await
    }

    pub fn list(
        &self,
        count: Option<usize>,
        offset: Option<usize>,
    ) -> BoxStream<'static, Result<Application>> {
        self.store.list(count, offset)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Application>> {
        let key = fingerprint(&["application", "by_id", id]);
        if let Some(cache) = &self.cache
            && let Some(hit) = cache.get(&key).await
        {
            return Ok(Some(hit));
        }

        let found = self
            .store
            .find_by_id(id)
            .await?
            .filter(|application| !self.additional_filtering || application.id == id);

        if let (Some(cache), Some(application)) = (&self.cache, &found) {
            cache.insert(key, application.clone()).await;
        }
        Ok(found)
    }

    /// Case-sensitive client lookup, independent of backend collation.
    pub async fn find_by_client_id(&self, client_id: &str) -> Result<Option<Application>> {
        let key = fingerprint(&["application", "by_client_id", client_id]);
        if let Some(cache) = &self.cache
            && let Some(hit) = cache.get(&key).await
        {
            return Ok(Some(hit));
        }

        let found = self
            .store
            .find_by_client_id(client_id)
            .await?
            .filter(|application| !self.additional_filtering || application.client_id == client_id);

        if let (Some(cache), Some(application)) = (&self.cache, &found) {
            cache.insert(key, application.clone()).await;
        }
        Ok(found)
    }

    /// Produce the finite sequence of validation messages for an entity.
    pub fn validate(&self, application: &Application) -> Result<()> {
        let mut messages = Vec::new();

        if application.client_id.is_empty() {
            messages.push("the client identifier cannot be empty".to_string());
        }
        if application.client_type == ClientType::Confidential
            && application.client_secret_hash.is_none()
        {
            messages.push("a confidential application requires a client secret".to_string());
        }
        for uri in &application.redirect_uris {
            match Url::parse(uri) {
                Ok(parsed) if parsed.fragment().is_none() => {}
                Ok(_) => messages.push(format!("redirect URI '{uri}' must not have a fragment")),
                Err(_) => messages.push(format!("redirect URI '{uri}' is not an absolute URL")),
            }
        }

        if messages.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(messages).into())
        }
    }

    /// Compare a presented secret against the stored hash. Always `false`
    /// for public clients, which have no secret to compare.
    pub async fn validate_client_secret(
        &self,
        application: &Application,
        secret: &str,
    ) -> Result<bool> {
        let Some(hash) = application.client_secret_hash.as_deref() else {
            return Ok(false);
        };
        bcrypt::verify(secret, hash)
            .map_err(|e| ServerError::crypto(format!("secret verification failed: {e}")))
    }

    /// Exact-match redirect URI validation.
    pub fn validate_redirect_uri(&self, application: &Application, uri: &str) -> bool {
        application.has_redirect_uri(uri)
    }

    /// Applications that registered the given post-logout redirect URI,
    /// re-filtered byte-for-byte.
    pub fn find_by_post_logout_redirect_uri(
        &self,
        uri: &str,
    ) -> BoxStream<'static, Result<Application>> {
        let stream = self.store.find_by_post_logout_redirect_uri(uri);
        if !self.additional_filtering {
            return stream;
        }
        let uri = uri.to_string();
        use futures::StreamExt;
        stream
            .filter(move |item| {
                let keep = match item {
                    Ok(application) => application.has_post_logout_redirect_uri(&uri),
                    Err(_) => true,
                };
                async move { keep }
            })
            .boxed()
    }

    /// Copy the observable attributes of the entity into a descriptor.
    pub fn populate_descriptor(&self, application: &Application) -> ApplicationDescriptor {
        ApplicationDescriptor::from_entity(application)
    }

    async fn invalidate(&self, application: &Application) {
        if let Some(cache) = &self.cache {
            cache
                .invalidate(&fingerprint(&["application", "by_id", &application.id]))
                .await;
            cache
                .invalidate(&fingerprint(&[
                    "application",
                    "by_client_id",
                    &application.client_id,
                ]))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;

    fn manager() -> ApplicationManager {
        ApplicationManager::new(Arc::new(MemoryStore::new()), &ServerOptions::default())
    }

    fn descriptor(client_id: &str) -> ApplicationDescriptor {
        ApplicationDescriptor {
            client_id: Some(client_id.to_string()),
            client_secret: Some("a-sufficiently-long-client-secret".to_string()),
            client_type: Some(ClientType::Confidential),
            redirect_uris: vec!["https://app/cb".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_hashes_the_secret() {
        let manager = manager();
        let application = manager.create(&descriptor("c1")).await.unwrap();
        let hash = application.client_secret_hash.as_deref().unwrap();
        assert_ne!(hash, "a-sufficiently-long-client-secret");
        assert!(
            manager
                .validate_client_secret(&application, "a-sufficiently-long-client-secret")
                .await
                .unwrap()
        );
        assert!(
            !manager
                .validate_client_secret(&application, "wrong")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn client_id_lookup_is_case_sensitive() {
        let manager = manager();
        manager.create(&descriptor("Client-One")).await.unwrap();

        assert!(
            manager
                .find_by_client_id("Client-One")
                .await
                .unwrap()
                .is_some()
        );
        // The memory backend over-matches case-insensitively; the manager's
        // post-filter must reject it.
        assert!(
            manager
                .find_by_client_id("client-one")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn confidential_client_without_secret_fails_validation() {
        let manager = manager();
        let mut invalid = descriptor("c2");
        invalid.client_secret = None;
        let error = manager.create(&invalid).await.unwrap_err();
        assert!(matches!(error, ServerError::Validation(_)));
    }

    #[tokio::test]
    async fn cache_is_invalidated_on_update() {
        let manager = manager();
        let mut application = manager.create(&descriptor("c3")).await.unwrap();

        // Prime the cache.
        assert!(manager.find_by_client_id("c3").await.unwrap().is_some());

        application.display_name = Some("Renamed".to_string());
        manager.update(&mut application).await.unwrap();

        let reloaded = manager.find_by_client_id("c3").await.unwrap().unwrap();
        assert_eq!(reloaded.display_name.as_deref(), Some("Renamed"));
    }

    #[tokio::test]
    async fn stale_update_reports_concurrency_conflict() {
        let manager = manager();
        let application = manager.create(&descriptor("c4")).await.unwrap();

        let mut first = application.clone();
        let mut second = application;
        manager.update(&mut first).await.unwrap();

        let error = manager.update(&mut second).await.unwrap_err();
        assert!(error.is_concurrency());
    }
}
