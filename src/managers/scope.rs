//! Scope manager: named permissions and their audiences.

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt, TryStreamExt};

use crate::entities::{Scope, ScopeDescriptor};
use crate::errors::{Result, ValidationError};
use crate::managers::cache::{EntityCache, fingerprint};
use crate::options::ServerOptions;
use crate::stores::ScopeStore;

/// Manages registered scopes on top of a pluggable store.
pub struct ScopeManager {
    store: Arc<dyn ScopeStore>,
    cache: Option<EntityCache<Scope>>,
    additional_filtering: bool,
}

impl ScopeManager {
    pub fn new(store: Arc<dyn ScopeStore>, options: &ServerOptions) -> Self {
        Self {
            store,
            cache: (!options.disable_entity_caching).then(EntityCache::new),
            additional_filtering: !options.disable_additional_filtering,
        }
    }

    pub async fn create(&self, descriptor: &ScopeDescriptor) -> Result<Scope> {
        let scope = Scope::from_descriptor(descriptor);
        self.validate(&scope)?;
        self.store.create(&scope).await?;
        self.invalidate(&scope).await;
        tracing::debug!(name = %scope.name, "scope created");
        Ok(scope)
    }

    pub async fn update(&self, scope: &mut Scope) -> Result<()> {
        self.validate(scope)?;
        let previous = scope.regenerate_concurrency_token();
        self.store.update(scope, &previous).await?;
        self.invalidate(scope).await;
        Ok(())
    }

    pub async fn delete(&self, scope: &Scope) -> Result<()> {
        self.store.delete(&scope.id, &scope.concurrency_token).await?;
        self.invalidate(scope).await;
        Ok(())
    }

    pub async fn count(&self) -> Result<u64> {
        self.store.count().await
    }

    pub fn list(
        &self,
        count: Option<usize>,
        offset: Option<usize>,
    ) -> BoxStream<'static, Result<Scope>> {
        self.store.list(count, offset)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Scope>> {
        let key = fingerprint(&["scope", "by_id", id]);
        if let Some(cache) = &self.cache
            && let Some(hit) = cache.get(&key).await
        {
            return Ok(Some(hit));
        }

        let found = self
            .store
            .find_by_id(id)
            .await?
            .filter(|scope| !self.additional_filtering || scope.id == id);

        if let (Some(cache), Some(scope)) = (&self.cache, &found) {
            cache.insert(key, scope.clone()).await;
        }
        Ok(found)
    }

    /// Case-sensitive name lookup, independent of backend collation.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Scope>> {
        let key = fingerprint(&["scope", "by_name", name]);
        if let Some(cache) = &self.cache
            && let Some(hit) = cache.get(&key).await
        {
            return Ok(Some(hit));
        }

        let found = self
            .store
            .find_by_name(name)
            .await?
            .filter(|scope| !self.additional_filtering || scope.name == name);

        if let (Some(cache), Some(scope)) = (&self.cache, &found) {
            cache.insert(key, scope.clone()).await;
        }
        Ok(found)
    }

    pub fn find_by_names(&self, names: &[String]) -> BoxStream<'static, Result<Scope>> {
        let stream = self.store.find_by_names(names);
        if !self.additional_filtering {
            return stream;
        }
        let names = names.to_vec();
        stream
            .filter(move |item| {
                let keep = match item {
                    Ok(scope) => names.iter().any(|name| *name == scope.name),
                    Err(_) => true,
                };
                async move { keep }
            })
            .boxed()
    }

    /// The union of the audiences attached to the given scopes.
    pub async fn list_resources(&self, names: &[String]) -> Result<Vec<String>> {
        let scopes: Vec<Scope> = self.find_by_names(names).try_collect().await?;
        let mut resources = Vec::new();
        for scope in scopes {
            for resource in scope.resources {
                if !resources.contains(&resource) {
                    resources.push(resource);
                }
            }
        }
        Ok(resources)
    }

    pub fn validate(&self, scope: &Scope) -> Result<()> {
        let mut messages = Vec::new();
        if scope.name.is_empty() {
            messages.push("the scope name cannot be empty".to_string());
        } else if scope.name.contains(' ') {
            messages.push(format!("scope name '{}' cannot contain spaces", scope.name));
        }
        if messages.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(messages).into())
        }
    }

    pub fn populate_descriptor(&self, scope: &Scope) -> ScopeDescriptor {
        ScopeDescriptor::from_entity(scope)
    }

    async fn invalidate(&self, scope: &Scope) {
        if let Some(cache) = &self.cache {
            cache
                .invalidate(&fingerprint(&["scope", "by_id", &scope.id]))
                .await;
            cache
                .invalidate(&fingerprint(&["scope", "by_name", &scope.name]))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;

    fn manager() -> ScopeManager {
        ScopeManager::new(Arc::new(MemoryStore::new()), &ServerOptions::default())
    }

    #[tokio::test]
    async fn name_lookup_is_case_sensitive() {
        let manager = manager();
        manager
            .create(&ScopeDescriptor {
                name: Some("OpenID".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(manager.find_by_name("OpenID").await.unwrap().is_some());
        assert!(manager.find_by_name("openid").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_resources_unions_audiences() {
        let manager = manager();
        manager
            .create(&ScopeDescriptor {
                name: Some("api.read".to_string()),
                resources: vec!["https://api".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();
        manager
            .create(&ScopeDescriptor {
                name: Some("api.write".to_string()),
                resources: vec!["https://api".to_string(), "https://admin".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();

        let resources = manager
            .list_resources(&["api.read".to_string(), "api.write".to_string()])
            .await
            .unwrap();
        assert_eq!(resources.len(), 2);
        assert!(resources.contains(&"https://api".to_string()));
        assert!(resources.contains(&"https://admin".to_string()));
    }
}
