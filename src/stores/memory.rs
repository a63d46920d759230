//! In-memory store backend (for development/testing).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};

use crate::entities::{Application, Authorization, Scope, Token};
use crate::errors::{Result, ServerError, StorageError};
use crate::stores::{ApplicationStore, AuthorizationStore, ScopeStore, TokenStore};

/// Page size used by the prune scans.
const PRUNE_PAGE_SIZE: usize = 1_000;

/// DashMap-backed store implementing all four contracts.
///
/// Writes are atomic per entity (a shard lock is held across the
/// compare-and-swap). The authorization→token cascade is not transactional;
/// the engine has no serializable transactions, so it proceeds entity by
/// entity, the acknowledged controlled race.
#[derive(Debug, Default)]
pub struct MemoryStore {
    applications: DashMap<String, Application>,
    authorizations: DashMap<String, Authorization>,
    tokens: DashMap<String, Token>,
    scopes: DashMap<String, Scope>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn concurrency_mismatch(entity: &str) -> ServerError {
        ServerError::concurrency(format!(
            "the {entity} was concurrently updated; reload and retry"
        ))
    }
}

fn page<T: Clone + Send + 'static>(
    mut items: Vec<T>,
    count: Option<usize>,
    offset: Option<usize>,
) -> BoxStream<'static, Result<T>> {
    let offset = offset.unwrap_or(0);
    items = if offset >= items.len() {
        Vec::new()
    } else {
        items.split_off(offset)
    };
    if let Some(count) = count {
        items.truncate(count);
    }
    stream::iter(items.into_iter().map(Ok)).boxed()
}

#[async_trait]
impl ApplicationStore for MemoryStore {
    async fn count(&self) -> Result<u64> {
        Ok(self.applications.len() as u64)
    }

    async fn create(&self, application: &Application) -> Result<()> {
        self.applications
            .insert(application.id.clone(), application.clone());
        Ok(())
    }

    async fn update(
        &self,
        application: &Application,
        expected_concurrency_token: &str,
    ) -> Result<()> {
        let mut entry = self
            .applications
            .get_mut(&application.id)
            .ok_or(StorageError::NotFound)?;
        if entry.concurrency_token != expected_concurrency_token {
            return Err(Self::concurrency_mismatch("application"));
        }
        *entry = application.clone();
        Ok(())
    }

    async fn delete(&self, id: &str, expected_concurrency_token: &str) -> Result<()> {
        match self.applications.get(id) {
            Some(entry) if entry.concurrency_token != expected_concurrency_token => {
                return Err(Self::concurrency_mismatch("application"));
            }
            Some(_) => {}
            None => return Err(StorageError::NotFound.into()),
        }
        self.applications.remove(id);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Application>> {
        Ok(self.applications.get(id).map(|entry| entry.clone()))
    }

    async fn find_by_client_id(&self, client_id: &str) -> Result<Option<Application>> {
        // Simulates a case-insensitive backend collation: the manager's
        // post-filter is responsible for the byte-exact match.
        Ok(self
            .applications
            .iter()
            .find(|entry| entry.client_id.eq_ignore_ascii_case(client_id))
            .map(|entry| entry.clone()))
    }

    fn find_by_post_logout_redirect_uri(
        &self,
        uri: &str,
    ) -> BoxStream<'static, Result<Application>> {
        let items: Vec<Application> = self
            .applications
            .iter()
            .filter(|entry| {
                entry
                    .post_logout_redirect_uris
                    .iter()
                    .any(|registered| registered.eq_ignore_ascii_case(uri))
            })
            .map(|entry| entry.clone())
            .collect();
        page(items, None, None)
    }

    fn list(
        &self,
        count: Option<usize>,
        offset: Option<usize>,
    ) -> BoxStream<'static, Result<Application>> {
        let items: Vec<Application> =
            self.applications.iter().map(|entry| entry.clone()).collect();
        page(items, count, offset)
    }
}

#[async_trait]
impl AuthorizationStore for MemoryStore {
    async fn count(&self) -> Result<u64> {
        Ok(self.authorizations.len() as u64)
    }

    async fn create(&self, authorization: &Authorization) -> Result<()> {
        self.authorizations
            .insert(authorization.id.clone(), authorization.clone());
        Ok(())
    }

    async fn update(
        &self,
        authorization: &Authorization,
        expected_concurrency_token: &str,
    ) -> Result<()> {
        let mut entry = self
            .authorizations
            .get_mut(&authorization.id)
            .ok_or(StorageError::NotFound)?;
        if entry.concurrency_token != expected_concurrency_token {
            return Err(Self::concurrency_mismatch("authorization"));
        }
        *entry = authorization.clone();
        Ok(())
    }

    async fn delete(&self, id: &str, expected_concurrency_token: &str) -> Result<()> {
        match self.authorizations.get(id) {
            Some(entry) if entry.concurrency_token != expected_concurrency_token => {
                return Err(Self::concurrency_mismatch("authorization"));
            }
            Some(_) => {}
            None => return Err(StorageError::NotFound.into()),
        }
        self.authorizations.remove(id);

        // Cascade to the tokens referring to this authorization.
        let orphaned: Vec<String> = self
            .tokens
            .iter()
            .filter(|entry| entry.authorization_id.as_deref() == Some(id))
            .map(|entry| entry.id.clone())
            .collect();
        for token_id in orphaned {
            self.tokens.remove(&token_id);
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Authorization>> {
        Ok(self.authorizations.get(id).map(|entry| entry.clone()))
    }

    fn find_by_application_id(
        &self,
        application_id: &str,
    ) -> BoxStream<'static, Result<Authorization>> {
        let items: Vec<Authorization> = self
            .authorizations
            .iter()
            .filter(|entry| entry.application_id.as_deref() == Some(application_id))
            .map(|entry| entry.clone())
            .collect();
        page(items, None, None)
    }

    fn find_by_subject_and_client(
        &self,
        subject: &str,
        application_id: &str,
    ) -> BoxStream<'static, Result<Authorization>> {
        let items: Vec<Authorization> = self
            .authorizations
            .iter()
            .filter(|entry| {
                entry.application_id.as_deref() == Some(application_id)
                    && entry
                        .subject
                        .as_deref()
                        .is_some_and(|value| value.eq_ignore_ascii_case(subject))
            })
            .map(|entry| entry.clone())
            .collect();
        page(items, None, None)
    }

    fn list(
        &self,
        count: Option<usize>,
        offset: Option<usize>,
    ) -> BoxStream<'static, Result<Authorization>> {
        let items: Vec<Authorization> = self
            .authorizations
            .iter()
            .map(|entry| entry.clone())
            .collect();
        page(items, count, offset)
    }

    async fn prune(&self, threshold: DateTime<Utc>) -> Result<u64> {
        let ids: Vec<String> = self
            .authorizations
            .iter()
            .map(|entry| entry.id.clone())
            .collect();

        let mut removed = 0u64;
        let mut pages = 0usize;
        let mut failures: Vec<String> = Vec::new();

        for chunk in ids.chunks(PRUNE_PAGE_SIZE) {
            pages += 1;
            match self.prune_page(chunk, threshold).await {
                Ok(count) => removed += count,
                Err(error) => failures.push(error.to_string()),
            }
        }

        if failures.is_empty() {
            Ok(removed)
        } else {
            Err(StorageError::Partial {
                pages,
                failures: failures.len(),
                messages: failures,
            }
            .into())
        }
    }
}

impl MemoryStore {
    async fn prune_page(&self, ids: &[String], threshold: DateTime<Utc>) -> Result<u64> {
        let mut removed = 0u64;
        for id in ids {
            let Some(authorization) = self.authorizations.get(id).map(|entry| entry.clone())
            else {
                continue;
            };
            if authorization.creation_date >= threshold {
                continue;
            }

            let prunable = !authorization.is_valid()
                || (authorization.is_ad_hoc() && !self.has_live_token(id));
            if !prunable {
                continue;
            }

            let token = authorization.concurrency_token.clone();
            AuthorizationStore::delete(self, id, &token).await?;
            removed += 1;
        }
        Ok(removed)
    }

    fn has_live_token(&self, authorization_id: &str) -> bool {
        self.tokens.iter().any(|entry| {
            entry.authorization_id.as_deref() == Some(authorization_id) && entry.is_valid()
        })
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn count(&self) -> Result<u64> {
        Ok(self.tokens.len() as u64)
    }

    async fn create(&self, token: &Token) -> Result<()> {
        self.tokens.insert(token.id.clone(), token.clone());
        Ok(())
    }

    async fn update(&self, token: &Token, expected_concurrency_token: &str) -> Result<()> {
        let mut entry = self.tokens.get_mut(&token.id).ok_or(StorageError::NotFound)?;
        if entry.concurrency_token != expected_concurrency_token {
            return Err(Self::concurrency_mismatch("token"));
        }
        *entry = token.clone();
        Ok(())
    }

    async fn delete(&self, id: &str, expected_concurrency_token: &str) -> Result<()> {
        match self.tokens.get(id) {
            Some(entry) if entry.concurrency_token != expected_concurrency_token => {
                return Err(Self::concurrency_mismatch("token"));
            }
            Some(_) => {}
            None => return Err(StorageError::NotFound.into()),
        }
        self.tokens.remove(id);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Token>> {
        Ok(self.tokens.get(id).map(|entry| entry.clone()))
    }

    async fn find_by_reference_id(&self, reference_id: &str) -> Result<Option<Token>> {
        Ok(self
            .tokens
            .iter()
            .find(|entry| {
                entry
                    .reference_id
                    .as_deref()
                    .is_some_and(|value| value.eq_ignore_ascii_case(reference_id))
            })
            .map(|entry| entry.clone()))
    }

    fn find_by_authorization_id(
        &self,
        authorization_id: &str,
    ) -> BoxStream<'static, Result<Token>> {
        let items: Vec<Token> = self
            .tokens
            .iter()
            .filter(|entry| entry.authorization_id.as_deref() == Some(authorization_id))
            .map(|entry| entry.clone())
            .collect();
        page(items, None, None)
    }

    fn find_by_application_id(&self, application_id: &str) -> BoxStream<'static, Result<Token>> {
        let items: Vec<Token> = self
            .tokens
            .iter()
            .filter(|entry| entry.application_id.as_deref() == Some(application_id))
            .map(|entry| entry.clone())
            .collect();
        page(items, None, None)
    }

    fn find_by_subject(&self, subject: &str) -> BoxStream<'static, Result<Token>> {
        let items: Vec<Token> = self
            .tokens
            .iter()
            .filter(|entry| {
                entry
                    .subject
                    .as_deref()
                    .is_some_and(|value| value.eq_ignore_ascii_case(subject))
            })
            .map(|entry| entry.clone())
            .collect();
        page(items, None, None)
    }

    fn list(
        &self,
        count: Option<usize>,
        offset: Option<usize>,
    ) -> BoxStream<'static, Result<Token>> {
        let items: Vec<Token> = self.tokens.iter().map(|entry| entry.clone()).collect();
        page(items, count, offset)
    }

    async fn prune(&self, threshold: DateTime<Utc>) -> Result<u64> {
        let prunable: Vec<String> = self
            .tokens
            .iter()
            .filter(|entry| entry.creation_date < threshold && !entry.is_valid())
            .map(|entry| entry.id.clone())
            .collect();
        let mut removed = 0u64;
        for id in prunable {
            if self.tokens.remove(&id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl ScopeStore for MemoryStore {
    async fn count(&self) -> Result<u64> {
        Ok(self.scopes.len() as u64)
    }

    async fn create(&self, scope: &Scope) -> Result<()> {
        self.scopes.insert(scope.id.clone(), scope.clone());
        Ok(())
    }

    async fn update(&self, scope: &Scope, expected_concurrency_token: &str) -> Result<()> {
        let mut entry = self.scopes.get_mut(&scope.id).ok_or(StorageError::NotFound)?;
        if entry.concurrency_token != expected_concurrency_token {
            return Err(Self::concurrency_mismatch("scope"));
        }
        *entry = scope.clone();
        Ok(())
    }

    async fn delete(&self, id: &str, expected_concurrency_token: &str) -> Result<()> {
        match self.scopes.get(id) {
            Some(entry) if entry.concurrency_token != expected_concurrency_token => {
                return Err(Self::concurrency_mismatch("scope"));
            }
            Some(_) => {}
            None => return Err(StorageError::NotFound.into()),
        }
        self.scopes.remove(id);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Scope>> {
        Ok(self.scopes.get(id).map(|entry| entry.clone()))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Scope>> {
        Ok(self
            .scopes
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
            .map(|entry| entry.clone()))
    }

    fn find_by_names(&self, names: &[String]) -> BoxStream<'static, Result<Scope>> {
        let items: Vec<Scope> = self
            .scopes
            .iter()
            .filter(|entry| names.iter().any(|name| entry.name.eq_ignore_ascii_case(name)))
            .map(|entry| entry.clone())
            .collect();
        page(items, None, None)
    }

    fn list(
        &self,
        count: Option<usize>,
        offset: Option<usize>,
    ) -> BoxStream<'static, Result<Scope>> {
        let items: Vec<Scope> = self.scopes.iter().map(|entry| entry.clone()).collect();
        page(items, count, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        AuthorizationDescriptor, AuthorizationStatus, AuthorizationType, TokenDescriptor,
        TokenStatus, TokenType,
    };

    fn ad_hoc_authorization() -> Authorization {
        Authorization::from_descriptor(&AuthorizationDescriptor {
            application_id: Some("app-1".to_string()),
            subject: Some("alice".to_string()),
            kind: Some(AuthorizationType::AdHoc),
            scopes: vec!["openid".to_string()],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn conditional_update_detects_lost_writes() {
        let store = MemoryStore::new();
        let mut authorization = ad_hoc_authorization();
        AuthorizationStore::create(&store, &authorization)
            .await
            .unwrap();

        let stale = authorization.concurrency_token.clone();
        let previous = authorization.regenerate_concurrency_token();
        assert_eq!(stale, previous);
        AuthorizationStore::update(&store, &authorization, &previous)
            .await
            .unwrap();

        // A second writer holding the stale token must fail.
        authorization.status = AuthorizationStatus::Revoked;
        let error = AuthorizationStore::update(&store, &authorization, &stale)
            .await
            .unwrap_err();
        assert!(error.is_concurrency());
    }

    #[tokio::test]
    async fn authorization_delete_cascades_to_tokens() {
        let store = MemoryStore::new();
        let authorization = ad_hoc_authorization();
        AuthorizationStore::create(&store, &authorization)
            .await
            .unwrap();

        let token = Token::from_descriptor(&TokenDescriptor {
            authorization_id: Some(authorization.id.clone()),
            kind: Some(TokenType::Access),
            ..Default::default()
        });
        TokenStore::create(&store, &token).await.unwrap();

        AuthorizationStore::delete(&store, &authorization.id, &authorization.concurrency_token)
            .await
            .unwrap();
        assert!(
            TokenStore::find_by_id(&store, &token.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn prune_removes_ad_hoc_authorizations_without_live_tokens() {
        let store = MemoryStore::new();

        let mut stale = ad_hoc_authorization();
        stale.creation_date = Utc::now() - chrono::Duration::days(30);
        AuthorizationStore::create(&store, &stale).await.unwrap();

        let expired_token = Token::from_descriptor(&TokenDescriptor {
            authorization_id: Some(stale.id.clone()),
            kind: Some(TokenType::Access),
            status: Some(TokenStatus::Valid),
            expiration_date: Some(Utc::now() - chrono::Duration::hours(1)),
            ..Default::default()
        });
        TokenStore::create(&store, &expired_token).await.unwrap();

        let mut live = ad_hoc_authorization();
        live.creation_date = Utc::now() - chrono::Duration::days(30);
        AuthorizationStore::create(&store, &live).await.unwrap();
        let live_token = Token::from_descriptor(&TokenDescriptor {
            authorization_id: Some(live.id.clone()),
            kind: Some(TokenType::Refresh),
            expiration_date: Some(Utc::now() + chrono::Duration::days(1)),
            ..Default::default()
        });
        TokenStore::create(&store, &live_token).await.unwrap();

        let removed = AuthorizationStore::prune(&store, Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(
            AuthorizationStore::find_by_id(&store, &stale.id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            AuthorizationStore::find_by_id(&store, &live.id)
                .await
                .unwrap()
                .is_some()
        );
    }
}
