//! Abstract store contracts the entity managers depend on.
//!
//! The store is the only component that may interact with persistence.
//! Writes are atomic per entity and conditional on the caller-supplied
//! concurrency token; a mismatch surfaces as a `Concurrency` error.
//! Multi-result finders return lazy async sequences so callers can thread
//! post-filters without materializing whole result sets.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::entities::{Application, Authorization, Scope, Token};
use crate::errors::Result;

/// Persistence contract for [`Application`] entities.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn count(&self) -> Result<u64>;

    async fn create(&self, application: &Application) -> Result<()>;

    /// Conditional write: fails with a `Concurrency` error when the stored
    /// token no longer matches `expected_concurrency_token`.
    async fn update(
        &self,
        application: &Application,
        expected_concurrency_token: &str,
    ) -> Result<()>;

    async fn delete(&self, id: &str, expected_concurrency_token: &str) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Application>>;

    /// Lookup by client identifier. Backends with case-insensitive
    /// collation may over-match; the manager re-filters byte-for-byte.
    async fn find_by_client_id(&self, client_id: &str) -> Result<Option<Application>>;

    /// All applications that registered the given post-logout redirect URI.
    fn find_by_post_logout_redirect_uri(
        &self,
        uri: &str,
    ) -> BoxStream<'static, Result<Application>>;

    fn list(
        &self,
        count: Option<usize>,
        offset: Option<usize>,
    ) -> BoxStream<'static, Result<Application>>;
}

/// Persistence contract for [`Authorization`] entities.
#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    async fn count(&self) -> Result<u64>;

    async fn create(&self, authorization: &Authorization) -> Result<()>;

    async fn update(
        &self,
        authorization: &Authorization,
        expected_concurrency_token: &str,
    ) -> Result<()>;

    /// Deletes the authorization and cascades to its tokens. Engines
    /// without serializable transactions degrade to a non-atomic cascade.
    async fn delete(&self, id: &str, expected_concurrency_token: &str) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Authorization>>;

    fn find_by_application_id(
        &self,
        application_id: &str,
    ) -> BoxStream<'static, Result<Authorization>>;

    /// All authorizations for a (subject, client) pair; status, type and
    /// scope restrictions are applied by the manager post-store.
    fn find_by_subject_and_client(
        &self,
        subject: &str,
        application_id: &str,
    ) -> BoxStream<'static, Result<Authorization>>;

    fn list(
        &self,
        count: Option<usize>,
        offset: Option<usize>,
    ) -> BoxStream<'static, Result<Authorization>>;

    /// Remove invalid authorizations created before `threshold`, plus
    /// ad-hoc authorizations whose tokens are all invalid or expired.
    /// Scans in pages; per-page failures are accumulated and surfaced as an
    /// aggregate once the scan completes.
    async fn prune(&self, threshold: DateTime<Utc>) -> Result<u64>;
}

/// Persistence contract for [`Token`] entities.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn count(&self) -> Result<u64>;

    async fn create(&self, token: &Token) -> Result<()>;

    async fn update(&self, token: &Token, expected_concurrency_token: &str) -> Result<()>;

    async fn delete(&self, id: &str, expected_concurrency_token: &str) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Token>>;

    async fn find_by_reference_id(&self, reference_id: &str) -> Result<Option<Token>>;

    fn find_by_authorization_id(&self, authorization_id: &str)
    -> BoxStream<'static, Result<Token>>;

    fn find_by_application_id(&self, application_id: &str) -> BoxStream<'static, Result<Token>>;

    fn find_by_subject(&self, subject: &str) -> BoxStream<'static, Result<Token>>;

    fn list(&self, count: Option<usize>, offset: Option<usize>)
    -> BoxStream<'static, Result<Token>>;

    /// Remove tokens that are no longer valid and were created before
    /// `threshold`.
    async fn prune(&self, threshold: DateTime<Utc>) -> Result<u64>;
}

/// Persistence contract for [`Scope`] entities.
#[async_trait]
pub trait ScopeStore: Send + Sync {
    async fn count(&self) -> Result<u64>;

    async fn create(&self, scope: &Scope) -> Result<()>;

    async fn update(&self, scope: &Scope, expected_concurrency_token: &str) -> Result<()>;

    async fn delete(&self, id: &str, expected_concurrency_token: &str) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Scope>>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Scope>>;

    fn find_by_names(&self, names: &[String]) -> BoxStream<'static, Result<Scope>>;

    fn list(&self, count: Option<usize>, offset: Option<usize>)
    -> BoxStream<'static, Result<Scope>>;
}
