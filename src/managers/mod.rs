//! Entity managers wrapping the abstract stores.
//!
//! Managers layer a sliding-expiration cache over the store, enforce
//! case-sensitivity independent of backend collation, and own validation,
//! pruning and revocation. The store itself remains the only component that
//! touches persistence.

mod application;
mod authorization;
mod cache;
mod scope;
mod token;

pub use application::ApplicationManager;
pub use authorization::AuthorizationManager;
pub use scope::ScopeManager;
pub use token::TokenManager;
