//! Logout endpoint stage contexts.

use crate::events::{impl_request_context, impl_validating_context};
use crate::pipeline::{EventContext, RequestState, Resolution, ValidationState};
use crate::transaction::Transaction;

pub struct ExtractLogoutRequestContext {
    pub transaction: Transaction,
    pub state: RequestState,
}

impl ExtractLogoutRequestContext {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
        }
    }
}

pub struct ValidateLogoutRequestContext {
    pub transaction: Transaction,
    pub validation: ValidationState,
    /// The post-logout redirect URI that survived validation, if any was
    /// requested.
    pub post_logout_redirect_uri: Option<String>,
}

impl ValidateLogoutRequestContext {
    pub fn new(transaction: Transaction) -> Self {
        let post_logout_redirect_uri = transaction
            .request
            .post_logout_redirect_uri()
            .map(str::to_string);
        Self {
            transaction,
            validation: ValidationState::default(),
            post_logout_redirect_uri,
        }
    }
}

/// The host decides whether the logout demand may proceed.
pub struct HandleLogoutRequestContext {
    pub transaction: Transaction,
    pub state: RequestState,
    pub is_logout_allowed: bool,
}

impl HandleLogoutRequestContext {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
            is_logout_allowed: false,
        }
    }

    pub fn allow_logout(&mut self) {
        self.is_logout_allowed = true;
    }
}

pub struct ApplyLogoutResponseContext {
    pub transaction: Transaction,
    pub state: RequestState,
}

impl ApplyLogoutResponseContext {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
        }
    }
}

impl_request_context!(
    ExtractLogoutRequestContext,
    HandleLogoutRequestContext,
    ApplyLogoutResponseContext,
);
impl_validating_context!(ValidateLogoutRequestContext);
