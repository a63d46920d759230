//! Authorization endpoint stage contexts.

use crate::entities::Application;
use crate::events::{impl_handling_context, impl_request_context, impl_validating_context};
use crate::pipeline::{EventContext, RequestState, Resolution, ValidationState};
use crate::principal::Principal;
use crate::transaction::Transaction;

/// Populates the request message from the transport snapshot.
pub struct ExtractAuthorizationRequestContext {
    pub transaction: Transaction,
    pub state: RequestState,
}

impl ExtractAuthorizationRequestContext {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
        }
    }
}

/// Runs the authorization request through the validation gates.
pub struct ValidateAuthorizationRequestContext {
    pub transaction: Transaction,
    pub validation: ValidationState,
    pub client_id: Option<String>,
    /// The application resolved by the client-identity gate, available to
    /// the gates running after it.
    pub application: Option<Application>,
    /// The redirect URI that survived validation so far.
    pub redirect_uri: Option<String>,
}

impl ValidateAuthorizationRequestContext {
    pub fn new(transaction: Transaction) -> Self {
        let client_id = transaction.request.client_id().map(str::to_string);
        let redirect_uri = transaction.request.redirect_uri().map(str::to_string);
        Self {
            transaction,
            validation: ValidationState::default(),
            client_id,
            application: None,
            redirect_uri,
        }
    }
}

/// Gives the host the opportunity to attach a principal (interactive
/// consent, passthrough or programmatic grant).
pub struct HandleAuthorizationRequestContext {
    pub transaction: Transaction,
    pub state: RequestState,
    pub validation: ValidationState,
    pub principal: Option<Principal>,
}

impl HandleAuthorizationRequestContext {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
            validation: ValidationState::default(),
            principal: None,
        }
    }

    /// Attach the authenticated principal the grants will be issued for.
    pub fn sign_in(&mut self, principal: Principal) {
        self.principal = Some(principal);
    }
}

/// Shapes the final authorization response (redirect or form post).
pub struct ApplyAuthorizationResponseContext {
    pub transaction: Transaction,
    pub state: RequestState,
}

impl ApplyAuthorizationResponseContext {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
        }
    }
}

impl_request_context!(
    ExtractAuthorizationRequestContext,
    ApplyAuthorizationResponseContext,
);
impl_handling_context!(HandleAuthorizationRequestContext);
impl_validating_context!(ValidateAuthorizationRequestContext);
