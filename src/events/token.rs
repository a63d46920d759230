//! Token endpoint stage contexts.

use crate::entities::{Application, Token};
use crate::events::{impl_handling_context, impl_request_context, impl_validating_context};
use crate::pipeline::{EventContext, RequestState, Resolution, ValidationState};
use crate::principal::Principal;
use crate::transaction::Transaction;

pub struct ExtractTokenRequestContext {
    pub transaction: Transaction,
    pub state: RequestState,
}

impl ExtractTokenRequestContext {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
        }
    }
}

/// Validates grant parameters and authenticates the client.
pub struct ValidateTokenRequestContext {
    pub transaction: Transaction,
    pub validation: ValidationState,
    pub client_id: Option<String>,
    /// The authenticated application, once client authentication passed.
    pub application: Option<Application>,
    /// The principal deserialized from the presented code or refresh
    /// token.
    pub principal: Option<Principal>,
    /// The token entry backing the presented code or refresh token.
    pub token_entry: Option<Token>,
}

impl ValidateTokenRequestContext {
    pub fn new(transaction: Transaction) -> Self {
        let client_id = transaction.request.client_id().map(str::to_string);
        Self {
            transaction,
            validation: ValidationState::default(),
            client_id,
            application: None,
            principal: None,
            token_entry: None,
        }
    }
}

/// Builds the principal the new grants are issued for.
pub struct HandleTokenRequestContext {
    pub transaction: Transaction,
    pub state: RequestState,
    pub validation: ValidationState,
    /// The validated application, when client authentication ran.
    pub application: Option<Application>,
    /// The principal carried over from validation (code/refresh grants).
    pub source_principal: Option<Principal>,
    /// The token entry carried over from validation.
    pub token_entry: Option<Token>,
    /// The principal the sign-in pipeline will issue tokens for.
    pub principal: Option<Principal>,
}

impl HandleTokenRequestContext {
    pub fn new(
        transaction: Transaction,
        application: Option<Application>,
        source_principal: Option<Principal>,
        token_entry: Option<Token>,
    ) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
            validation: ValidationState::default(),
            application,
            source_principal,
            token_entry,
            principal: None,
        }
    }

    pub fn sign_in(&mut self, principal: Principal) {
        self.principal = Some(principal);
    }
}

pub struct ApplyTokenResponseContext {
    pub transaction: Transaction,
    pub state: RequestState,
}

impl ApplyTokenResponseContext {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
        }
    }
}

impl_request_context!(ExtractTokenRequestContext, ApplyTokenResponseContext);
impl_handling_context!(HandleTokenRequestContext);
impl_validating_context!(ValidateTokenRequestContext);
