//! Revocation endpoint stage contexts.

use crate::entities::{Application, Token};
use crate::events::{impl_request_context, impl_validating_context};
use crate::pipeline::{EventContext, RequestState, Resolution, ValidationState};
use crate::transaction::Transaction;

pub struct ExtractRevocationRequestContext {
    pub transaction: Transaction,
    pub state: RequestState,
}

impl ExtractRevocationRequestContext {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
        }
    }
}

pub struct ValidateRevocationRequestContext {
    pub transaction: Transaction,
    pub validation: ValidationState,
    pub client_id: Option<String>,
    pub application: Option<Application>,
    pub token_entry: Option<Token>,
}

impl ValidateRevocationRequestContext {
    pub fn new(transaction: Transaction) -> Self {
        let client_id = transaction.request.client_id().map(str::to_string);
        Self {
            transaction,
            validation: ValidationState::default(),
            client_id,
            application: None,
            token_entry: None,
        }
    }
}

pub struct HandleRevocationRequestContext {
    pub transaction: Transaction,
    pub state: RequestState,
    pub application: Option<Application>,
    pub token_entry: Option<Token>,
}

impl HandleRevocationRequestContext {
    pub fn new(
        transaction: Transaction,
        application: Option<Application>,
        token_entry: Option<Token>,
    ) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
            application,
            token_entry,
        }
    }
}

pub struct ApplyRevocationResponseContext {
    pub transaction: Transaction,
    pub state: RequestState,
}

impl ApplyRevocationResponseContext {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
        }
    }
}

impl_request_context!(
    ExtractRevocationRequestContext,
    HandleRevocationRequestContext,
    ApplyRevocationResponseContext,
);
impl_validating_context!(ValidateRevocationRequestContext);
