//! Introspection endpoint stage contexts.

use crate::entities::{Application, Token};
use crate::events::{impl_request_context, impl_validating_context};
use crate::pipeline::{EventContext, RequestState, Resolution, ValidationState};
use crate::principal::Principal;
use crate::transaction::Transaction;

pub struct ExtractIntrospectionRequestContext {
    pub transaction: Transaction,
    pub state: RequestState,
}

impl ExtractIntrospectionRequestContext {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
        }
    }
}

pub struct ValidateIntrospectionRequestContext {
    pub transaction: Transaction,
    pub validation: ValidationState,
    pub client_id: Option<String>,
    pub application: Option<Application>,
    /// The principal deserialized from the presented token, when it could
    /// be read at all.
    pub principal: Option<Principal>,
    pub token_entry: Option<Token>,
}

impl ValidateIntrospectionRequestContext {
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

pub struct HandleIntrospectionRequestContext {
    pub transaction: Transaction,
    pub state: RequestState,
    pub application: Option<Application>,
    pub principal: Option<Principal>,
    pub token_entry: Option<Token>,
}

impl HandleIntrospectionRequestContext {
    pub fn new(
        transaction: Transaction,
        application: Option<Application>,
        principal: Option<Principal>,
        token_entry: Option<Token>,
    ) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
            application,
            principal,
            token_entry,
        }
    }
}

pub struct ApplyIntrospectionResponseContext {
    pub transaction: Transaction,
    pub state: RequestState,
}

impl ApplyIntrospectionResponseContext {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
        }
    }
}

impl_request_context!(
    ExtractIntrospectionRequestContext,
    HandleIntrospectionRequestContext,
    ApplyIntrospectionResponseContext,
);
impl_validating_context!(ValidateIntrospectionRequestContext);
