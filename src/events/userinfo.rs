//! Userinfo endpoint stage contexts.

use crate::entities::{Application, Token};
use crate::events::{impl_request_context, impl_validating_context};
use crate::pipeline::{EventContext, RequestState, Resolution, ValidationState};
use crate::principal::Principal;
use crate::transaction::Transaction;

pub struct ExtractUserinfoRequestContext {
    pub transaction: Transaction,
    pub state: RequestState,
}

impl ExtractUserinfoRequestContext {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
        }
    }
}

pub struct ValidateUserinfoRequestContext {
    pub transaction: Transaction,
    pub validation: ValidationState,
    /// The principal carried by the presented access token.
    pub principal: Option<Principal>,
    pub token_entry: Option<Token>,
    pub application: Option<Application>,
}

impl ValidateUserinfoRequestContext {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            validation: ValidationState::default(),
            principal: None,
            token_entry: None,
            application: None,
        }
    }
}

pub struct HandleUserinfoRequestContext {
    pub transaction: Transaction,
    pub state: RequestState,
    pub principal: Option<Principal>,
    pub application: Option<Application>,
}

impl HandleUserinfoRequestContext {
    pub fn new(
        transaction: Transaction,
        principal: Option<Principal>,
        application: Option<Application>,
    ) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
            principal,
            application,
        }
    }
}

pub struct ApplyUserinfoResponseContext {
    pub transaction: Transaction,
    pub state: RequestState,
}

impl ApplyUserinfoResponseContext {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
        }
    }
}

impl_request_context!(
    ExtractUserinfoRequestContext,
    HandleUserinfoRequestContext,
    ApplyUserinfoResponseContext,
);
impl_validating_context!(ValidateUserinfoRequestContext);
