//! Event context types, one per pipeline stage and endpoint.
//!
//! The transaction moves through the stage contexts by value: each stage
//! consumes the previous context and hands the transaction to the next one.

pub mod authorization;
pub mod discovery;
pub mod introspection;
pub mod logout;
pub mod revocation;
pub mod token;
pub mod userinfo;

use crate::pipeline::{EventContext, RequestState, Resolution};
use crate::principal::Principal;
use crate::transaction::Transaction;

macro_rules! impl_request_context {
    ($($type:ty),* $(,)?) => {
        $(
            impl EventContext for $type {
                fn transaction(&self) -> &Transaction {
                    &self.transaction
                }

                fn transaction_mut(&mut self) -> &mut Transaction {
                    &mut self.transaction
                }

                fn resolution(&self) -> Resolution {
                    self.state.resolution()
                }
            }
        )*
    };
}

macro_rules! impl_validating_context {
    ($($type:ty),* $(,)?) => {
        $(
            impl EventContext for $type {
                fn transaction(&self) -> &Transaction {
                    &self.transaction
                }

                fn transaction_mut(&mut self) -> &mut Transaction {
                    &mut self.transaction
                }

                fn resolution(&self) -> Resolution {
                    self.validation.resolution()
                }
            }
        )*
    };
}

/// Handle-stage contexts can both short-circuit like a request context and
/// reject like a validating context (e.g. a lost code-redemption race).
macro_rules! impl_handling_context {
    ($($type:ty),* $(,)?) => {
        $(
            impl EventContext for $type {
                fn transaction(&self) -> &Transaction {
                    &self.transaction
                }

                fn transaction_mut(&mut self) -> &mut Transaction {
                    &mut self.transaction
                }

                fn resolution(&self) -> Resolution {
                    if self.validation.is_rejected() {
                        Resolution::Rejected
                    } else {
                        self.state.resolution()
                    }
                }
            }
        )*
    };
}

pub(crate) use impl_handling_context;
pub(crate) use impl_request_context;
pub(crate) use impl_validating_context;

/// Outermost event raised for every incoming transaction.
pub struct ProcessRequestContext {
    pub transaction: Transaction,
    pub state: RequestState,
}

impl ProcessRequestContext {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
        }
    }
}

/// Raised when any stage rejected the request; assembles the error
/// response.
pub struct ProcessErrorContext {
    pub transaction: Transaction,
    pub state: RequestState,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub error_uri: Option<String>,
}

impl ProcessErrorContext {
    pub fn new(
        transaction: Transaction,
        error: Option<String>,
        error_description: Option<String>,
        error_uri: Option<String>,
    ) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
            error,
            error_description,
            error_uri,
        }
    }
}

/// Raised when a handler attached a principal: creates the entities and
/// issues the grants the response will carry.
pub struct ProcessSigninContext {
    pub transaction: Transaction,
    pub state: RequestState,
    pub principal: Principal,
    /// The application entity the grant is issued to, resolved while
    /// processing the sign-in (absent in degraded mode).
    pub application: Option<crate::entities::Application>,
}

impl ProcessSigninContext {
    pub fn new(transaction: Transaction, principal: Principal) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
            principal,
            application: None,
        }
    }
}

/// Raised when a logout demand was allowed to proceed.
pub struct ProcessSignoutContext {
    pub transaction: Transaction,
    pub state: RequestState,
}

impl ProcessSignoutContext {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: RequestState::default(),
        }
    }
}

impl_request_context!(
    ProcessRequestContext,
    ProcessErrorContext,
    ProcessSigninContext,
    ProcessSignoutContext,
);

// Re-exported so hosts registering custom handlers see one flat namespace.
pub use authorization::{
    ApplyAuthorizationResponseContext, ExtractAuthorizationRequestContext,
    HandleAuthorizationRequestContext, ValidateAuthorizationRequestContext,
};
pub use discovery::{
    ApplyConfigurationResponseContext, ApplyJwksResponseContext,
    ExtractConfigurationRequestContext, ExtractJwksRequestContext,
    HandleConfigurationRequestContext, HandleJwksRequestContext,
};
pub use introspection::{
    ApplyIntrospectionResponseContext, ExtractIntrospectionRequestContext,
    HandleIntrospectionRequestContext, ValidateIntrospectionRequestContext,
};
pub use logout::{
    ApplyLogoutResponseContext, ExtractLogoutRequestContext, HandleLogoutRequestContext,
    ValidateLogoutRequestContext,
};
pub use revocation::{
    ApplyRevocationResponseContext, ExtractRevocationRequestContext,
    HandleRevocationRequestContext, ValidateRevocationRequestContext,
};
pub use token::{
    ApplyTokenResponseContext, ExtractTokenRequestContext, HandleTokenRequestContext,
    ValidateTokenRequestContext,
};
pub use userinfo::{
    ApplyUserinfoResponseContext, ExtractUserinfoRequestContext, HandleUserinfoRequestContext,
    ValidateUserinfoRequestContext,
};
