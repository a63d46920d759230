//! Configuration and JWKS endpoint stage contexts.

use crate::events::impl_request_context;
use crate::pipeline::{EventContext, RequestState, Resolution};
use crate::transaction::Transaction;

macro_rules! plain_context {
    ($($(#[$meta:meta])* $type:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            pub struct $type {
                pub transaction: Transaction,
                pub state: RequestState,
            }

            impl $type {
                pub fn new(transaction: Transaction) -> Self {
                    Self {
                        transaction,
                        state: RequestState::default(),
                    }
                }
            }
        )*

        impl_request_context!($($type),*);
    };
}

plain_context!(
    ExtractConfigurationRequestContext,
    /// Builds the discovery metadata document.
    HandleConfigurationRequestContext,
    ApplyConfigurationResponseContext,
    ExtractJwksRequestContext,
    /// Builds the JWKS document from the signing credentials.
    HandleJwksRequestContext,
    ApplyJwksResponseContext,
);
