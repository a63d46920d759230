//! Ordered, filter-gated event dispatch.
//!
//! Handlers are plain trait objects registered through descriptors; the
//! descriptor table is sorted once at registration time and dispatched
//! sequentially, honoring the short-circuit flags carried by the context.

mod descriptor;
mod dispatcher;
mod filters;

pub use descriptor::{EventHandler, HandlerDescriptor, HandlerLifetime};
pub use dispatcher::EventRegistry;
pub use filters::{
    HandlerFilter, RequireAuthorizationPassthroughDisabled, RequireAuthorizationStorageEnabled,
    RequireClientIdParameter, RequireDegradedModeDisabled, RequireEndpointPermissionsEnabled,
    RequireGrantTypePermissionsEnabled, RequireHttpRequest, RequireLogoutPassthroughDisabled,
    RequireResponseTypePermissionsEnabled, RequireScopePermissionsEnabled,
    RequireScopeValidationEnabled, RequireTokenPassthroughDisabled, RequireTokenStorageEnabled,
    RequireUserinfoPassthroughDisabled,
};

use crate::transaction::Transaction;

/// How a context wants the remaining pipeline to proceed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Keep invoking handlers.
    Continue,
    /// A handler fully produced the response; stop.
    Handled,
    /// A handler decided the request is not for this pipeline; stop.
    Skipped,
    /// A validating handler rejected the request; stop and process the
    /// error.
    Rejected,
}

/// Common surface every event context exposes to the dispatcher and the
/// filters.
pub trait EventContext: Send {
    fn transaction(&self) -> &Transaction;

    fn transaction_mut(&mut self) -> &mut Transaction;

    fn resolution(&self) -> Resolution {
        Resolution::Continue
    }
}

/// Short-circuit flags shared by request-shaped contexts.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestState {
    handled: bool,
    skipped: bool,
}

impl RequestState {
    /// Mark the request fully handled; no further handler runs.
    pub fn handle_request(&mut self) {
        self.handled = true;
    }

    /// Mark the request skipped; the host regains control.
    pub fn skip_request(&mut self) {
        self.skipped = true;
    }

    pub fn is_request_handled(&self) -> bool {
        self.handled
    }

    pub fn is_request_skipped(&self) -> bool {
        self.skipped
    }

    pub fn resolution(&self) -> Resolution {
        if self.handled {
            Resolution::Handled
        } else if self.skipped {
            Resolution::Skipped
        } else {
            Resolution::Continue
        }
    }
}

/// Rejection state shared by validating contexts.
#[derive(Clone, Debug, Default)]
pub struct ValidationState {
    rejected: bool,
    error: Option<String>,
    error_description: Option<String>,
    error_uri: Option<String>,
}

impl ValidationState {
    /// Reject the request with a protocol error code.
    pub fn reject(
        &mut self,
        error: impl Into<String>,
        description: impl Into<String>,
        uri: Option<String>,
    ) {
        self.rejected = true;
        self.error = Some(error.into());
        self.error_description = Some(description.into());
        self.error_uri = uri;
    }

    pub fn is_rejected(&self) -> bool {
        self.rejected
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn error_description(&self) -> Option<&str> {
        self.error_description.as_deref()
    }

    pub fn error_uri(&self) -> Option<&str> {
        self.error_uri.as_deref()
    }

    pub fn resolution(&self) -> Resolution {
        if self.rejected {
            Resolution::Rejected
        } else {
            Resolution::Continue
        }
    }
}
