//! Activation filters gating handler descriptors.

use crate::pipeline::EventContext;

/// A predicate deciding whether a handler runs for a given context.
pub trait HandlerFilter<C>: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_active(&self, context: &C) -> bool;
}

macro_rules! options_filter {
    ($(#[$meta:meta])* $ident:ident, $name:literal, |$options:ident| $predicate:expr) => {
        $(#[$meta])*
        pub struct $ident;

        impl<C: EventContext> HandlerFilter<C> for $ident {
            fn name(&self) -> &'static str {
                $name
            }

            fn is_active(&self, context: &C) -> bool {
                let $options = &context.transaction().options;
                $predicate
            }
        }
    };
}

options_filter!(
    /// Active only when the persistence layer is present.
    RequireDegradedModeDisabled,
    "require_degraded_mode_disabled",
    |options| !options.enable_degraded_mode
);

options_filter!(
    /// Active only when requested scopes are checked for existence.
    RequireScopeValidationEnabled,
    "require_scope_validation_enabled",
    |options| !options.disable_scope_validation
);

options_filter!(
    RequireAuthorizationStorageEnabled,
    "require_authorization_storage_enabled",
    |options| !options.enable_degraded_mode && !options.disable_authorization_storage
);

options_filter!(
    RequireTokenStorageEnabled,
    "require_token_storage_enabled",
    |options| !options.enable_degraded_mode && !options.disable_token_storage
);

options_filter!(
    RequireEndpointPermissionsEnabled,
    "require_endpoint_permissions_enabled",
    |options| !options.ignore_endpoint_permissions
);

options_filter!(
    RequireGrantTypePermissionsEnabled,
    "require_grant_type_permissions_enabled",
    |options| !options.ignore_grant_type_permissions
);

options_filter!(
    RequireResponseTypePermissionsEnabled,
    "require_response_type_permissions_enabled",
    |options| !options.ignore_response_type_permissions
);

options_filter!(
    RequireScopePermissionsEnabled,
    "require_scope_permissions_enabled",
    |options| !options.ignore_scope_permissions
);

options_filter!(
    /// Active unless the host applies authorization responses itself.
    RequireAuthorizationPassthroughDisabled,
    "require_authorization_passthrough_disabled",
    |options| !options.authorization_endpoint_passthrough
);

options_filter!(
    RequireTokenPassthroughDisabled,
    "require_token_passthrough_disabled",
    |options| !options.token_endpoint_passthrough
);

options_filter!(
    /// Active unless the host applies userinfo responses itself.
    RequireUserinfoPassthroughDisabled,
    "require_userinfo_passthrough_disabled",
    |options| !options.userinfo_endpoint_passthrough
);

options_filter!(
    RequireLogoutPassthroughDisabled,
    "require_logout_passthrough_disabled",
    |options| !options.logout_endpoint_passthrough
);

/// Active only when the request carries a `client_id` parameter.
pub struct RequireClientIdParameter;

impl<C: EventContext> HandlerFilter<C> for RequireClientIdParameter {
    fn name(&self) -> &'static str {
        "require_client_id_parameter"
    }

    fn is_active(&self, context: &C) -> bool {
        context.transaction().request.client_id().is_some()
    }
}

/// Active only when a transport snapshot was attached by the host.
pub struct RequireHttpRequest;

impl<C: EventContext> HandlerFilter<C> for RequireHttpRequest {
    fn name(&self) -> &'static str {
        "require_http_request"
    }

    fn is_active(&self, context: &C) -> bool {
        context.transaction().transport.is_some()
    }
}
