//! Built-in endpoint handlers: the per-endpoint protocol state machines.

pub(crate) mod authorization;
pub(crate) mod discovery;
pub(crate) mod exchange;
pub(crate) mod introspection;
pub(crate) mod logout;
pub(crate) mod protocol;
pub(crate) mod revocation;
pub(crate) mod token;
pub(crate) mod userinfo;

use std::sync::Arc;

use crate::constants::errors;
use crate::entities::Application;
use crate::errors::{Result, ServerError};
use crate::managers::{ApplicationManager, AuthorizationManager, ScopeManager, TokenManager};
use crate::options::ServerOptions;
use crate::pipeline::ValidationState;
use crate::serialization::TokenSerializer;

/// The collaborators shared by the built-in handlers.
///
/// Managers are absent in degraded mode; handlers that need them are gated
/// behind `RequireDegradedModeDisabled`-style filters, so reaching for a
/// missing manager is a configuration fault, not a runtime surprise.
pub(crate) struct Services {
    pub options: Arc<ServerOptions>,
    pub applications: Option<Arc<ApplicationManager>>,
    pub authorizations: Option<Arc<AuthorizationManager>>,
    pub tokens: Option<Arc<TokenManager>>,
    pub scopes: Option<Arc<ScopeManager>>,
    pub serializer: Arc<dyn TokenSerializer>,
}

impl Services {
    pub(crate) fn applications(&self) -> Result<&ApplicationManager> {
        self.applications
            .as_deref()
            .ok_or_else(|| ServerError::config("no application store was registered"))
    }

    pub(crate) fn authorizations(&self) -> Result<&AuthorizationManager> {
        self.authorizations
            .as_deref()
            .ok_or_else(|| ServerError::config("no authorization store was registered"))
    }

    pub(crate) fn tokens(&self) -> Result<&TokenManager> {
        self.tokens
            .as_deref()
            .ok_or_else(|| ServerError::config("no token store was registered"))
    }

    pub(crate) fn scopes(&self) -> Result<&ScopeManager> {
        self.scopes
            .as_deref()
            .ok_or_else(|| ServerError::config("no scope store was registered"))
    }

    /// Shared client-authentication sequence for the body-based endpoints:
    /// resolve the application, require a verified secret from confidential
    /// clients, refuse secrets from public ones. Rejects the context and
    /// returns `None` on any failure.
    pub(crate) async fn authenticate_client(
        &self,
        client_id: Option<&str>,
        client_secret: Option<&str>,
        validation: &mut ValidationState,
    ) -> Result<Option<Application>> {
        let Some(client_id) = client_id.filter(|value| !value.is_empty()) else {
            validation.reject(
                errors::INVALID_CLIENT,
                "Client authentication is required: the 'client_id' parameter is missing.",
                None,
            );
            return Ok(None);
        };

        let Some(application) = self.applications()?.find_by_client_id(client_id).await? else {
            validation.reject(
                errors::INVALID_CLIENT,
                "The specified 'client_id' does not match a registered application.",
                None,
            );
            return Ok(None);
        };

        if application.is_public() {
            if client_secret.is_some() {
                validation.reject(
                    errors::INVALID_REQUEST,
                    "Public clients must not send a 'client_secret'.",
                    None,
                );
                return Ok(None);
            }
            return Ok(Some(application));
        }

        let Some(client_secret) = client_secret else {
            validation.reject(
                errors::INVALID_CLIENT,
                "Confidential clients must authenticate.",
                None,
            );
            return Ok(None);
        };
        if !self
            .applications()?
            .validate_client_secret(&application, client_secret)
            .await?
        {
            tracing::info!(client_id = %application.client_id, "client secret verification failed");
            validation.reject(
                errors::INVALID_CLIENT,
                "The specified client credentials are invalid.",
                None,
            );
            return Ok(None);
        }
        Ok(Some(application))
    }
}
