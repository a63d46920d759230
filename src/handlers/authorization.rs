//! Authorization endpoint handlers.
//!
//! The validation gates run in ascending order and fail fast with the
//! RFC 6749 / OIDC Core error codes; later gates may rely on the facts the
//! earlier ones established (a resolved application, a parsed redirect
//! URI).

use async_trait::async_trait;
use url::Url;

use crate::constants::{
    code_challenge_methods, errors, permissions, prompts, response_modes, response_types, scopes,
};
use crate::events::{
    ApplyAuthorizationResponseContext, ExtractAuthorizationRequestContext,
    ValidateAuthorizationRequestContext,
};
use crate::handlers::protocol::{ResponseLocation, SharedServices, append_parameters, extract_from_form, extract_from_query};
use crate::errors::Result;
use crate::pipeline::EventHandler;
use crate::transaction::{HttpMethod, property_keys};

/// Populates the request from the query string (GET) or form body (POST).
pub(crate) struct ExtractAuthorizationRequest;

#[async_trait]
impl EventHandler<ExtractAuthorizationRequestContext> for ExtractAuthorizationRequest {
    async fn handle(&self, context: &mut ExtractAuthorizationRequestContext) -> Result<()> {
        match context.transaction.method() {
            HttpMethod::Post => extract_from_form(&mut context.transaction),
            _ => extract_from_query(&mut context.transaction),
        }
        Ok(())
    }
}

/// Rejects requests carrying the JAR `request` parameter.
pub(crate) struct ValidateRequestParameter;

#[async_trait]
impl EventHandler<ValidateAuthorizationRequestContext> for ValidateRequestParameter {
    async fn handle(&self, context: &mut ValidateAuthorizationRequestContext) -> Result<()> {
        if context.transaction.request.message().has("request") {
            context.validation.reject(
                errors::REQUEST_NOT_SUPPORTED,
                "The 'request' parameter is not supported.",
                None,
            );
        }
        Ok(())
    }
}

/// Rejects requests carrying the JAR `request_uri` parameter.
pub(crate) struct ValidateRequestUriParameter;

#[async_trait]
impl EventHandler<ValidateAuthorizationRequestContext> for ValidateRequestUriParameter {
    async fn handle(&self, context: &mut ValidateAuthorizationRequestContext) -> Result<()> {
        if context.transaction.request.message().has("request_uri") {
            context.validation.reject(
                errors::REQUEST_URI_NOT_SUPPORTED,
                "The 'request_uri' parameter is not supported.",
                None,
            );
        }
        Ok(())
    }
}

pub(crate) struct ValidateClientIdParameter;

#[async_trait]
impl EventHandler<ValidateAuthorizationRequestContext> for ValidateClientIdParameter {
    async fn handle(&self, context: &mut ValidateAuthorizationRequestContext) -> Result<()> {
        if context.client_id.as_deref().is_none_or(str::is_empty) {
            context.validation.reject(
                errors::INVALID_REQUEST,
                "The mandatory 'client_id' parameter is missing.",
                None,
            );
        }
        Ok(())
    }
}

/// The `redirect_uri` parameter is mandatory for OpenID Connect requests
/// and, when present, must be an absolute URL without a fragment.
pub(crate) struct ValidateRedirectUriParameter;

#[async_trait]
impl EventHandler<ValidateAuthorizationRequestContext> for ValidateRedirectUriParameter {
    async fn handle(&self, context: &mut ValidateAuthorizationRequestContext) -> Result<()> {
        let Some(redirect_uri) = context.redirect_uri.as_deref() else {
            if context.transaction.request.has_scope(scopes::OPENID) {
                context.validation.reject(
                    errors::INVALID_REQUEST,
                    "The mandatory 'redirect_uri' parameter is missing.",
                    None,
                );
            }
            return Ok(());
        };

        match Url::parse(redirect_uri) {
            Ok(parsed) if parsed.fragment().is_some() => {
                context.validation.reject(
                    errors::INVALID_REQUEST,
                    "The 'redirect_uri' parameter must not include a fragment.",
                    None,
                );
            }
            Ok(_) => {}
            // Relative URIs ('/path') land here too.
            Err(_) => {
                context.validation.reject(
                    errors::INVALID_REQUEST,
                    "The 'redirect_uri' parameter must be a valid absolute URL.",
                    None,
                );
            }
        }
        Ok(())
    }
}

pub(crate) struct ValidateResponseTypeParameter;

#[async_trait]
impl EventHandler<ValidateAuthorizationRequestContext> for ValidateResponseTypeParameter {
    async fn handle(&self, context: &mut ValidateAuthorizationRequestContext) -> Result<()> {
        let request = &context.transaction.request;
        let options = &context.transaction.options;

        if request.response_type().is_none_or(str::is_empty) {
            context.validation.reject(
                errors::INVALID_REQUEST,
                "The mandatory 'response_type' parameter is missing.",
                None,
            );
            return Ok(());
        }

        if request.has_response_type(response_types::ID_TOKEN)
            && !request.has_scope(scopes::OPENID)
        {
            context.validation.reject(
                errors::INVALID_REQUEST,
                "The 'openid' scope is required when 'response_type' contains 'id_token'.",
                None,
            );
            return Ok(());
        }

        if request.has_response_type(response_types::CODE) && options.token_endpoint.is_none() {
            context.validation.reject(
                errors::UNSUPPORTED_RESPONSE_TYPE,
                "The authorization code flow requires the token endpoint to be enabled.",
                None,
            );
            return Ok(());
        }

        let allowed = if request.is_authorization_code_flow() {
            options.allow_authorization_code_flow
        } else if request.is_hybrid_flow() {
            options.allow_hybrid_flow
        } else if request.is_implicit_flow() {
            options.allow_implicit_flow
        } else {
            context.validation.reject(
                errors::UNSUPPORTED_RESPONSE_TYPE,
                "The specified 'response_type' is not supported.",
                None,
            );
            return Ok(());
        };
        if !allowed {
            context.validation.reject(
                errors::UNSUPPORTED_RESPONSE_TYPE,
                "The specified 'response_type' is not enabled on this server.",
                None,
            );
            return Ok(());
        }

        if request.has_scope(scopes::OFFLINE_ACCESS) && !options.allow_refresh_token_flow {
            context.validation.reject(
                errors::INVALID_REQUEST,
                "The 'offline_access' scope requires the refresh token grant to be enabled.",
                None,
            );
        }
        Ok(())
    }
}

/// Returning tokens in the query string is forbidden by the
/// multiple-response-types specification.
pub(crate) struct ValidateResponseModeParameter;

#[async_trait]
impl EventHandler<ValidateAuthorizationRequestContext> for ValidateResponseModeParameter {
    async fn handle(&self, context: &mut ValidateAuthorizationRequestContext) -> Result<()> {
        let request = &context.transaction.request;
        let Some(response_mode) = request.response_mode() else {
            return Ok(());
        };

        if request.is_query_response_mode()
            && (request.has_response_type(response_types::ID_TOKEN)
                || request.has_response_type(response_types::TOKEN))
        {
            context.validation.reject(
                errors::INVALID_REQUEST,
                "The 'query' response mode cannot return tokens.",
                None,
            );
            return Ok(());
        }

        if !matches!(
            response_mode,
            response_modes::QUERY | response_modes::FRAGMENT | response_modes::FORM_POST
        ) {
            context.validation.reject(
                errors::INVALID_REQUEST,
                "The specified 'response_mode' is not supported.",
                None,
            );
        }
        Ok(())
    }
}

/// Implicit and hybrid OpenID Connect requests require a nonce.
pub(crate) struct ValidateNonceParameter;

#[async_trait]
impl EventHandler<ValidateAuthorizationRequestContext> for ValidateNonceParameter {
    async fn handle(&self, context: &mut ValidateAuthorizationRequestContext) -> Result<()> {
        let request = &context.transaction.request;
        if (request.is_implicit_flow() || request.is_hybrid_flow())
            && request.has_scope(scopes::OPENID)
            && request.nonce().is_none_or(str::is_empty)
        {
            context.validation.reject(
                errors::INVALID_REQUEST,
                "The mandatory 'nonce' parameter is missing.",
                None,
            );
        }
        Ok(())
    }
}

pub(crate) struct ValidatePromptParameter;

#[async_trait]
impl EventHandler<ValidateAuthorizationRequestContext> for ValidatePromptParameter {
    async fn handle(&self, context: &mut ValidateAuthorizationRequestContext) -> Result<()> {
        let request = &context.transaction.request;
        if request.has_prompt_value(prompts::NONE)
            && (request.has_prompt_value(prompts::LOGIN)
                || request.has_prompt_value(prompts::CONSENT)
                || request.has_prompt_value(prompts::SELECT_ACCOUNT))
        {
            context.validation.reject(
                errors::INVALID_REQUEST,
                "The 'prompt' parameter cannot combine 'none' with other values.",
                None,
            );
        }
        Ok(())
    }
}

pub(crate) struct ValidatePkceParameters;

#[async_trait]
impl EventHandler<ValidateAuthorizationRequestContext> for ValidatePkceParameters {
    async fn handle(&self, context: &mut ValidateAuthorizationRequestContext) -> Result<()> {
        let request = &context.transaction.request;
        let options = &context.transaction.options;

        if request.code_challenge_method().is_some() && request.code_challenge().is_none() {
            context.validation.reject(
                errors::INVALID_REQUEST,
                "The 'code_challenge_method' parameter cannot be used without 'code_challenge'.",
                None,
            );
            return Ok(());
        }

        if let Some(_challenge) = request.code_challenge() {
            if !request.has_response_type(response_types::CODE) {
                context.validation.reject(
                    errors::INVALID_REQUEST,
                    "The 'code_challenge' parameter requires a 'response_type' containing 'code'.",
                    None,
                );
                return Ok(());
            }
            if request.has_response_type(response_types::TOKEN) {
                context.validation.reject(
                    errors::INVALID_REQUEST,
                    "The 'code_challenge' parameter cannot be combined with 'response_type=token'.",
                    None,
                );
                return Ok(());
            }
            if let Some(method) = request.code_challenge_method()
                && !matches!(
                    method,
                    code_challenge_methods::PLAIN | code_challenge_methods::S256
                )
            {
                context.validation.reject(
                    errors::INVALID_REQUEST,
                    "The specified 'code_challenge_method' is not supported.",
                    None,
                );
                return Ok(());
            }
        } else if options.require_pkce && request.has_response_type(response_types::CODE) {
            context.validation.reject(
                errors::INVALID_REQUEST,
                "The mandatory 'code_challenge' parameter is missing.",
                None,
            );
        }
        Ok(())
    }
}

/// Every requested scope must be registered. The standard `openid` and
/// `offline_access` scopes are protocol machinery and exempt from
/// registration.
pub(crate) struct ValidateScopes {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<ValidateAuthorizationRequestContext> for ValidateScopes {
    async fn handle(&self, context: &mut ValidateAuthorizationRequestContext) -> Result<()> {
        let requested: Vec<String> = context
            .transaction
            .request
            .get_scopes()
            .into_iter()
            .filter(|scope| *scope != scopes::OPENID && *scope != scopes::OFFLINE_ACCESS)
            .map(str::to_string)
            .collect();

        let manager = self.services.scopes()?;
        for scope in requested {
            if manager.find_by_name(&scope).await?.is_none() {
                context.validation.reject(
                    errors::INVALID_SCOPE,
                    format!("The scope '{scope}' is not registered."),
                    None,
                );
                return Ok(());
            }
        }
        Ok(())
    }
}

/// The `client_id` must resolve to a registered application.
pub(crate) struct ValidateClientIdentity {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<ValidateAuthorizationRequestContext> for ValidateClientIdentity {
    async fn handle(&self, context: &mut ValidateAuthorizationRequestContext) -> Result<()> {
        let Some(client_id) = context.client_id.as_deref() else {
            return Ok(());
        };
        match self.services.applications()?.find_by_client_id(client_id).await? {
            Some(application) => context.application = Some(application),
            None => context.validation.reject(
                errors::INVALID_CLIENT,
                "The specified 'client_id' does not match a registered application.",
                None,
            ),
        }
        Ok(())
    }
}

/// Confidential clients must not use response types returning an access
/// token from the authorization endpoint (downgrade-attack prevention).
pub(crate) struct ValidateClientType;

#[async_trait]
impl EventHandler<ValidateAuthorizationRequestContext> for ValidateClientType {
    async fn handle(&self, context: &mut ValidateAuthorizationRequestContext) -> Result<()> {
        let Some(application) = context.application.as_ref() else {
            return Ok(());
        };
        if application.is_confidential()
            && context
                .transaction
                .request
                .has_response_type(response_types::TOKEN)
        {
            context.validation.reject(
                errors::UNAUTHORIZED_CLIENT,
                "Confidential clients cannot use 'response_type=token'.",
                None,
            );
        }
        Ok(())
    }
}

/// The client must have registered the exact redirect URI. When the
/// request omitted it, a sole registered URI is adopted.
pub(crate) struct ValidateClientRedirectUri;

#[async_trait]
impl EventHandler<ValidateAuthorizationRequestContext> for ValidateClientRedirectUri {
    async fn handle(&self, context: &mut ValidateAuthorizationRequestContext) -> Result<()> {
        let Some(application) = context.application.as_ref() else {
            return Ok(());
        };

        match context.redirect_uri.as_deref() {
            Some(redirect_uri) => {
                if !application.has_redirect_uri(redirect_uri) {
                    context.validation.reject(
                        errors::INVALID_REQUEST,
                        "The specified 'redirect_uri' is not registered for this client.",
                        None,
                    );
                }
            }
            None => match application.redirect_uris.as_slice() {
                [only] => context.redirect_uri = Some(only.clone()),
                _ => context.validation.reject(
                    errors::INVALID_REQUEST,
                    "The 'redirect_uri' parameter is required for this client.",
                    None,
                ),
            },
        }
        Ok(())
    }
}

pub(crate) struct ValidateEndpointPermissions;

#[async_trait]
impl EventHandler<ValidateAuthorizationRequestContext> for ValidateEndpointPermissions {
    async fn handle(&self, context: &mut ValidateAuthorizationRequestContext) -> Result<()> {
        let Some(application) = context.application.as_ref() else {
            return Ok(());
        };
        if !application.has_permission(permissions::endpoints::AUTHORIZATION) {
            context.validation.reject(
                errors::UNAUTHORIZED_CLIENT,
                "This client is not allowed to use the authorization endpoint.",
                None,
            );
        }
        Ok(())
    }
}

pub(crate) struct ValidateGrantTypePermissions;

#[async_trait]
impl EventHandler<ValidateAuthorizationRequestContext> for ValidateGrantTypePermissions {
    async fn handle(&self, context: &mut ValidateAuthorizationRequestContext) -> Result<()> {
        let Some(application) = context.application.as_ref() else {
            return Ok(());
        };
        let request = &context.transaction.request;

        if request.has_response_type(response_types::CODE)
            && !application.has_permission(permissions::grant_types::AUTHORIZATION_CODE)
        {
            context.validation.reject(
                errors::UNAUTHORIZED_CLIENT,
                "This client is not allowed to use the authorization code grant.",
                None,
            );
            return Ok(());
        }
        if (request.is_implicit_flow() || request.is_hybrid_flow())
            && !application.has_permission(permissions::grant_types::IMPLICIT)
        {
            context.validation.reject(
                errors::UNAUTHORIZED_CLIENT,
                "This client is not allowed to use the implicit grant.",
                None,
            );
            return Ok(());
        }
        if request.has_scope(scopes::OFFLINE_ACCESS)
            && !application.has_permission(permissions::grant_types::REFRESH_TOKEN)
        {
            context.validation.reject(
                errors::UNAUTHORIZED_CLIENT,
                "This client is not allowed to use the refresh token grant.",
                None,
            );
        }
        Ok(())
    }
}

pub(crate) struct ValidateResponseTypePermissions;

#[async_trait]
impl EventHandler<ValidateAuthorizationRequestContext> for ValidateResponseTypePermissions {
    async fn handle(&self, context: &mut ValidateAuthorizationRequestContext) -> Result<()> {
        let Some(application) = context.application.as_ref() else {
            return Ok(());
        };
        let request = &context.transaction.request;
        let checks = [
            (response_types::CODE, permissions::response_types::CODE),
            (response_types::ID_TOKEN, permissions::response_types::ID_TOKEN),
            (response_types::TOKEN, permissions::response_types::TOKEN),
        ];
        for (response_type, permission) in checks {
            if request.has_response_type(response_type)
                && !application.has_permission(permission)
            {
                context.validation.reject(
                    errors::UNAUTHORIZED_CLIENT,
                    format!("This client is not allowed to use 'response_type={response_type}'."),
                    None,
                );
                return Ok(());
            }
        }
        Ok(())
    }
}

pub(crate) struct ValidateScopePermissions;

#[async_trait]
impl EventHandler<ValidateAuthorizationRequestContext> for ValidateScopePermissions {
    async fn handle(&self, context: &mut ValidateAuthorizationRequestContext) -> Result<()> {
        let Some(application) = context.application.as_ref() else {
            return Ok(());
        };
        for scope in context.transaction.request.get_scopes() {
            if scope == scopes::OPENID || scope == scopes::OFFLINE_ACCESS {
                continue;
            }
            let permission = format!("{}{scope}", permissions::prefixes::SCOPE);
            if !application.has_permission(&permission) {
                context.validation.reject(
                    errors::INVALID_REQUEST,
                    format!("This client is not allowed to request the scope '{scope}'."),
                    None,
                );
                return Ok(());
            }
        }
        Ok(())
    }
}

/// Shapes the redirect-based authorization response: response mode
/// inference, state echo, destination URL.
pub(crate) struct AttachAuthorizationResponseDestination;

#[async_trait]
impl EventHandler<ApplyAuthorizationResponseContext> for AttachAuthorizationResponseDestination {
    async fn handle(&self, context: &mut ApplyAuthorizationResponseContext) -> Result<()> {
        let Some(redirect_uri) = context
            .transaction
            .property_str(property_keys::VALIDATED_REDIRECT_URI)
            .map(str::to_string)
        else {
            // Nothing validated: the error renders locally.
            return Ok(());
        };

        if context.transaction.response.state().is_none()
            && let Some(state) = context.transaction.request.state().map(str::to_string)
        {
            context.transaction.response.set_state(Some(&state));
        }

        let request = &context.transaction.request;
        let response_mode = match request.response_mode() {
            Some(mode) => mode.to_string(),
            None => {
                // Fragment whenever tokens may appear in the response,
                // query for a code-only response.
                if request.has_response_type(response_types::TOKEN)
                    || request.has_response_type(response_types::ID_TOKEN)
                {
                    response_modes::FRAGMENT.to_string()
                } else {
                    response_modes::QUERY.to_string()
                }
            }
        };

        let destination = match response_mode.as_str() {
            response_modes::FORM_POST => {
                // The adapter renders the auto-submitting form; parameters
                // stay in the response message.
                redirect_uri
            }
            response_modes::FRAGMENT => append_parameters(
                &redirect_uri,
                context.transaction.response.message(),
                ResponseLocation::Fragment,
            )?,
            _ => append_parameters(
                &redirect_uri,
                context.transaction.response.message(),
                ResponseLocation::Query,
            )?,
        };

        context
            .transaction
            .set_property(property_keys::RESPONSE_DESTINATION, destination);
        context.state.handle_request();
        Ok(())
    }
}
