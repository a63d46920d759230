//! Introspection endpoint handlers.

use async_trait::async_trait;

use crate::constants::{claims, errors, params, token_type_hints, token_types};
use crate::entities::TokenType;
use crate::errors::Result;
use crate::events::{
    ExtractIntrospectionRequestContext, HandleIntrospectionRequestContext,
    ValidateIntrospectionRequestContext,
};
use crate::handlers::protocol::{SharedServices, extract_basic_credentials, extract_from_form};
use crate::message::Parameter;
use crate::pipeline::EventHandler;
use crate::principal::Principal;
use crate::transaction::HttpMethod;

pub(crate) struct ExtractIntrospectionRequest;

#[async_trait]
impl EventHandler<ExtractIntrospectionRequestContext> for ExtractIntrospectionRequest {
    async fn handle(&self, context: &mut ExtractIntrospectionRequestContext) -> Result<()> {
        extract_from_form(&mut context.transaction);
        extract_basic_credentials(&mut context.transaction);
        Ok(())
    }
}

/// The introspection endpoint only accepts POST requests.
pub(crate) struct ValidateHttpMethod;

#[async_trait]
impl EventHandler<ValidateIntrospectionRequestContext> for ValidateHttpMethod {
    async fn handle(&self, context: &mut ValidateIntrospectionRequestContext) -> Result<()> {
        if context.transaction.transport.is_some()
            && context.transaction.method() != HttpMethod::Post
        {
            context.validation.reject(
                errors::INVALID_REQUEST,
                "Introspection requests must use POST.",
                None,
            );
        }
        Ok(())
    }
}

pub(crate) struct ValidateTokenParameter;

#[async_trait]
impl EventHandler<ValidateIntrospectionRequestContext> for ValidateTokenParameter {
    async fn handle(&self, context: &mut ValidateIntrospectionRequestContext) -> Result<()> {
        if context.transaction.request.token().is_none_or(str::is_empty) {
            context.validation.reject(
                errors::INVALID_REQUEST,
                "The mandatory 'token' parameter is missing.",
                None,
            );
        }
        Ok(())
    }
}

pub(crate) struct ValidateClientAuthentication {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<ValidateIntrospectionRequestContext> for ValidateClientAuthentication {
    async fn handle(&self, context: &mut ValidateIntrospectionRequestContext) -> Result<()> {
        let client_id = context.client_id.clone();
        let client_secret = context
            .transaction
            .request
            .client_secret()
            .map(str::to_string);
        context.application = self
            .services
            .authenticate_client(
                client_id.as_deref(),
                client_secret.as_deref(),
                &mut context.validation,
            )
            .await?;
        Ok(())
    }
}

/// Locate the presented token: reference handles first, then the
/// self-contained payload, guided by the optional `token_type_hint`.
pub(crate) struct ResolveIntrospectedToken {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<ValidateIntrospectionRequestContext> for ResolveIntrospectedToken {
    async fn handle(&self, context: &mut ValidateIntrospectionRequestContext) -> Result<()> {
        let Some(token) = context.transaction.request.token().map(str::to_string) else {
            return Ok(());
        };

        if let Some(entry) = self.services.tokens()?.find_by_reference_id(&token).await? {
            if let Some(payload) = entry.payload.as_deref() {
                context.principal = deserialize_any(&self.services, payload, entry.kind).await?;
            }
            context.token_entry = Some(entry);
            return Ok(());
        }

        let hint = context.transaction.request.token_type_hint().map(str::to_string);
        let principal = match hint.as_deref() {
            Some(token_type_hints::REFRESH_TOKEN) => {
                self.services.serializer.deserialize_refresh_token(&token).await?
            }
            Some(token_type_hints::ID_TOKEN) => {
                self.services.serializer.deserialize_identity_token(&token).await?
            }
            _ => self.services.serializer.deserialize_access_token(&token).await?,
        };
        // A wrong hint is not fatal: fall through the remaining kinds.
        let principal = match principal {
            Some(principal) => Some(principal),
            None => match self.services.serializer.deserialize_refresh_token(&token).await? {
                Some(principal) => Some(principal),
                None => self.services.serializer.deserialize_access_token(&token).await?,
            },
        };

        if let Some(principal) = principal {
            if let Some(id) = principal.token_id() {
                context.token_entry = self.services.tokens()?.find_by_id(id).await?;
            }
            context.principal = Some(principal);
        }
        Ok(())
    }
}

async fn deserialize_any(
    services: &SharedServices,
    payload: &str,
    kind: TokenType,
) -> Result<Option<Principal>> {
    match kind {
        TokenType::Refresh => services.serializer.deserialize_refresh_token(payload).await,
        TokenType::IdToken => services.serializer.deserialize_identity_token(payload).await,
        _ => services.serializer.deserialize_access_token(payload).await,
    }
}

/// Emit the introspection document. Unknown, expired, revoked and foreign
/// tokens all collapse to `active: false` so callers cannot probe grants
/// they do not own.
pub(crate) struct AttachIntrospectionClaims;

#[async_trait]
impl EventHandler<HandleIntrospectionRequestContext> for AttachIntrospectionClaims {
    async fn handle(&self, context: &mut HandleIntrospectionRequestContext) -> Result<()> {
        let caller = context.application.as_ref();

        let authorized = match (&context.token_entry, &context.principal, caller) {
            (Some(entry), _, Some(caller)) => {
                let owns = entry.application_id.as_deref() == Some(caller.id.as_str());
                let audience = context
                    .principal
                    .as_ref()
                    .is_some_and(|principal| principal.has_audience(&caller.client_id));
                entry.is_valid() && (owns || audience)
            }
            (None, Some(principal), Some(caller)) => {
                // Degraded mode: self-contained state only.
                !principal.is_expired()
                    && (principal.client_id() == Some(caller.client_id.as_str())
                        || principal.has_audience(&caller.client_id))
            }
            _ => false,
        };

        if !authorized {
            context.transaction.response.set_active(false);
            context.state.handle_request();
            return Ok(());
        }

        let response = &mut context.transaction.response;
        response.set_active(true);
        response.set_token_type(Some(token_types::BEARER));
        if let Some(principal) = context.principal.as_ref() {
            if !principal.scopes().is_empty() {
                let scope = principal.scopes().join(" ");
                response.set_scope(Some(&scope));
            }
            let message = response.message_mut();
            if let Some(subject) = principal.subject() {
                message.set(claims::SUBJECT, Some(Parameter::from(subject)));
            }
            if let Some(client_id) = principal.client_id() {
                message.set(params::CLIENT_ID, Some(Parameter::from(client_id)));
            }
            match principal.audiences() {
                [] => {}
                [audience] => {
                    message.set(claims::AUDIENCE, Some(Parameter::from(audience.as_str())));
                }
                audiences => {
                    message.set(
                        claims::AUDIENCE,
                        Some(Parameter::StringArray(audiences.to_vec())),
                    );
                }
            }
            if let Some(creation) = principal.creation_date() {
                message.set(claims::ISSUED_AT, Some(Parameter::Integer(creation.timestamp())));
            }
            if let Some(expiration) = principal.expiration_date() {
                message.set(
                    claims::EXPIRES_AT,
                    Some(Parameter::Integer(expiration.timestamp())),
                );
            }
            if let Some(token_id) = principal.token_id() {
                message.set(claims::JWT_ID, Some(Parameter::from(token_id)));
            }
        } else if let Some(entry) = context.token_entry.as_ref() {
            let message = response.message_mut();
            if let Some(subject) = entry.subject.as_deref() {
                message.set(claims::SUBJECT, Some(Parameter::from(subject)));
            }
            if let Some(expiration) = entry.expiration_date {
                message.set(
                    claims::EXPIRES_AT,
                    Some(Parameter::Integer(expiration.timestamp())),
                );
            }
            message.set(
                claims::ISSUED_AT,
                Some(Parameter::Integer(entry.creation_date.timestamp())),
            );
            message.set(claims::JWT_ID, Some(Parameter::from(entry.id.as_str())));
        }

        context.state.handle_request();
        Ok(())
    }
}
