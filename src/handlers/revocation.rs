//! Revocation endpoint handlers.

use async_trait::async_trait;

use crate::constants::errors;
use crate::entities::TokenType;
use crate::errors::Result;
use crate::events::{
    ExtractRevocationRequestContext, HandleRevocationRequestContext,
    ValidateRevocationRequestContext,
};
use crate::handlers::protocol::{SharedServices, extract_basic_credentials, extract_from_form};
use crate::pipeline::EventHandler;
use crate::transaction::HttpMethod;

pub(crate) struct ExtractRevocationRequest;

#[async_trait]
impl EventHandler<ExtractRevocationRequestContext> for ExtractRevocationRequest {
    async fn handle(&self, context: &mut ExtractRevocationRequestContext) -> Result<()> {
        extract_from_form(&mut context.transaction);
        extract_basic_credentials(&mut context.transaction);
        Ok(())
    }
}

pub(crate) struct ValidateHttpMethod;

#[async_trait]
impl EventHandler<ValidateRevocationRequestContext> for ValidateHttpMethod {
    async fn handle(&self, context: &mut ValidateRevocationRequestContext) -> Result<()> {
        if context.transaction.transport.is_some()
            && context.transaction.method() != HttpMethod::Post
        {
            context.validation.reject(
                errors::INVALID_REQUEST,
                "Revocation requests must use POST.",
                None,
            );
        }
        Ok(())
    }
}

pub(crate) struct ValidateTokenParameter;

#[async_trait]
impl EventHandler<ValidateRevocationRequestContext> for ValidateTokenParameter {
    async fn handle(&self, context: &mut ValidateRevocationRequestContext) -> Result<()> {
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
impl EventHandler<ValidateRevocationRequestContext> for ValidateClientAuthentication {
    async fn handle(&self, context: &mut ValidateRevocationRequestContext) -> Result<()> {
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

/// Locate the token entry to revoke, by reference handle or payload.
pub(crate) struct ResolveRevocableToken {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<ValidateRevocationRequestContext> for ResolveRevocableToken {
    async fn handle(&self, context: &mut ValidateRevocationRequestContext) -> Result<()> {
        let Some(token) = context.transaction.request.token().map(str::to_string) else {
            return Ok(());
        };

        if let Some(entry) = self.services.tokens()?.find_by_reference_id(&token).await? {
            context.token_entry = Some(entry);
            return Ok(());
        }

        let principal = match self.services.serializer.deserialize_refresh_token(&token).await? {
            Some(principal) => Some(principal),
            None => self.services.serializer.deserialize_access_token(&token).await?,
        };
        if let Some(id) = principal.as_ref().and_then(|principal| principal.token_id()) {
            context.token_entry = self.services.tokens()?.find_by_id(id).await?;
        }
        Ok(())
    }
}

/// Mark the token revoked. Idempotent, and deliberately quiet: unknown or
/// foreign tokens still produce an empty 200 so callers cannot probe the
/// token space (RFC 7009 §2.2).
pub(crate) struct RevokeTokenEntry {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<HandleRevocationRequestContext> for RevokeTokenEntry {
    async fn handle(&self, context: &mut HandleRevocationRequestContext) -> Result<()> {
        let Some(entry) = context.token_entry.as_mut() else {
            context.state.handle_request();
            return Ok(());
        };
        let owned = match context.application.as_ref() {
            Some(caller) => entry.application_id.as_deref() == Some(caller.id.as_str()),
            None => false,
        };
        if !owned {
            tracing::info!(token = %entry.id, "revocation of a foreign token ignored");
            context.state.handle_request();
            return Ok(());
        }

        let manager = self.services.tokens()?;
        manager.try_revoke(entry).await?;

        // Revoking a refresh token invalidates the access tokens derived
        // from it through the shared authorization.
        if entry.kind == TokenType::Refresh
            && let Some(authorization_id) = entry.authorization_id.as_deref()
        {
            let cascaded = manager.revoke_by_authorization_id(authorization_id).await?;
            tracing::debug!(cascaded, "derived tokens revoked");
        }

        context.state.handle_request();
        Ok(())
    }
}
