//! Logout endpoint handlers.

use async_trait::async_trait;
use futures::TryStreamExt;

use crate::constants::errors;
use crate::errors::Result;
use crate::events::{
    ApplyLogoutResponseContext, ExtractLogoutRequestContext, ValidateLogoutRequestContext,
};
use crate::handlers::protocol::{ResponseLocation, SharedServices, append_parameters, extract_from_form, extract_from_query};
use crate::pipeline::EventHandler;
use crate::transaction::{HttpMethod, property_keys};

pub(crate) struct ExtractLogoutRequest;

#[async_trait]
impl EventHandler<ExtractLogoutRequestContext> for ExtractLogoutRequest {
    async fn handle(&self, context: &mut ExtractLogoutRequestContext) -> Result<()> {
        match context.transaction.method() {
            HttpMethod::Post => extract_from_form(&mut context.transaction),
            _ => extract_from_query(&mut context.transaction),
        }
        Ok(())
    }
}

/// A requested `post_logout_redirect_uri` must exactly match a URI
/// registered by one of the applications.
pub(crate) struct ValidatePostLogoutRedirectUri {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<ValidateLogoutRequestContext> for ValidatePostLogoutRedirectUri {
    async fn handle(&self, context: &mut ValidateLogoutRequestContext) -> Result<()> {
        let Some(uri) = context.post_logout_redirect_uri.clone() else {
            return Ok(());
        };

        let matches: Vec<_> = self
            .services
            .applications()?
            .find_by_post_logout_redirect_uri(&uri)
            .try_collect()
            .await?;
        if matches.is_empty() {
            tracing::info!(%uri, "unregistered post-logout redirect URI");
            context.validation.reject(
                errors::INVALID_REQUEST,
                "The specified 'post_logout_redirect_uri' is not registered.",
                None,
            );
            return Ok(());
        }

        let uri_owned = uri.clone();
        context
            .transaction
            .set_property(property_keys::VALIDATED_POST_LOGOUT_REDIRECT_URI, uri_owned);
        Ok(())
    }
}

/// Redirect to the validated post-logout URI, echoing `state`.
pub(crate) struct AttachLogoutResponseDestination;

#[async_trait]
impl EventHandler<ApplyLogoutResponseContext> for AttachLogoutResponseDestination {
    async fn handle(&self, context: &mut ApplyLogoutResponseContext) -> Result<()> {
        let Some(redirect_uri) = context
            .transaction
            .property_str(property_keys::VALIDATED_POST_LOGOUT_REDIRECT_URI)
            .map(str::to_string)
        else {
            return Ok(());
        };

        if let Some(state) = context.transaction.request.state().map(str::to_string) {
            context.transaction.response.set_state(Some(&state));
        }
        let destination = append_parameters(
            &redirect_uri,
            context.transaction.response.message(),
            ResponseLocation::Query,
        )?;
        context
            .transaction
            .set_property(property_keys::RESPONSE_DESTINATION, destination);
        context.state.handle_request();
        Ok(())
    }
}
