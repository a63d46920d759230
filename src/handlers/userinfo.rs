//! Userinfo endpoint handlers.

use async_trait::async_trait;
use jsonwebtoken::Header;
use serde_json::{Map, Value};

use crate::constants::{claims, errors, properties, scopes};
use crate::errors::{Result, ServerError};
use crate::events::{
    ApplyUserinfoResponseContext, ExtractUserinfoRequestContext, HandleUserinfoRequestContext,
    ValidateUserinfoRequestContext,
};
use crate::handlers::protocol::{SharedServices, extract_bearer_token, extract_from_form, extract_from_query};
use crate::message::Parameter;
use crate::pipeline::EventHandler;
use crate::transaction::{HttpMethod, property_keys};

/// The scope → claims table of OIDC Core §5.4.
const PROFILE_CLAIMS: &[&str] = &[
    claims::NAME,
    claims::FAMILY_NAME,
    claims::GIVEN_NAME,
    claims::PREFERRED_USERNAME,
    claims::PROFILE,
    claims::WEBSITE,
    claims::BIRTHDATE,
];
const EMAIL_CLAIMS: &[&str] = &[claims::EMAIL, claims::EMAIL_VERIFIED];
const PHONE_CLAIMS: &[&str] = &[claims::PHONE_NUMBER, claims::PHONE_NUMBER_VERIFIED];
const ADDRESS_CLAIMS: &[&str] = &[claims::ADDRESS];

pub(crate) struct ExtractUserinfoRequest;

#[async_trait]
impl EventHandler<ExtractUserinfoRequestContext> for ExtractUserinfoRequest {
    async fn handle(&self, context: &mut ExtractUserinfoRequestContext) -> Result<()> {
        match context.transaction.method() {
            HttpMethod::Post => extract_from_form(&mut context.transaction),
            _ => extract_from_query(&mut context.transaction),
        }
        extract_bearer_token(&mut context.transaction);
        Ok(())
    }
}

/// The bearer token must be present, deserializable, unexpired and backed
/// by a live entry.
pub(crate) struct ValidateAccessToken {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<ValidateUserinfoRequestContext> for ValidateAccessToken {
    async fn handle(&self, context: &mut ValidateUserinfoRequestContext) -> Result<()> {
        let Some(token) = context.transaction.request.access_token().map(str::to_string) else {
            context.validation.reject(
                errors::INVALID_REQUEST,
                "The mandatory 'access_token' parameter is missing.",
                None,
            );
            return Ok(());
        };

        let options = context.transaction.options.clone();
        let storage_enabled = !options.enable_degraded_mode && !options.disable_token_storage;

        // Reference access tokens present the opaque handle.
        let mut principal = self.services.serializer.deserialize_access_token(&token).await?;
        if principal.is_none() && storage_enabled {
            if let Some(entry) = self.services.tokens()?.find_by_reference_id(&token).await?
                && let Some(payload) = entry.payload.as_deref()
            {
                principal = self.services.serializer.deserialize_access_token(payload).await?;
                context.token_entry = Some(entry);
            }
        }
        let Some(principal) = principal else {
            context.validation.reject(
                errors::INVALID_TOKEN,
                "The specified access token is invalid or has expired.",
                None,
            );
            return Ok(());
        };

        if storage_enabled {
            if context.token_entry.is_none()
                && let Some(id) = principal.token_id()
            {
                context.token_entry = self.services.tokens()?.find_by_id(id).await?;
            }
            match context.token_entry.as_ref() {
                Some(entry) if entry.is_valid() => {}
                _ => {
                    context.validation.reject(
                        errors::INVALID_TOKEN,
                        "The specified access token is no longer valid.",
                        None,
                    );
                    return Ok(());
                }
            }
            if let Some(client_id) = principal.client_id() {
                context.application = self
                    .services
                    .applications()?
                    .find_by_client_id(client_id)
                    .await?;
            }
        }

        context.principal = Some(principal);
        Ok(())
    }
}

/// Emit the subject claim and the scope-gated standard claims.
pub(crate) struct AttachUserinfoClaims;

#[async_trait]
impl EventHandler<HandleUserinfoRequestContext> for AttachUserinfoClaims {
    async fn handle(&self, context: &mut HandleUserinfoRequestContext) -> Result<()> {
        let Some(principal) = context.principal.clone() else {
            return Ok(());
        };
        let Some(subject) = principal.subject() else {
            return Err(ServerError::invalid_operation(
                "the access token principal does not carry a subject",
            ));
        };

        let message = context.transaction.response.message_mut();
        message.set(claims::SUBJECT, Some(Parameter::from(subject)));

        let tables = [
            (scopes::PROFILE, PROFILE_CLAIMS),
            (scopes::EMAIL, EMAIL_CLAIMS),
            (scopes::PHONE, PHONE_CLAIMS),
            (scopes::ADDRESS, ADDRESS_CLAIMS),
        ];
        for (scope, names) in tables {
            if !principal.has_scope(scope) {
                continue;
            }
            for name in names {
                if let Some(value) = principal.claim(name) {
                    message.set(*name, Some(Parameter::from(value.clone())));
                }
            }
        }

        // Surface the application's signed-userinfo registration to the
        // apply stage, which no longer sees the application.
        if let Some(algorithm) = context.application.as_ref().and_then(|application| {
            application
                .properties
                .get(properties::USERINFO_SIGNED_RESPONSE_ALG)
                .and_then(Value::as_str)
        }) {
            let algorithm = algorithm.to_string();
            context
                .transaction
                .set_property(properties::USERINFO_SIGNED_RESPONSE_ALG, algorithm);
        }

        context.state.handle_request();
        Ok(())
    }
}

/// When the application registered for signed userinfo, the document is
/// re-issued as a JWT stored alongside the response for the adapter.
pub(crate) struct AttachSignedUserinfo;

#[async_trait]
impl EventHandler<ApplyUserinfoResponseContext> for AttachSignedUserinfo {
    async fn handle(&self, context: &mut ApplyUserinfoResponseContext) -> Result<()> {
        let signed = context.transaction.properties.contains_key(property_keys::SIGNED_USERINFO);
        if signed {
            return Ok(());
        }
        let Some(algorithm) = context
            .transaction
            .property_str(properties::USERINFO_SIGNED_RESPONSE_ALG)
            .map(str::to_string)
        else {
            return Ok(());
        };
        let Some(credentials) = context.transaction.options.active_signing_credentials().cloned()
        else {
            return Err(ServerError::config(
                "signed userinfo requires signing credentials",
            ));
        };
        if format!("{:?}", credentials.algorithm) != algorithm {
            tracing::warn!(
                requested = %algorithm,
                "signed userinfo requested with an algorithm the server does not use"
            );
        }

        let mut body = Map::new();
        if let Some(issuer) = context.transaction.issuer.as_ref() {
            body.insert(
                claims::ISSUER.to_string(),
                Value::String(issuer.as_str().trim_end_matches('/').to_string()),
            );
        }
        for (name, value) in context.transaction.response.message().iter() {
            body.insert(name.to_string(), value.to_json());
        }

        let mut header = Header::new(credentials.algorithm);
        header.kid = Some(credentials.key_id.clone());
        let jwt = jsonwebtoken::encode(&header, &Value::Object(body), &credentials.encoding_key)?;
        context
            .transaction
            .set_property(property_keys::SIGNED_USERINFO, jwt);
        Ok(())
    }
}
