//! Sign-in processing: entity creation and token issuance.
//!
//! Whatever endpoint produced the principal (interactive authorization,
//! code exchange, client credentials, ...), the sign-in pipeline persists
//! the grant and serializes the artifacts the response will carry.

use async_trait::async_trait;
use chrono::Utc;

use crate::constants::{claims, response_types, scopes, token_types};
use crate::entities::{AuthorizationDescriptor, AuthorizationType, TokenDescriptor, TokenType};
use crate::errors::{Result, ServerError};
use crate::events::ProcessSigninContext;
use crate::handlers::protocol::SharedServices;
use crate::pipeline::EventHandler;
use crate::principal::Principal;
use crate::transaction::{EndpointType, property_keys};

/// A sign-in without a subject is a host bug, not a protocol error.
pub(crate) struct ValidateSigninDemand;

#[async_trait]
impl EventHandler<ProcessSigninContext> for ValidateSigninDemand {
    async fn handle(&self, context: &mut ProcessSigninContext) -> Result<()> {
        if context.principal.subject().is_none_or(str::is_empty) {
            return Err(ServerError::invalid_operation(
                "the sign-in principal does not carry a subject",
            ));
        }
        if context.principal.client_id().is_none()
            && let Some(client_id) = context.transaction.request.client_id().map(str::to_string)
        {
            context.principal.set_client_id(client_id);
        }
        if context.principal.scopes().is_empty() {
            let scopes: Vec<String> = context
                .transaction
                .request
                .get_scopes()
                .into_iter()
                .map(str::to_string)
                .collect();
            context.principal.set_scopes(scopes);
        }
        Ok(())
    }
}

/// Resolve the application entity the grant belongs to.
pub(crate) struct ResolveSigninApplication {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<ProcessSigninContext> for ResolveSigninApplication {
    async fn handle(&self, context: &mut ProcessSigninContext) -> Result<()> {
        let Some(client_id) = context.principal.client_id() else {
            return Ok(());
        };
        context.application = self
            .services
            .applications()?
            .find_by_client_id(client_id)
            .await?;
        Ok(())
    }
}

/// Attach the audiences derived from the granted scopes.
pub(crate) struct AttachAudiences {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<ProcessSigninContext> for AttachAudiences {
    async fn handle(&self, context: &mut ProcessSigninContext) -> Result<()> {
        if !context.principal.audiences().is_empty() {
            return Ok(());
        }
        let granted: Vec<String> = context.principal.scopes().to_vec();
        if granted.is_empty() {
            return Ok(());
        }
        let Some(manager) = self.services.scopes.as_deref() else {
            return Ok(());
        };
        let resources = manager.list_resources(&granted).await?;
        if !resources.is_empty() {
            context.principal.set_audiences(resources);
        }
        Ok(())
    }
}

/// Create the consent record backing this grant when none is attached yet.
///
/// Grants produced by the authorization endpoint represent an explicit
/// user decision and are permanent; grants synthesized at the token
/// endpoint (client credentials, password) get an ad-hoc entry that the
/// pruning task reclaims once its tokens die.
pub(crate) struct AttachAuthorizationEntry {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<ProcessSigninContext> for AttachAuthorizationEntry {
    async fn handle(&self, context: &mut ProcessSigninContext) -> Result<()> {
        if context.principal.authorization_id().is_some() {
            return Ok(());
        }

        let kind = match context.transaction.endpoint_type {
            EndpointType::Authorization => AuthorizationType::Permanent,
            _ => AuthorizationType::AdHoc,
        };
        let descriptor = AuthorizationDescriptor {
            application_id: context.application.as_ref().map(|app| app.id.clone()),
            subject: context.principal.subject().map(str::to_string),
            kind: Some(kind),
            scopes: context.principal.scopes().to_vec(),
            ..Default::default()
        };
        let authorization = self.services.authorizations()?.create(&descriptor).await?;
        context.principal.set_authorization_id(&authorization.id);
        Ok(())
    }
}

impl ProcessSigninContext {
    fn issues_code(&self) -> bool {
        self.transaction.endpoint_type == EndpointType::Authorization
            && self.transaction.request.has_response_type(response_types::CODE)
    }

    fn issues_access_token(&self) -> bool {
        match self.transaction.endpoint_type {
            EndpointType::Token => true,
            EndpointType::Authorization => self
                .transaction
                .request
                .has_response_type(response_types::TOKEN),
            _ => false,
        }
    }

    fn issues_refresh_token(&self) -> bool {
        self.transaction.endpoint_type == EndpointType::Token
            && self.transaction.options.allow_refresh_token_flow
            && !self.transaction.request.is_client_credentials_grant_type()
    }

    fn issues_identity_token(&self) -> bool {
        if !self.principal.has_scope(scopes::OPENID) {
            return false;
        }
        match self.transaction.endpoint_type {
            EndpointType::Token => {
                self.transaction.request.is_authorization_code_grant_type()
                    || self.transaction.request.is_refresh_token_grant_type()
            }
            EndpointType::Authorization => self
                .transaction
                .request
                .has_response_type(response_types::ID_TOKEN),
            _ => false,
        }
    }
}

/// Create, persist and serialize one grant artifact.
async fn issue_token(
    services: &SharedServices,
    context: &mut ProcessSigninContext,
    kind: TokenType,
    mut principal: Principal,
    reference: bool,
) -> Result<String> {
    let options = context.transaction.options.clone();
    principal.set_creation_date(Utc::now());

    let persist = !options.enable_degraded_mode && !options.disable_token_storage;
    let mut entry = None;
    if persist {
        let manager = services.tokens()?;
        let descriptor = TokenDescriptor {
            application_id: context.application.as_ref().map(|app| app.id.clone()),
            authorization_id: context.principal.authorization_id().map(str::to_string),
            subject: principal.subject().map(str::to_string),
            kind: Some(kind),
            expiration_date: principal.expiration_date(),
            reference_id: reference.then(|| manager.new_reference_id()),
            ..Default::default()
        };
        let token = manager.create(&descriptor).await?;
        principal.set_token_id(&token.id);
        entry = Some(token);
    }

    let serializer = &services.serializer;
    let serialized = match kind {
        TokenType::Access => serializer.serialize_access_token(&principal).await?,
        TokenType::Refresh => serializer.serialize_refresh_token(&principal).await?,
        TokenType::IdToken => serializer.serialize_identity_token(&principal).await?,
        TokenType::AuthorizationCode => {
            serializer.serialize_authorization_code(&principal).await?
        }
        other => {
            return Err(ServerError::internal(format!(
                "token type '{other}' cannot be issued by the sign-in pipeline"
            )));
        }
    };

    if let Some(mut token) = entry {
        token.payload = Some(serialized.clone());
        services.tokens()?.update(&mut token).await?;
        if reference {
            // The caller only ever sees the opaque handle.
            return Ok(token.reference_id.unwrap_or(serialized));
        }
    }
    Ok(serialized)
}

pub(crate) struct AttachAuthorizationCode {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<ProcessSigninContext> for AttachAuthorizationCode {
    async fn handle(&self, context: &mut ProcessSigninContext) -> Result<()> {
        if !context.issues_code() {
            return Ok(());
        }

        let mut principal = context.principal.clone();
        principal.set_expiration_date(
            Utc::now()
                + chrono::Duration::from_std(context.transaction.options.authorization_code_lifetime)
                    .unwrap_or_else(|_| chrono::Duration::minutes(5)),
        );
        if let Some(redirect_uri) = context
            .transaction
            .property_str(property_keys::VALIDATED_REDIRECT_URI)
        {
            principal.set_claim(claims::REDIRECT_URI, redirect_uri);
        }
        if let Some(challenge) = context.transaction.request.code_challenge() {
            principal.set_claim(claims::CODE_CHALLENGE, challenge);
            if let Some(method) = context.transaction.request.code_challenge_method() {
                principal.set_claim(claims::CODE_CHALLENGE_METHOD, method);
            }
        }
        if let Some(nonce) = context.transaction.request.nonce() {
            principal.set_claim(claims::NONCE, nonce);
        }

        let code = issue_token(
            &self.services,
            context,
            TokenType::AuthorizationCode,
            principal,
            false,
        )
        .await?;
        context.transaction.response.set_code(Some(&code));
        Ok(())
    }
}

pub(crate) struct AttachAccessToken {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<ProcessSigninContext> for AttachAccessToken {
    async fn handle(&self, context: &mut ProcessSigninContext) -> Result<()> {
        if !context.issues_access_token() {
            return Ok(());
        }
        let options = context.transaction.options.clone();

        let mut principal = context.principal.clone();
        principal.set_expiration_date(
            Utc::now()
                + chrono::Duration::from_std(options.access_token_lifetime)
                    .unwrap_or_else(|_| chrono::Duration::hours(1)),
        );

        let reference = options.use_reference_access_tokens;
        let access_token = issue_token(
            &self.services,
            context,
            TokenType::Access,
            principal,
            reference,
        )
        .await?;

        let response = &mut context.transaction.response;
        response.set_access_token(Some(&access_token));
        response.set_token_type(Some(token_types::BEARER));
        response.set_expires_in(Some(options.access_token_lifetime.as_secs() as i64));
        if !context.principal.scopes().is_empty() {
            let scope = context.principal.scopes().join(" ");
            context.transaction.response.set_scope(Some(&scope));
        }
        Ok(())
    }
}

pub(crate) struct AttachRefreshToken {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<ProcessSigninContext> for AttachRefreshToken {
    async fn handle(&self, context: &mut ProcessSigninContext) -> Result<()> {
        if !context.issues_refresh_token() {
            return Ok(());
        }
        let options = context.transaction.options.clone();

        let mut principal = context.principal.clone();
        principal.set_expiration_date(
            Utc::now()
                + chrono::Duration::from_std(options.refresh_token_lifetime)
                    .unwrap_or_else(|_| chrono::Duration::days(14)),
        );

        let reference = options.use_reference_refresh_tokens;
        let refresh_token = issue_token(
            &self.services,
            context,
            TokenType::Refresh,
            principal,
            reference,
        )
        .await?;
        context
            .transaction
            .response
            .set_refresh_token(Some(&refresh_token));
        Ok(())
    }
}

pub(crate) struct AttachIdentityToken {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<ProcessSigninContext> for AttachIdentityToken {
    async fn handle(&self, context: &mut ProcessSigninContext) -> Result<()> {
        if !context.issues_identity_token() {
            return Ok(());
        }
        let options = context.transaction.options.clone();

        let mut principal = context.principal.clone();
        principal.set_expiration_date(
            Utc::now()
                + chrono::Duration::from_std(options.identity_token_lifetime)
                    .unwrap_or_else(|_| chrono::Duration::minutes(20)),
        );
        // Identity tokens are consumed by the client, not the resources.
        if let Some(client_id) = principal.client_id().map(str::to_string) {
            principal.set_audiences([client_id]);
        }
        if principal.claim(claims::NONCE).is_none()
            && let Some(nonce) = context.transaction.request.nonce()
        {
            principal.set_claim(claims::NONCE, nonce);
        }

        let id_token = issue_token(
            &self.services,
            context,
            TokenType::IdToken,
            principal,
            false,
        )
        .await?;
        context.transaction.response.set_id_token(Some(&id_token));
        Ok(())
    }
}
