//! Token endpoint handlers.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::constants::{claims, code_challenge_methods, errors, grant_types, permissions};
use crate::errors::Result;
use crate::events::{ExtractTokenRequestContext, HandleTokenRequestContext, ValidateTokenRequestContext};
use crate::handlers::protocol::{SharedServices, extract_basic_credentials, extract_from_form};
use crate::pipeline::EventHandler;
use crate::principal::Principal;

/// Claims the serializer stamps onto authorization codes for the exchange
/// checks; they never survive into the newly issued tokens.
const EXCHANGE_CLAIMS: &[&str] = &[
    claims::REDIRECT_URI,
    claims::CODE_CHALLENGE,
    claims::CODE_CHALLENGE_METHOD,
];

const KNOWN_GRANT_TYPES: &[&str] = &[
    grant_types::AUTHORIZATION_CODE,
    grant_types::CLIENT_CREDENTIALS,
    grant_types::DEVICE_CODE,
    grant_types::PASSWORD,
    grant_types::REFRESH_TOKEN,
];

/// Token requests are read from the form body; HTTP Basic credentials are
/// folded into the message parameters.
pub(crate) struct ExtractTokenRequest;

#[async_trait]
impl EventHandler<ExtractTokenRequestContext> for ExtractTokenRequest {
    async fn handle(&self, context: &mut ExtractTokenRequestContext) -> Result<()> {
        extract_from_form(&mut context.transaction);
        extract_basic_credentials(&mut context.transaction);
        Ok(())
    }
}

pub(crate) struct ValidateGrantTypeParameter;

#[async_trait]
impl EventHandler<ValidateTokenRequestContext> for ValidateGrantTypeParameter {
    async fn handle(&self, context: &mut ValidateTokenRequestContext) -> Result<()> {
        let Some(grant_type) = context.transaction.request.grant_type() else {
            context.validation.reject(
                errors::INVALID_REQUEST,
                "The mandatory 'grant_type' parameter is missing.",
                None,
            );
            return Ok(());
        };
        if !KNOWN_GRANT_TYPES.contains(&grant_type) {
            context.validation.reject(
                errors::UNSUPPORTED_GRANT_TYPE,
                "The specified 'grant_type' is not supported.",
                None,
            );
            return Ok(());
        }
        if !context.transaction.options.is_grant_type_allowed(grant_type) {
            context.validation.reject(
                errors::UNSUPPORTED_GRANT_TYPE,
                "The specified 'grant_type' is not enabled on this server.",
                None,
            );
        }
        Ok(())
    }
}

pub(crate) struct ValidateClientIdParameter;

#[async_trait]
impl EventHandler<ValidateTokenRequestContext> for ValidateClientIdParameter {
    async fn handle(&self, context: &mut ValidateTokenRequestContext) -> Result<()> {
        if context.client_id.as_deref().is_none_or(str::is_empty) {
            context.validation.reject(
                errors::INVALID_CLIENT,
                "Client authentication is required: the 'client_id' parameter is missing.",
                None,
            );
        }
        Ok(())
    }
}

pub(crate) struct ValidateClientIdentity {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<ValidateTokenRequestContext> for ValidateClientIdentity {
    async fn handle(&self, context: &mut ValidateTokenRequestContext) -> Result<()> {
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

/// Confidential clients must authenticate; public clients must not present
/// a secret at all.
pub(crate) struct ValidateClientAuthentication {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<ValidateTokenRequestContext> for ValidateClientAuthentication {
    async fn handle(&self, context: &mut ValidateTokenRequestContext) -> Result<()> {
        let Some(application) = context.application.clone() else {
            return Ok(());
        };
        let secret = context.transaction.request.client_secret().map(str::to_string);

        if application.is_public() {
            if secret.is_some() {
                context.validation.reject(
                    errors::INVALID_REQUEST,
                    "Public clients must not send a 'client_secret'.",
                    None,
                );
            }
            return Ok(());
        }

        let Some(secret) = secret else {
            context.validation.reject(
                errors::INVALID_CLIENT,
                "Confidential clients must authenticate.",
                None,
            );
            return Ok(());
        };
        if !self
            .services
            .applications()?
            .validate_client_secret(&application, &secret)
            .await?
        {
            tracing::info!(client_id = %application.client_id, "client secret verification failed");
            context.validation.reject(
                errors::INVALID_CLIENT,
                "The specified client credentials are invalid.",
                None,
            );
        }
        Ok(())
    }
}

pub(crate) struct ValidateGrantTypePermission;

#[async_trait]
impl EventHandler<ValidateTokenRequestContext> for ValidateGrantTypePermission {
    async fn handle(&self, context: &mut ValidateTokenRequestContext) -> Result<()> {
        let Some(application) = context.application.as_ref() else {
            return Ok(());
        };
        let Some(grant_type) = context.transaction.request.grant_type() else {
            return Ok(());
        };
        let permission = format!("{}{grant_type}", permissions::prefixes::GRANT_TYPE);
        if !application.has_permission(&permission) {
            context.validation.reject(
                errors::UNAUTHORIZED_CLIENT,
                "This client is not allowed to use the specified 'grant_type'.",
                None,
            );
        }
        Ok(())
    }
}

/// Authorization code exchange checks: code presence, client and redirect
/// URI binding, PKCE verifier, backing entity validity.
pub(crate) struct ValidateAuthorizationCodeParameter {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<ValidateTokenRequestContext> for ValidateAuthorizationCodeParameter {
    async fn handle(&self, context: &mut ValidateTokenRequestContext) -> Result<()> {
        if !context.transaction.request.is_authorization_code_grant_type() {
            return Ok(());
        }

        let Some(code) = context.transaction.request.code().map(str::to_string) else {
            context.validation.reject(
                errors::INVALID_REQUEST,
                "The mandatory 'code' parameter is missing.",
                None,
            );
            return Ok(());
        };

        let Some(principal) = self
            .services
            .serializer
            .deserialize_authorization_code(&code)
            .await?
        else {
            context.validation.reject(
                errors::INVALID_GRANT,
                "The specified authorization code is invalid or has expired.",
                None,
            );
            return Ok(());
        };

        if principal.client_id() != context.client_id.as_deref() {
            context.validation.reject(
                errors::INVALID_GRANT,
                "The specified authorization code was issued to another client.",
                None,
            );
            return Ok(());
        }

        // The redirect URI presented here must match the one the code was
        // bound to at the authorization endpoint.
        let bound_redirect_uri = principal.claim_str(claims::REDIRECT_URI);
        if bound_redirect_uri.is_some()
            && context.transaction.request.redirect_uri() != bound_redirect_uri
        {
            context.validation.reject(
                errors::INVALID_GRANT,
                "The 'redirect_uri' parameter does not match the authorization request.",
                None,
            );
            return Ok(());
        }

        if let Some(challenge) = principal.claim_str(claims::CODE_CHALLENGE) {
            let Some(verifier) = context.transaction.request.code_verifier() else {
                context.validation.reject(
                    errors::INVALID_REQUEST,
                    "The mandatory 'code_verifier' parameter is missing.",
                    None,
                );
                return Ok(());
            };
            let method = principal
                .claim_str(claims::CODE_CHALLENGE_METHOD)
                .unwrap_or(code_challenge_methods::PLAIN);
            if !verify_code_challenge(challenge, verifier, method) {
                context.validation.reject(
                    errors::INVALID_GRANT,
                    "The specified 'code_verifier' is invalid.",
                    None,
                );
                return Ok(());
            }
        }

        if !context.transaction.options.enable_degraded_mode
            && !context.transaction.options.disable_token_storage
        {
            let Some(entry) = (match principal.token_id() {
                Some(id) => self.services.tokens()?.find_by_id(id).await?,
                None => None,
            }) else {
                context.validation.reject(
                    errors::INVALID_GRANT,
                    "The specified authorization code cannot be found.",
                    None,
                );
                return Ok(());
            };
            if !entry.is_valid() {
                context.validation.reject(
                    errors::INVALID_GRANT,
                    "The specified authorization code is no longer valid.",
                    None,
                );
                return Ok(());
            }
            context.token_entry = Some(entry);
        }

        context.principal = Some(principal);
        Ok(())
    }
}

/// Refresh token checks: presence, client binding, backing entity validity.
pub(crate) struct ValidateRefreshTokenParameter {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<ValidateTokenRequestContext> for ValidateRefreshTokenParameter {
    async fn handle(&self, context: &mut ValidateTokenRequestContext) -> Result<()> {
        if !context.transaction.request.is_refresh_token_grant_type() {
            return Ok(());
        }

        let Some(refresh_token) = context
            .transaction
            .request
            .refresh_token()
            .map(str::to_string)
        else {
            context.validation.reject(
                errors::INVALID_REQUEST,
                "The mandatory 'refresh_token' parameter is missing.",
                None,
            );
            return Ok(());
        };

        let Some(principal) = self
            .services
            .serializer
            .deserialize_refresh_token(&refresh_token)
            .await?
        else {
            context.validation.reject(
                errors::INVALID_GRANT,
                "The specified refresh token is invalid or has expired.",
                None,
            );
            return Ok(());
        };

        if principal.client_id() != context.client_id.as_deref() {
            context.validation.reject(
                errors::INVALID_GRANT,
                "The specified refresh token was issued to another client.",
                None,
            );
            return Ok(());
        }

        if !context.transaction.options.enable_degraded_mode
            && !context.transaction.options.disable_token_storage
        {
            let Some(entry) = (match principal.token_id() {
                Some(id) => self.services.tokens()?.find_by_id(id).await?,
                None => None,
            }) else {
                context.validation.reject(
                    errors::INVALID_GRANT,
                    "The specified refresh token cannot be found.",
                    None,
                );
                return Ok(());
            };
            if !entry.is_valid() {
                context.validation.reject(
                    errors::INVALID_GRANT,
                    "The specified refresh token is no longer valid.",
                    None,
                );
                return Ok(());
            }
            context.token_entry = Some(entry);
        }

        context.principal = Some(principal);
        Ok(())
    }
}

pub(crate) struct ValidateResourceOwnerCredentials;

#[async_trait]
impl EventHandler<ValidateTokenRequestContext> for ValidateResourceOwnerCredentials {
    async fn handle(&self, context: &mut ValidateTokenRequestContext) -> Result<()> {
        if !context.transaction.request.is_password_grant_type() {
            return Ok(());
        }
        let request = &context.transaction.request;
        if request.username().is_none_or(str::is_empty)
            || request.password().is_none_or(str::is_empty)
        {
            context.validation.reject(
                errors::INVALID_REQUEST,
                "The mandatory 'username' and 'password' parameters are missing.",
                None,
            );
        }
        Ok(())
    }
}

/// When a grant is re-negotiated with an explicit `scope`, the requested
/// set must be a subset of the originally granted one.
pub(crate) struct ValidateScopeSubset;

#[async_trait]
impl EventHandler<ValidateTokenRequestContext> for ValidateScopeSubset {
    async fn handle(&self, context: &mut ValidateTokenRequestContext) -> Result<()> {
        let Some(principal) = context.principal.as_ref() else {
            return Ok(());
        };
        if context.transaction.request.scope().is_none() {
            return Ok(());
        }
        for scope in context.transaction.request.get_scopes() {
            if !principal.has_scope(scope) {
                context.validation.reject(
                    errors::INVALID_SCOPE,
                    format!("The scope '{scope}' is not part of the original grant."),
                    None,
                );
                return Ok(());
            }
        }
        Ok(())
    }
}

/// Scope existence check for the grants that introduce fresh scopes.
pub(crate) struct ValidateRequestedScopes {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<ValidateTokenRequestContext> for ValidateRequestedScopes {
    async fn handle(&self, context: &mut ValidateTokenRequestContext) -> Result<()> {
        let request = &context.transaction.request;
        if !request.is_client_credentials_grant_type() && !request.is_password_grant_type() {
            return Ok(());
        }
        let requested: Vec<String> = request
            .get_scopes()
            .into_iter()
            .filter(|scope| {
                *scope != crate::constants::scopes::OPENID
                    && *scope != crate::constants::scopes::OFFLINE_ACCESS
            })
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

/// Marks the presented authorization code redeemed. The conditional write
/// resolves concurrent redemptions: the first caller wins, every other one
/// gets `invalid_grant`.
pub(crate) struct RedeemAuthorizationCodeEntry {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<HandleTokenRequestContext> for RedeemAuthorizationCodeEntry {
    async fn handle(&self, context: &mut HandleTokenRequestContext) -> Result<()> {
        if !context.transaction.request.is_authorization_code_grant_type() {
            return Ok(());
        }
        let Some(entry) = context.token_entry.as_mut() else {
            return Ok(());
        };
        if !self.services.tokens()?.try_redeem(entry).await? {
            tracing::info!(token = %entry.id, "authorization code replay detected");
            context.validation.reject(
                errors::INVALID_GRANT,
                "The specified authorization code has already been redeemed.",
                None,
            );
        }
        Ok(())
    }
}

/// Rolls the presented refresh token when single-use refresh tokens are
/// enabled.
pub(crate) struct RedeemRefreshTokenEntry {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<HandleTokenRequestContext> for RedeemRefreshTokenEntry {
    async fn handle(&self, context: &mut HandleTokenRequestContext) -> Result<()> {
        if !context.transaction.request.is_refresh_token_grant_type()
            || !context.transaction.options.use_rolling_refresh_tokens
        {
            return Ok(());
        }
        let Some(entry) = context.token_entry.as_mut() else {
            return Ok(());
        };
        if !self.services.tokens()?.try_redeem(entry).await? {
            context.validation.reject(
                errors::INVALID_GRANT,
                "The specified refresh token has already been redeemed.",
                None,
            );
        }
        Ok(())
    }
}

/// Synthesizes the principal for code and refresh token exchanges from the
/// principal carried by the presented grant.
pub(crate) struct PrepareExchangePrincipal;

#[async_trait]
impl EventHandler<HandleTokenRequestContext> for PrepareExchangePrincipal {
    async fn handle(&self, context: &mut HandleTokenRequestContext) -> Result<()> {
        let request = &context.transaction.request;
        if !request.is_authorization_code_grant_type() && !request.is_refresh_token_grant_type() {
            return Ok(());
        }
        let Some(source) = context.source_principal.as_ref() else {
            return Ok(());
        };
        let Some(subject) = source.subject() else {
            return Ok(());
        };

        let mut principal = Principal::new(subject);
        if let Some(client_id) = source.client_id() {
            principal.set_client_id(client_id);
        }
        if let Some(authorization_id) = source.authorization_id() {
            principal.set_authorization_id(authorization_id);
        }

        // An explicit scope narrows the grant; otherwise it carries over.
        if request.scope().is_some() {
            principal.set_scopes(request.get_scopes());
        } else {
            principal.set_scopes(source.scopes().to_vec());
        }
        principal.set_audiences(source.audiences().to_vec());

        for (name, value) in source.claims() {
            if !EXCHANGE_CLAIMS.contains(&name) {
                principal.set_claim(name, value.clone());
            }
        }

        context.sign_in(principal);
        Ok(())
    }
}

/// Synthesizes the principal for the client credentials grant: the client
/// itself is the subject.
pub(crate) struct PrepareClientCredentialsPrincipal;

#[async_trait]
impl EventHandler<HandleTokenRequestContext> for PrepareClientCredentialsPrincipal {
    async fn handle(&self, context: &mut HandleTokenRequestContext) -> Result<()> {
        if !context.transaction.request.is_client_credentials_grant_type() {
            return Ok(());
        }
        let Some(client_id) = context.transaction.request.client_id().map(str::to_string) else {
            return Ok(());
        };

        let principal = Principal::new(&client_id)
            .with_client_id(&client_id)
            .with_scopes(context.transaction.request.get_scopes());
        context.sign_in(principal);
        Ok(())
    }
}

/// Verify a PKCE challenge against the presented verifier, in constant
/// time.
pub(crate) fn verify_code_challenge(challenge: &str, verifier: &str, method: &str) -> bool {
    match method {
        code_challenge_methods::S256 => {
            let digest = Sha256::digest(verifier.as_bytes());
            let encoded = URL_SAFE_NO_PAD.encode(digest);
            encoded.as_bytes().ct_eq(challenge.as_bytes()).into()
        }
        code_challenge_methods::PLAIN => verifier.as_bytes().ct_eq(challenge.as_bytes()).into(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s256_challenge_round_trip() {
        // Verifier/challenge pair from RFC 7636 appendix B.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert!(verify_code_challenge(challenge, verifier, "S256"));
        assert!(!verify_code_challenge(challenge, "wrong-verifier", "S256"));
    }

    #[test]
    fn plain_challenge_compares_byte_for_byte() {
        assert!(verify_code_challenge("abc", "abc", "plain"));
        assert!(!verify_code_challenge("abc", "ABC", "plain"));
        assert!(!verify_code_challenge("abc", "abc", "unknown"));
    }
}
