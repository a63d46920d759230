//! Configuration and JWKS endpoint handlers.

use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::{Value, json};

use crate::constants::{code_challenge_methods, grant_types, response_modes, scopes};
use crate::errors::{Result, ServerError};
use crate::events::{HandleConfigurationRequestContext, HandleJwksRequestContext};
use crate::handlers::protocol::SharedServices;
use crate::message::Parameter;
use crate::pipeline::EventHandler;

/// Builds the OpenID Connect discovery document from the options and the
/// registered scopes.
pub(crate) struct AttachConfigurationMetadata {
    pub services: SharedServices,
}

#[async_trait]
impl EventHandler<HandleConfigurationRequestContext> for AttachConfigurationMetadata {
    async fn handle(&self, context: &mut HandleConfigurationRequestContext) -> Result<()> {
        let options = context.transaction.options.clone();
        let issuer = context
            .transaction
            .issuer
            .as_ref()
            .ok_or_else(|| {
                ServerError::invalid_operation(
                    "the discovery document cannot be built without an issuer",
                )
            })?
            .as_str()
            .trim_end_matches('/')
            .to_string();

        let endpoint = |path: &Option<String>| {
            path.as_deref()
                .map(|path| format!("{issuer}{path}"))
        };

        let mut grants = Vec::new();
        if options.allow_authorization_code_flow {
            grants.push(grant_types::AUTHORIZATION_CODE.to_string());
        }
        if options.allow_implicit_flow || options.allow_hybrid_flow {
            grants.push(grant_types::IMPLICIT.to_string());
        }
        if options.allow_refresh_token_flow {
            grants.push(grant_types::REFRESH_TOKEN.to_string());
        }
        if options.allow_client_credentials_flow {
            grants.push(grant_types::CLIENT_CREDENTIALS.to_string());
        }
        if options.allow_password_flow {
            grants.push(grant_types::PASSWORD.to_string());
        }
        if options.allow_device_code_flow {
            grants.push(grant_types::DEVICE_CODE.to_string());
        }

        let mut response_types = Vec::new();
        if options.allow_authorization_code_flow {
            response_types.push("code".to_string());
        }
        if options.allow_implicit_flow {
            response_types.push("id_token".to_string());
            response_types.push("id_token token".to_string());
            response_types.push("token".to_string());
        }
        if options.allow_hybrid_flow {
            response_types.push("code id_token".to_string());
            response_types.push("code id_token token".to_string());
            response_types.push("code token".to_string());
        }

        let mut supported_scopes = vec![scopes::OPENID.to_string()];
        if options.allow_refresh_token_flow {
            supported_scopes.push(scopes::OFFLINE_ACCESS.to_string());
        }
        if let Some(manager) = self.services.scopes.as_deref()
            && !options.enable_degraded_mode
        {
            let registered: Vec<_> = manager.list(None, None).try_collect().await?;
            for scope in registered {
                if !supported_scopes.contains(&scope.name) {
                    supported_scopes.push(scope.name);
                }
            }
        }

        let algorithms: Vec<String> = options
            .signing_credentials
            .iter()
            .map(|credentials| format!("{:?}", credentials.algorithm))
            .collect();

        let message = context.transaction.response.message_mut();
        message.set("issuer", Some(Parameter::from(issuer.as_str())));
        let endpoints = [
            ("authorization_endpoint", &options.authorization_endpoint),
            ("token_endpoint", &options.token_endpoint),
            ("introspection_endpoint", &options.introspection_endpoint),
            ("revocation_endpoint", &options.revocation_endpoint),
            ("userinfo_endpoint", &options.userinfo_endpoint),
            ("end_session_endpoint", &options.logout_endpoint),
            ("jwks_uri", &options.jwks_endpoint),
        ];
        for (name, path) in endpoints {
            message.set(name, endpoint(path).map(Parameter::from));
        }
        message.set("grant_types_supported", Some(Parameter::from(grants)));
        message.set(
            "response_types_supported",
            Some(Parameter::from(response_types)),
        );
        message.set(
            "response_modes_supported",
            Some(Parameter::from(vec![
                response_modes::QUERY.to_string(),
                response_modes::FRAGMENT.to_string(),
                response_modes::FORM_POST.to_string(),
            ])),
        );
        message.set("scopes_supported", Some(Parameter::from(supported_scopes)));
        message.set(
            "claims_supported",
            Some(Parameter::from(options.claims_supported.clone())),
        );
        message.set(
            "code_challenge_methods_supported",
            Some(Parameter::from(vec![
                code_challenge_methods::PLAIN.to_string(),
                code_challenge_methods::S256.to_string(),
            ])),
        );
        if !algorithms.is_empty() {
            message.set(
                "id_token_signing_alg_values_supported",
                Some(Parameter::from(algorithms)),
            );
        }
        message.set(
            "token_endpoint_auth_methods_supported",
            Some(Parameter::from(vec![
                "client_secret_basic".to_string(),
                "client_secret_post".to_string(),
            ])),
        );
        message.set(
            "subject_types_supported",
            Some(Parameter::from(vec!["public".to_string()])),
        );

        context.state.handle_request();
        Ok(())
    }
}

/// Publishes the asymmetric signing keys in JWK form.
pub(crate) struct AttachJsonWebKeys;

#[async_trait]
impl EventHandler<HandleJwksRequestContext> for AttachJsonWebKeys {
    async fn handle(&self, context: &mut HandleJwksRequestContext) -> Result<()> {
        let mut keys = Vec::new();
        for credentials in &context.transaction.options.signing_credentials {
            // Symmetric keys are never published.
            let Some(jwk) = credentials.public_jwk.clone() else {
                continue;
            };
            let mut jwk = match jwk {
                Value::Object(map) => map,
                other => {
                    return Err(ServerError::config(format!(
                        "the public JWK for key '{}' must be a JSON object, got {other}",
                        credentials.key_id
                    )));
                }
            };
            jwk.entry("kid".to_string())
                .or_insert_with(|| Value::String(credentials.key_id.clone()));
            jwk.entry("alg".to_string())
                .or_insert_with(|| Value::String(format!("{:?}", credentials.algorithm)));
            jwk.entry("use".to_string())
                .or_insert_with(|| Value::String("sig".to_string()));
            keys.push(Value::Object(jwk));
        }

        context
            .transaction
            .response
            .message_mut()
            .set("keys", Some(Parameter::Json(json!(keys))));
        context.state.handle_request();
        Ok(())
    }
}
