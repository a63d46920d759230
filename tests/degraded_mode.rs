//! Degraded-mode flows: no persistence layer, self-contained tokens only.

mod common;

use async_trait::async_trait;

use common::{PKCE_CHALLENGE, PKCE_VERIFIER, SignInAlice, default_options};
use oidc_server::events::HandleTokenRequestContext;
use oidc_server::transaction::property_keys;
use oidc_server::{EndpointType, HttpMethod};
use oidc_server::prelude::*;

fn degraded_server() -> AuthorizationServer {
    let mut options = default_options();
    options.enable_degraded_mode = true;
    let mut builder = AuthorizationServer::builder(options);
    builder.registries().handle_authorization.register(HandlerDescriptor::singleton(
        "sign_in_alice",
        100_000,
        SignInAlice,
    ));
    builder.build().expect("degraded server builds without stores")
}

fn authorize(server: &AuthorizationServer, query: &[(&str, &str)]) -> Transaction {
    server
        .create_transaction()
        .with_endpoint(EndpointType::Authorization)
        .with_transport(Transport {
            method: HttpMethod::Get,
            query: query
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            ..Default::default()
        })
}

fn token(server: &AuthorizationServer, form: &[(&str, &str)]) -> Transaction {
    server
        .create_transaction()
        .with_endpoint(EndpointType::Token)
        .with_transport(Transport {
            method: HttpMethod::Post,
            form: form
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            ..Default::default()
        })
}

#[tokio::test]
async fn code_flow_works_without_any_store() {
    let server = degraded_server();

    let transaction = authorize(
        &server,
        &[
            ("client_id", "c1"),
            ("response_type", "code"),
            ("redirect_uri", "https://app/cb"),
            ("scope", "openid profile"),
            ("state", "xyz"),
            ("code_challenge", PKCE_CHALLENGE),
            ("code_challenge_method", "S256"),
        ],
    );
    let transaction = server.process(transaction).await.unwrap();
    assert!(transaction.response.error().is_none());
    let code = transaction.response.code().expect("self-contained code").to_string();
    assert!(
        transaction
            .property_str(property_keys::RESPONSE_DESTINATION)
            .is_some()
    );

    let exchange = token(
        &server,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "https://app/cb"),
            ("client_id", "c1"),
            ("code_verifier", PKCE_VERIFIER),
        ],
    );
    let exchange = server.process(exchange).await.unwrap();
    assert!(exchange.response.error().is_none());
    assert!(exchange.response.access_token().is_some());
    assert!(exchange.response.id_token().is_some());
}

#[tokio::test]
async fn pkce_still_binds_codes_in_degraded_mode() {
    let server = degraded_server();

    let transaction = authorize(
        &server,
        &[
            ("client_id", "c1"),
            ("response_type", "code"),
            ("redirect_uri", "https://app/cb"),
            ("scope", "openid"),
            ("code_challenge", PKCE_CHALLENGE),
            ("code_challenge_method", "S256"),
        ],
    );
    let transaction = server.process(transaction).await.unwrap();
    let code = transaction.response.code().unwrap().to_string();

    let exchange = token(
        &server,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "https://app/cb"),
            ("client_id", "c1"),
            ("code_verifier", "an-entirely-wrong-verifier-value-0000000000"),
        ],
    );
    let exchange = server.process(exchange).await.unwrap();
    assert_eq!(exchange.response.error(), Some("invalid_grant"));
}

#[tokio::test]
async fn password_grant_requires_a_host_handler() {
    let mut options = default_options();
    options.enable_degraded_mode = true;
    options.allow_password_flow = true;
    let mut builder = AuthorizationServer::builder(options);
    builder.registries().handle_authorization.register(HandlerDescriptor::singleton(
        "sign_in_alice",
        100_000,
        SignInAlice,
    ));
    let server = builder.build().unwrap();

    let exchange = token(
        &server,
        &[
            ("grant_type", "password"),
            ("client_id", "c1"),
            ("username", "alice"),
            ("password", "wonderland"),
        ],
    );
    // Nothing produced a principal: that is a host configuration fault,
    // not a protocol error.
    let error = server.process(exchange).await.unwrap_err();
    assert!(matches!(error, ServerError::Configuration { .. }));
}

#[tokio::test]
async fn device_code_grant_without_host_handler_is_a_configuration_fault() {
    let mut options = default_options();
    options.enable_degraded_mode = true;
    options.allow_device_code_flow = true;
    let server = AuthorizationServer::builder(options).build().unwrap();

    let exchange = token(
        &server,
        &[
            ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
            ("client_id", "c1"),
            ("device_code", "GmRhmhcxhwAzkoEqiMEgi_DnyEysNkuNhszIySk9eS"),
        ],
    );
    // The grant is recognized and enabled, but nothing produced a
    // principal: that is a host configuration fault.
    let error = server.process(exchange).await.unwrap_err();
    assert!(matches!(error, ServerError::Configuration { .. }));
}

#[tokio::test]
async fn disabled_device_code_grant_is_rejected() {
    let server = degraded_server();

    let exchange = token(
        &server,
        &[
            ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
            ("client_id", "c1"),
            ("device_code", "GmRhmhcxhwAzkoEqiMEgi_DnyEysNkuNhszIySk9eS"),
        ],
    );
    let exchange = server.process(exchange).await.unwrap();
    assert_eq!(exchange.response.error(), Some("unsupported_grant_type"));
}

struct SignInFromPassword;

#[async_trait]
impl EventHandler<HandleTokenRequestContext> for SignInFromPassword {
    async fn handle(&self, context: &mut HandleTokenRequestContext) -> Result<()> {
        if !context.transaction.request.is_password_grant_type() {
            return Ok(());
        }
        let username = context.transaction.request.username().unwrap_or_default().to_string();
        let scopes: Vec<String> = context
            .transaction
            .request
            .get_scopes()
            .into_iter()
            .map(str::to_string)
            .collect();
        context.sign_in(Principal::new(username).with_scopes(scopes));
        Ok(())
    }
}

#[tokio::test]
async fn password_grant_with_a_host_handler_issues_tokens() {
    let mut options = default_options();
    options.enable_degraded_mode = true;
    options.allow_password_flow = true;
    let mut builder = AuthorizationServer::builder(options);
    builder.registries().handle_token.register(HandlerDescriptor::singleton(
        "sign_in_from_password",
        100_000,
        SignInFromPassword,
    ));
    let server = builder.build().unwrap();

    let exchange = token(
        &server,
        &[
            ("grant_type", "password"),
            ("client_id", "c1"),
            ("username", "alice"),
            ("password", "wonderland"),
            ("scope", "profile"),
        ],
    );
    let exchange = server.process(exchange).await.unwrap();
    assert!(exchange.response.error().is_none());
    assert!(exchange.response.access_token().is_some());
    assert!(exchange.response.refresh_token().is_some());
}
