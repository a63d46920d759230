//! Shared fixtures for the endpoint flow tests.
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use oidc_server::HttpMethod;
use oidc_server::constants::permissions;
use oidc_server::events::{HandleAuthorizationRequestContext, HandleLogoutRequestContext};
use oidc_server::prelude::*;

pub const CONFIDENTIAL_SECRET: &str = "a-sufficiently-long-client-secret";

/// RFC 7636 appendix B verifier/challenge pair.
pub const PKCE_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const PKCE_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

/// Stand-in for the host's interactive consent UI: signs in a fixed user
/// granting every requested scope.
pub struct SignInAlice;

#[async_trait]
impl EventHandler<HandleAuthorizationRequestContext> for SignInAlice {
    async fn handle(&self, context: &mut HandleAuthorizationRequestContext) -> Result<()> {
        let scopes: Vec<String> = context
            .transaction
            .request
            .get_scopes()
            .into_iter()
            .map(str::to_string)
            .collect();
        let principal = Principal::new("alice")
            .with_scopes(scopes)
            .with_claim("name", "Alice Liddell")
            .with_claim("email", "alice@example.com")
            .with_claim("email_verified", true)
            .with_claim("phone_number", "+15550100");
        context.sign_in(principal);
        Ok(())
    }
}

/// Stand-in for the host's session layer: approves every logout demand.
pub struct AllowLogout;

#[async_trait]
impl EventHandler<HandleLogoutRequestContext> for AllowLogout {
    async fn handle(&self, context: &mut HandleLogoutRequestContext) -> Result<()> {
        context.allow_logout();
        Ok(())
    }
}

pub fn default_options() -> ServerOptions {
    ServerOptions::new()
        .issuer(Url::parse("https://id.example.com").unwrap())
        .add_signing_credentials(SigningCredentials::hmac(
            b"integration-test-signing-secret!",
            "test-key",
        ))
}

/// A server over a fresh in-memory store, with the consent stand-in
/// attached, one confidential client (`c1`), one public client (`c2`) and
/// the standard scopes registered.
pub async fn test_server(options: ServerOptions) -> (AuthorizationServer, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let mut builder = AuthorizationServer::builder(options).with_memory_store(store.clone());
    builder.registries().handle_authorization.register(HandlerDescriptor::singleton(
        "sign_in_alice",
        100_000,
        SignInAlice,
    ));
    builder.registries().handle_logout.register(HandlerDescriptor::singleton(
        "allow_logout",
        100_000,
        AllowLogout,
    ));
    let server = builder.build().expect("server should build");

    let shared_permissions = vec![
        permissions::endpoints::AUTHORIZATION.to_string(),
        permissions::endpoints::TOKEN.to_string(),
        permissions::endpoints::INTROSPECTION.to_string(),
        permissions::endpoints::REVOCATION.to_string(),
        permissions::endpoints::LOGOUT.to_string(),
        permissions::grant_types::AUTHORIZATION_CODE.to_string(),
        permissions::grant_types::REFRESH_TOKEN.to_string(),
        permissions::grant_types::CLIENT_CREDENTIALS.to_string(),
        permissions::grant_types::IMPLICIT.to_string(),
        permissions::response_types::CODE.to_string(),
        permissions::response_types::ID_TOKEN.to_string(),
        "scp:profile".to_string(),
        "scp:email".to_string(),
        "scp:api.read".to_string(),
    ];

    let applications = server.applications().expect("application store registered");
    applications
        .create(&ApplicationDescriptor {
            client_id: Some("c1".to_string()),
            client_secret: Some(CONFIDENTIAL_SECRET.to_string()),
            client_type: Some(ClientType::Confidential),
            consent_type: Some(ConsentType::Explicit),
            display_name: Some("First Party Web".to_string()),
            redirect_uris: vec!["https://app/cb".to_string()],
            post_logout_redirect_uris: vec!["https://app/signed-out".to_string()],
            permissions: shared_permissions.clone(),
            ..Default::default()
        })
        .await
        .expect("client registration");
    applications
        .create(&ApplicationDescriptor {
            client_id: Some("c2".to_string()),
            client_type: Some(ClientType::Public),
            redirect_uris: vec!["https://spa/cb".to_string()],
            permissions: shared_permissions,
            ..Default::default()
        })
        .await
        .expect("client registration");

    let scopes = server.scopes().expect("scope store registered");
    for (name, resources) in [
        ("profile", Vec::new()),
        ("email", Vec::new()),
        ("api.read", vec!["https://api".to_string()]),
    ] {
        scopes
            .create(&ScopeDescriptor {
                name: Some(name.to_string()),
                resources,
                ..Default::default()
            })
            .await
            .expect("scope registration");
    }

    (server, store)
}

fn pairs(params: &[(&str, &str)]) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// A GET transaction against the authorization endpoint.
pub fn authorize_request(server: &AuthorizationServer, query: &[(&str, &str)]) -> Transaction {
    server
        .create_transaction()
        .with_endpoint(EndpointType::Authorization)
        .with_transport(Transport {
            method: HttpMethod::Get,
            query: pairs(query),
            ..Default::default()
        })
}

/// A POST form transaction against the given endpoint.
pub fn form_request(
    server: &AuthorizationServer,
    endpoint: EndpointType,
    form: &[(&str, &str)],
) -> Transaction {
    server
        .create_transaction()
        .with_endpoint(endpoint)
        .with_transport(Transport {
            method: HttpMethod::Post,
            form: pairs(form),
            ..Default::default()
        })
}

/// A GET transaction with a bearer Authorization header.
pub fn bearer_request(
    server: &AuthorizationServer,
    endpoint: EndpointType,
    token: &str,
) -> Transaction {
    server
        .create_transaction()
        .with_endpoint(endpoint)
        .with_transport(Transport {
            method: HttpMethod::Get,
            authorization: Some(format!("Bearer {token}")),
            ..Default::default()
        })
}

/// Drive a complete authorization-code round trip and return the freshly
/// issued token response parameters.
pub async fn exchange_code(server: &AuthorizationServer) -> Response {
    let transaction = authorize_request(
        server,
        &[
            ("client_id", "c1"),
            ("response_type", "code"),
            ("redirect_uri", "https://app/cb"),
            ("scope", "openid profile email"),
            ("state", "xyz"),
            ("code_challenge", PKCE_CHALLENGE),
            ("code_challenge_method", "S256"),
        ],
    );
    let transaction = server.process(transaction).await.expect("authorization");
    let code = transaction
        .response
        .code()
        .expect("authorization code issued")
        .to_string();

    let exchange = form_request(
        server,
        EndpointType::Token,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "https://app/cb"),
            ("client_id", "c1"),
            ("client_secret", CONFIDENTIAL_SECRET),
            ("code_verifier", PKCE_VERIFIER),
        ],
    );
    let exchange = server.process(exchange).await.expect("code exchange");
    exchange.response
}

pub use oidc_server::Response;
