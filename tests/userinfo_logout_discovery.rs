//! Userinfo, logout and discovery endpoint flows.

mod common;

use std::sync::Arc;

use common::*;
use oidc_server::transaction::property_keys;
use oidc_server::{EndpointType, HttpMethod};
use oidc_server::prelude::*;

#[tokio::test]
async fn userinfo_returns_subject_and_scope_gated_claims() {
    let (server, _store) = test_server(default_options()).await;
    let response = exchange_code(&server).await;
    let access_token = response.access_token().unwrap().to_string();

    let userinfo = bearer_request(&server, EndpointType::Userinfo, &access_token);
    let userinfo = server.process(userinfo).await.unwrap();

    let message = userinfo.response.message();
    assert_eq!(message.get_str("sub"), Some("alice"));
    // profile and email scopes were granted.
    assert_eq!(message.get_str("name"), Some("Alice Liddell"));
    assert_eq!(message.get_str("email"), Some("alice@example.com"));
    // The phone scope was not granted, so its claims stay out.
    assert!(!message.has("phone_number"));
}

#[tokio::test]
async fn userinfo_without_profile_scope_omits_profile_claims() {
    let (server, _store) = test_server(default_options()).await;

    let transaction = authorize_request(
        &server,
        &[
            ("client_id", "c1"),
            ("response_type", "code"),
            ("redirect_uri", "https://app/cb"),
            ("scope", "openid email"),
        ],
    );
    let transaction = server.process(transaction).await.unwrap();
    let code = transaction.response.code().unwrap().to_string();

    let exchange = form_request(
        &server,
        EndpointType::Token,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "https://app/cb"),
            ("client_id", "c1"),
            ("client_secret", CONFIDENTIAL_SECRET),
        ],
    );
    let exchange = server.process(exchange).await.unwrap();
    let access_token = exchange.response.access_token().unwrap().to_string();

    let userinfo = bearer_request(&server, EndpointType::Userinfo, &access_token);
    let userinfo = server.process(userinfo).await.unwrap();

    let message = userinfo.response.message();
    assert_eq!(message.get_str("sub"), Some("alice"));
    assert_eq!(message.get_str("email"), Some("alice@example.com"));
    assert!(!message.has("name"));
}

#[tokio::test]
async fn userinfo_rejects_garbage_tokens() {
    let (server, _store) = test_server(default_options()).await;

    let userinfo = bearer_request(&server, EndpointType::Userinfo, "not-a-token");
    let userinfo = server.process(userinfo).await.unwrap();
    assert_eq!(userinfo.response.error(), Some("invalid_token"));
}

#[tokio::test]
async fn userinfo_rejects_revoked_tokens() {
    let (server, _store) = test_server(default_options()).await;
    let response = exchange_code(&server).await;
    let access_token = response.access_token().unwrap().to_string();
    let refresh_token = response.refresh_token().unwrap().to_string();

    // Revoking the refresh token kills the sibling access token.
    let revoke = form_request(
        &server,
        EndpointType::Revocation,
        &[
            ("token", &refresh_token),
            ("client_id", "c1"),
            ("client_secret", CONFIDENTIAL_SECRET),
        ],
    );
    server.process(revoke).await.unwrap();

    let userinfo = bearer_request(&server, EndpointType::Userinfo, &access_token);
    let userinfo = server.process(userinfo).await.unwrap();
    assert_eq!(userinfo.response.error(), Some("invalid_token"));
}

#[tokio::test]
async fn logout_redirects_to_a_registered_uri() {
    let (server, _store) = test_server(default_options()).await;

    let transaction = server
        .create_transaction()
        .with_endpoint(EndpointType::Logout)
        .with_transport(Transport {
            method: HttpMethod::Get,
            query: vec![
                (
                    "post_logout_redirect_uri".to_string(),
                    "https://app/signed-out".to_string(),
                ),
                ("state".to_string(), "after".to_string()),
            ],
            ..Default::default()
        });
    let transaction = server.process(transaction).await.unwrap();

    assert!(transaction.response.error().is_none());
    let destination = transaction
        .property_str(property_keys::RESPONSE_DESTINATION)
        .expect("logout redirect");
    assert!(destination.starts_with("https://app/signed-out?"));
    assert!(destination.contains("state=after"));
}

#[tokio::test]
async fn logout_with_unregistered_uri_is_rejected() {
    let (server, _store) = test_server(default_options()).await;

    let transaction = server
        .create_transaction()
        .with_endpoint(EndpointType::Logout)
        .with_transport(Transport {
            method: HttpMethod::Get,
            query: vec![(
                "post_logout_redirect_uri".to_string(),
                "https://evil/".to_string(),
            )],
            ..Default::default()
        });
    let transaction = server.process(transaction).await.unwrap();

    assert_eq!(transaction.response.error(), Some("invalid_request"));
    assert!(
        transaction
            .property_str(property_keys::RESPONSE_DESTINATION)
            .is_none()
    );
}

#[tokio::test]
async fn logout_is_denied_without_host_approval() {
    // No handler on the handle-logout event ever calls `allow_logout()`,
    // so the demand must be denied even though the URI is registered.
    let server = AuthorizationServer::builder(default_options())
        .with_memory_store(Arc::new(MemoryStore::new()))
        .build()
        .unwrap();
    server
        .applications()
        .unwrap()
        .create(&ApplicationDescriptor {
            client_id: Some("c1".to_string()),
            post_logout_redirect_uris: vec!["https://app/signed-out".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();

    let transaction = server
        .create_transaction()
        .with_endpoint(EndpointType::Logout)
        .with_transport(Transport {
            method: HttpMethod::Get,
            query: vec![
                (
                    "post_logout_redirect_uri".to_string(),
                    "https://app/signed-out".to_string(),
                ),
                ("state".to_string(), "after".to_string()),
            ],
            ..Default::default()
        });
    let transaction = server.process(transaction).await.unwrap();

    assert!(transaction.response.error().is_none());
    assert!(
        transaction
            .property_str(property_keys::RESPONSE_DESTINATION)
            .is_none()
    );
    assert!(transaction.property(property_keys::LOGOUT_ALLOWED).is_none());
}

#[tokio::test]
async fn logout_without_redirect_still_succeeds() {
    let (server, _store) = test_server(default_options()).await;

    let transaction = server
        .create_transaction()
        .with_endpoint(EndpointType::Logout)
        .with_transport(Transport {
            method: HttpMethod::Get,
            ..Default::default()
        });
    let transaction = server.process(transaction).await.unwrap();
    assert!(transaction.response.error().is_none());
    assert!(
        transaction
            .property_str(property_keys::RESPONSE_DESTINATION)
            .is_none()
    );
}

#[tokio::test]
async fn discovery_document_reflects_the_configuration() {
    let (server, _store) = test_server(default_options()).await;

    let transaction = server
        .create_transaction()
        .with_endpoint(EndpointType::Configuration);
    let transaction = server.process(transaction).await.unwrap();

    let message = transaction.response.message();
    assert_eq!(message.get_str("issuer"), Some("https://id.example.com"));
    assert_eq!(
        message.get_str("authorization_endpoint"),
        Some("https://id.example.com/connect/authorize")
    );
    assert_eq!(
        message.get_str("token_endpoint"),
        Some("https://id.example.com/connect/token")
    );

    let grants = message.get("grant_types_supported").unwrap().as_string_array();
    assert!(grants.contains(&"authorization_code"));
    assert!(grants.contains(&"refresh_token"));
    assert!(!grants.contains(&"password"));

    let methods = message
        .get("code_challenge_methods_supported")
        .unwrap()
        .as_string_array();
    assert!(methods.contains(&"S256"));

    let scopes = message.get("scopes_supported").unwrap().as_string_array();
    assert!(scopes.contains(&"openid"));
    assert!(scopes.contains(&"api.read"));
}

#[tokio::test]
async fn jwks_never_publishes_symmetric_keys() {
    let (server, _store) = test_server(default_options()).await;

    let transaction = server
        .create_transaction()
        .with_endpoint(EndpointType::Cryptography);
    let transaction = server.process(transaction).await.unwrap();

    let keys = transaction.response.message().get("keys").unwrap().to_json();
    assert_eq!(keys.as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn endpoint_inference_routes_by_path() {
    let (server, _store) = test_server(default_options()).await;

    let transaction = server.create_transaction().with_transport(Transport {
        method: HttpMethod::Get,
        scheme: Some("https".to_string()),
        host: Some("id.example.com".to_string()),
        path: Some("/.well-known/openid-configuration".to_string()),
        ..Default::default()
    });
    let transaction = server.process(transaction).await.unwrap();
    assert_eq!(transaction.endpoint_type, EndpointType::Configuration);
    assert!(transaction.response.message().has("issuer"));
}
