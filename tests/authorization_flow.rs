//! Authorization endpoint flows against the in-memory store.

mod common;

use chrono::Utc;
use futures::TryStreamExt;

use common::*;
use oidc_server::EndpointType;
use oidc_server::prelude::*;
use oidc_server::transaction::property_keys;

#[tokio::test]
async fn authorization_code_happy_path() {
    let (server, _store) = test_server(default_options()).await;

    let transaction = authorize_request(
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

    // The response redirects back to the registered URI with code + state.
    assert!(transaction.response.error().is_none());
    let code = transaction.response.code().expect("code issued");
    assert_eq!(transaction.response.state(), Some("xyz"));
    let destination = transaction
        .property_str(property_keys::RESPONSE_DESTINATION)
        .expect("redirect destination");
    assert!(destination.starts_with("https://app/cb?"));
    assert!(destination.contains("code="));
    assert!(destination.contains("state=xyz"));

    // A permanent authorization was persisted for (alice, c1).
    let authorizations: Vec<Authorization> = server
        .authorizations()
        .unwrap()
        .list(None, None)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(authorizations.len(), 1);
    let authorization = &authorizations[0];
    assert_eq!(authorization.subject.as_deref(), Some("alice"));
    assert_eq!(authorization.status, AuthorizationStatus::Valid);
    assert_eq!(authorization.kind, AuthorizationType::Permanent);
    assert!(authorization.has_scopes(["openid", "profile"]));

    // The backing code entry is valid and expires within five minutes.
    let tokens: Vec<Token> = server
        .tokens()
        .unwrap()
        .list(None, None)
        .try_collect()
        .await
        .unwrap();
    let entry = tokens
        .iter()
        .find(|token| token.kind == TokenType::AuthorizationCode)
        .expect("code entry persisted");
    assert_eq!(entry.status, TokenStatus::Valid);
    assert_eq!(entry.subject.as_deref(), Some("alice"));
    let expiration = entry.expiration_date.expect("code expires");
    assert!(expiration <= Utc::now() + chrono::Duration::minutes(5));
    assert_eq!(entry.payload.as_deref(), Some(code));
}

#[tokio::test]
async fn missing_client_id_is_rejected_locally() {
    let (server, _store) = test_server(default_options()).await;

    let transaction = authorize_request(
        &server,
        &[
            ("response_type", "code"),
            ("redirect_uri", "https://app/cb"),
            ("scope", "openid"),
        ],
    );
    let transaction = server.process(transaction).await.unwrap();

    assert_eq!(transaction.response.error(), Some("invalid_request"));
    // Without a trusted client there is no redirect destination.
    assert!(
        transaction
            .property_str(property_keys::RESPONSE_DESTINATION)
            .is_none()
    );
}

#[tokio::test]
async fn redirect_uri_with_fragment_is_rejected() {
    let (server, _store) = test_server(default_options()).await;

    let transaction = authorize_request(
        &server,
        &[
            ("client_id", "c1"),
            ("response_type", "code"),
            ("redirect_uri", "https://app/cb#fragment"),
            ("scope", "openid"),
        ],
    );
    let transaction = server.process(transaction).await.unwrap();
    assert_eq!(transaction.response.error(), Some("invalid_request"));
}

#[tokio::test]
async fn relative_redirect_uri_is_rejected() {
    let (server, _store) = test_server(default_options()).await;

    let transaction = authorize_request(
        &server,
        &[
            ("client_id", "c1"),
            ("response_type", "code"),
            ("redirect_uri", "/cb"),
            ("scope", "openid"),
        ],
    );
    let transaction = server.process(transaction).await.unwrap();
    assert_eq!(transaction.response.error(), Some("invalid_request"));
}

#[tokio::test]
async fn query_response_mode_cannot_return_tokens() {
    let mut options = default_options();
    options.allow_implicit_flow = true;
    let (server, _store) = test_server(options).await;

    let transaction = authorize_request(
        &server,
        &[
            ("client_id", "c1"),
            ("response_type", "id_token token"),
            ("redirect_uri", "https://app/cb"),
            ("scope", "openid"),
            ("nonce", "n-0S6_WzA2Mj"),
            ("response_mode", "query"),
        ],
    );
    let transaction = server.process(transaction).await.unwrap();
    assert_eq!(transaction.response.error(), Some("invalid_request"));
}

#[tokio::test]
async fn implicit_flow_without_nonce_is_rejected() {
    let mut options = default_options();
    options.allow_implicit_flow = true;
    let (server, _store) = test_server(options).await;

    let transaction = authorize_request(
        &server,
        &[
            ("client_id", "c1"),
            ("response_type", "id_token"),
            ("redirect_uri", "https://app/cb"),
            ("scope", "openid"),
        ],
    );
    let transaction = server.process(transaction).await.unwrap();
    assert_eq!(transaction.response.error(), Some("invalid_request"));
}

#[tokio::test]
async fn unknown_scope_redirects_with_invalid_scope() {
    let (server, _store) = test_server(default_options()).await;

    let transaction = authorize_request(
        &server,
        &[
            ("client_id", "c1"),
            ("response_type", "code"),
            ("redirect_uri", "https://app/cb"),
            ("scope", "openid bogus"),
            ("state", "xyz"),
        ],
    );
    let transaction = server.process(transaction).await.unwrap();

    assert_eq!(transaction.response.error(), Some("invalid_scope"));
    // The redirect URI matches the registered client, so the error is
    // returned via redirect with the state echoed.
    let destination = transaction
        .property_str(property_keys::RESPONSE_DESTINATION)
        .expect("error redirect");
    assert!(destination.starts_with("https://app/cb?"));
    assert!(destination.contains("error=invalid_scope"));
    assert!(destination.contains("state=xyz"));
}

#[tokio::test]
async fn disabled_scope_validation_admits_unknown_scopes() {
    let mut options = default_options();
    options.disable_scope_validation = true;
    options.ignore_scope_permissions = true;
    let (server, _store) = test_server(options).await;

    let transaction = authorize_request(
        &server,
        &[
            ("client_id", "c1"),
            ("response_type", "code"),
            ("redirect_uri", "https://app/cb"),
            ("scope", "openid bogus"),
        ],
    );
    let transaction = server.process(transaction).await.unwrap();
    assert!(transaction.response.error().is_none());
    assert!(transaction.response.code().is_some());
}

#[tokio::test]
async fn unregistered_redirect_uri_is_rejected() {
    let (server, _store) = test_server(default_options()).await;

    let transaction = authorize_request(
        &server,
        &[
            ("client_id", "c1"),
            ("response_type", "code"),
            ("redirect_uri", "https://app/CB"),
            ("scope", "openid"),
        ],
    );
    let transaction = server.process(transaction).await.unwrap();
    assert_eq!(transaction.response.error(), Some("invalid_request"));
    assert!(
        transaction
            .property_str(property_keys::RESPONSE_DESTINATION)
            .is_none()
    );
}

#[tokio::test]
async fn request_parameter_is_not_supported() {
    let (server, _store) = test_server(default_options()).await;

    let transaction = authorize_request(
        &server,
        &[
            ("client_id", "c1"),
            ("response_type", "code"),
            ("redirect_uri", "https://app/cb"),
            ("request", "eyJhbGciOi..."),
        ],
    );
    let transaction = server.process(transaction).await.unwrap();
    assert_eq!(transaction.response.error(), Some("request_not_supported"));
}

#[tokio::test]
async fn pkce_method_requires_challenge() {
    let (server, _store) = test_server(default_options()).await;

    let transaction = authorize_request(
        &server,
        &[
            ("client_id", "c1"),
            ("response_type", "code"),
            ("redirect_uri", "https://app/cb"),
            ("scope", "openid"),
            ("code_challenge_method", "S256"),
        ],
    );
    let transaction = server.process(transaction).await.unwrap();
    assert_eq!(transaction.response.error(), Some("invalid_request"));
}

#[tokio::test]
async fn unknown_endpoint_passes_through_untouched() {
    let (server, _store) = test_server(default_options()).await;

    let transaction = server.create_transaction().with_endpoint(EndpointType::Unknown);
    let transaction = server.process(transaction).await.unwrap();
    assert!(transaction.response.message().is_empty());
}
