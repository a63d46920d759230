//! Token endpoint flows: code exchange, replay, PKCE, client
//! authentication, refresh and client credentials grants.

mod common;

use futures::TryStreamExt;

use common::*;
use oidc_server::EndpointType;
use oidc_server::prelude::*;

#[tokio::test]
async fn code_exchange_returns_the_full_grant() {
    let (server, _store) = test_server(default_options()).await;
    let response = exchange_code(&server).await;

    assert!(response.error().is_none());
    assert!(response.access_token().is_some());
    assert_eq!(response.token_type(), Some("Bearer"));
    assert!(response.expires_in().is_some_and(|value| value > 0));
    assert!(response.refresh_token().is_some());
    // The openid scope was granted, so an identity token is included.
    assert!(response.id_token().is_some());

    // The code entry transitioned to redeemed.
    let tokens: Vec<Token> = server
        .tokens()
        .unwrap()
        .list(None, None)
        .try_collect()
        .await
        .unwrap();
    let code_entry = tokens
        .iter()
        .find(|token| token.kind == TokenType::AuthorizationCode)
        .expect("code entry");
    assert_eq!(code_entry.status, TokenStatus::Redeemed);
    assert!(code_entry.redemption_date.is_some());
}

#[tokio::test]
async fn code_replay_yields_exactly_one_success() {
    let (server, _store) = test_server(default_options()).await;

    let transaction = authorize_request(
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

    let exchange = |code: String| {
        form_request(
            &server,
            EndpointType::Token,
            &[
                ("grant_type", "authorization_code"),
                ("code", &code),
                ("redirect_uri", "https://app/cb"),
                ("client_id", "c1"),
                ("client_secret", CONFIDENTIAL_SECRET),
                ("code_verifier", PKCE_VERIFIER),
            ],
        )
    };

    let first = server.process(exchange(code.clone())).await.unwrap();
    assert!(first.response.error().is_none());
    assert!(first.response.access_token().is_some());

    let second = server.process(exchange(code)).await.unwrap();
    assert_eq!(second.response.error(), Some("invalid_grant"));
    assert!(second.response.access_token().is_none());
}

#[tokio::test]
async fn wrong_pkce_verifier_is_rejected() {
    let (server, _store) = test_server(default_options()).await;

    let transaction = authorize_request(
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

    let exchange = form_request(
        &server,
        EndpointType::Token,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "https://app/cb"),
            ("client_id", "c1"),
            ("client_secret", CONFIDENTIAL_SECRET),
            ("code_verifier", "not-the-right-verifier-at-all-00000000000000"),
        ],
    );
    let exchange = server.process(exchange).await.unwrap();
    assert_eq!(exchange.response.error(), Some("invalid_grant"));
}

#[tokio::test]
async fn redirect_uri_must_match_the_authorization_request() {
    let (server, _store) = test_server(default_options()).await;

    let transaction = authorize_request(
        &server,
        &[
            ("client_id", "c1"),
            ("response_type", "code"),
            ("redirect_uri", "https://app/cb"),
            ("scope", "openid"),
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
            ("redirect_uri", "https://evil/cb"),
            ("client_id", "c1"),
            ("client_secret", CONFIDENTIAL_SECRET),
        ],
    );
    let exchange = server.process(exchange).await.unwrap();
    assert_eq!(exchange.response.error(), Some("invalid_grant"));
}

#[tokio::test]
async fn confidential_client_must_authenticate() {
    let (server, _store) = test_server(default_options()).await;

    let exchange = form_request(
        &server,
        EndpointType::Token,
        &[
            ("grant_type", "client_credentials"),
            ("client_id", "c1"),
        ],
    );
    let exchange = server.process(exchange).await.unwrap();
    assert_eq!(exchange.response.error(), Some("invalid_client"));
}

#[tokio::test]
async fn wrong_client_secret_is_rejected() {
    let (server, _store) = test_server(default_options()).await;

    let exchange = form_request(
        &server,
        EndpointType::Token,
        &[
            ("grant_type", "client_credentials"),
            ("client_id", "c1"),
            ("client_secret", "definitely-not-the-registered-secret"),
        ],
    );
    let exchange = server.process(exchange).await.unwrap();
    assert_eq!(exchange.response.error(), Some("invalid_client"));
}

#[tokio::test]
async fn public_client_must_not_send_a_secret() {
    let (server, _store) = test_server(default_options()).await;

    let exchange = form_request(
        &server,
        EndpointType::Token,
        &[
            ("grant_type", "authorization_code"),
            ("code", "whatever"),
            ("client_id", "c2"),
            ("client_secret", "public-clients-have-no-secret"),
        ],
    );
    let exchange = server.process(exchange).await.unwrap();
    assert_eq!(exchange.response.error(), Some("invalid_request"));
}

#[tokio::test]
async fn unknown_grant_type_is_rejected() {
    let (server, _store) = test_server(default_options()).await;

    let exchange = form_request(
        &server,
        EndpointType::Token,
        &[
            ("grant_type", "urn:example:magic"),
            ("client_id", "c1"),
            ("client_secret", CONFIDENTIAL_SECRET),
        ],
    );
    let exchange = server.process(exchange).await.unwrap();
    assert_eq!(exchange.response.error(), Some("unsupported_grant_type"));
}

#[tokio::test]
async fn client_credentials_grant_creates_an_ad_hoc_authorization() {
    let (server, _store) = test_server(default_options()).await;

    let exchange = form_request(
        &server,
        EndpointType::Token,
        &[
            ("grant_type", "client_credentials"),
            ("client_id", "c1"),
            ("client_secret", CONFIDENTIAL_SECRET),
            ("scope", "api.read"),
        ],
    );
    let exchange = server.process(exchange).await.unwrap();

    assert!(exchange.response.error().is_none());
    assert!(exchange.response.access_token().is_some());
    // Client credentials grants never get a refresh token.
    assert!(exchange.response.refresh_token().is_none());

    let authorizations: Vec<Authorization> = server
        .authorizations()
        .unwrap()
        .list(None, None)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(authorizations.len(), 1);
    assert_eq!(authorizations[0].kind, AuthorizationType::AdHoc);
    assert_eq!(authorizations[0].subject.as_deref(), Some("c1"));
}

#[tokio::test]
async fn refresh_token_grant_issues_a_new_access_token() {
    let (server, _store) = test_server(default_options()).await;
    let response = exchange_code(&server).await;
    let refresh_token = response.refresh_token().unwrap().to_string();

    let refresh = form_request(
        &server,
        EndpointType::Token,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", &refresh_token),
            ("client_id", "c1"),
            ("client_secret", CONFIDENTIAL_SECRET),
        ],
    );
    let refresh = server.process(refresh).await.unwrap();

    assert!(refresh.response.error().is_none());
    assert!(refresh.response.access_token().is_some());
    assert_ne!(
        refresh.response.access_token(),
        response.access_token(),
        "a fresh access token is issued"
    );
}

#[tokio::test]
async fn refresh_scope_must_be_a_subset_of_the_grant() {
    let (server, _store) = test_server(default_options()).await;
    let response = exchange_code(&server).await;
    let refresh_token = response.refresh_token().unwrap().to_string();

    let refresh = form_request(
        &server,
        EndpointType::Token,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", &refresh_token),
            ("client_id", "c1"),
            ("client_secret", CONFIDENTIAL_SECRET),
            ("scope", "openid profile email api.read"),
        ],
    );
    let refresh = server.process(refresh).await.unwrap();
    assert_eq!(refresh.response.error(), Some("invalid_scope"));
}

#[tokio::test]
async fn rolling_refresh_tokens_are_single_use() {
    let mut options = default_options();
    options.use_rolling_refresh_tokens = true;
    let (server, _store) = test_server(options).await;
    let response = exchange_code(&server).await;
    let refresh_token = response.refresh_token().unwrap().to_string();

    let refresh = |token: String| {
        form_request(
            &server,
            EndpointType::Token,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", &token),
                ("client_id", "c1"),
                ("client_secret", CONFIDENTIAL_SECRET),
            ],
        )
    };

    let first = server.process(refresh(refresh_token.clone())).await.unwrap();
    assert!(first.response.error().is_none());

    let second = server.process(refresh(refresh_token)).await.unwrap();
    assert_eq!(second.response.error(), Some("invalid_grant"));
}
