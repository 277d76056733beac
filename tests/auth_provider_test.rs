//! Token provider integration tests using wiremock
//!
//! Verifies `src/auth/provider.rs` end to end against a mock Weaviate
//! discovery endpoint and a mock token endpoint:
//!
//! - Tokens are cached within their validity window and refreshed after.
//! - Concurrent callers share a single exchange.
//! - Bearer tokens without a refresh token are served verbatim.
//! - Rotated refresh tokens are used for the next refresh.
//! - Refresh failures are absorbed while the cached token is still valid.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use weaviate_auth::auth::discovery::ProviderMetadata;
use weaviate_auth::auth::exchange::{OidcConfig, TokenExchanger};
use weaviate_auth::auth::grant::GrantStrategy;
use weaviate_auth::auth::provider::{AuthSettings, Credentials, TokenProvider};
use weaviate_auth::auth::token::Token;
use weaviate_auth::auth::RequestAuthenticator;
use weaviate_auth::error::AuthError;

use common::{metadata_body, mount_discovery, token_body, SequentialTokens, DISCOVERY_PATH};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn base_url(server: &MockServer) -> Url {
    Url::parse(&server.uri()).expect("valid mock server URL")
}

fn http() -> Arc<reqwest::Client> {
    Arc::new(reqwest::Client::new())
}

fn client_credentials_settings() -> AuthSettings {
    AuthSettings::new(Credentials::ClientCredentials {
        client_secret: "s3cret".to_string(),
    })
    .with_client_id("wcs")
    .with_scopes(["openid"])
}

fn refresh_settings(access: &str, refresh: &str, lifetime_seconds: u64) -> AuthSettings {
    AuthSettings::new(Credentials::BearerToken {
        access_token: access.to_string(),
        lifetime_seconds,
        refresh_token: Some(refresh.to_string()),
    })
    .with_client_id("wcs")
}

/// Provider seeded with `seed` whose token endpoint lives on `server`.
fn refresh_provider(server: &MockServer, seed: Token, margin_seconds: i64) -> TokenProvider {
    let metadata =
        ProviderMetadata::new(Url::parse(&format!("{}/token", server.uri())).unwrap());
    TokenProvider::new(
        metadata,
        OidcConfig::new("wcs", ["openid"]),
        GrantStrategy::RefreshToken { current: seed },
        TokenExchanger::new(http()),
        chrono::Duration::seconds(margin_seconds),
    )
}

fn auth_error(err: &anyhow::Error) -> &AuthError {
    err.downcast_ref::<AuthError>()
        .unwrap_or_else(|| panic!("expected AuthError, got {err:?}"))
}

// ---------------------------------------------------------------------------
// Client credentials
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_short_lived_token_is_refreshed_after_expiry() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    let tokens = SequentialTokens::new(2);
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(tokens.clone())
        .expect(2)
        .mount(&server)
        .await;

    let provider = TokenProvider::connect(http(), &base_url(&server), client_credentials_settings())
        .await
        .unwrap();

    let first = provider.get_access_token().await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    let second = provider.get_access_token().await.unwrap();

    assert_eq!(first, "token-1");
    assert_eq!(second, "token-2");
    assert_ne!(first, second);
    assert_eq!(tokens.issued(), 2);
    server.verify().await;
}

#[tokio::test]
async fn test_repeated_calls_within_validity_reuse_the_token() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(SequentialTokens::new(3600))
        .expect(1)
        .mount(&server)
        .await;

    let provider = TokenProvider::connect(http(), &base_url(&server), client_credentials_settings())
        .await
        .unwrap();

    for _ in 0..5 {
        assert_eq!(provider.get_access_token().await.unwrap(), "token-1");
    }
    server.verify().await;
}

#[tokio::test]
async fn test_initial_exchange_failure_propagates_from_connect() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": "invalid_client",
            "error_description": "Client authentication failed"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = TokenProvider::connect(http(), &base_url(&server), client_credentials_settings())
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Client authentication failed (code=invalid_client)"
    );
    server.verify().await;
}

#[tokio::test]
async fn test_server_hints_fill_in_client_id_and_scopes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "href": format!("{}/idp/.well-known/openid-configuration", server.uri()),
            "clientId": "hinted",
            "scopes": ["openid", "email"]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/idp/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(metadata_body(&server.uri())))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("client_id=hinted"))
        .and(body_string_contains("scope=email+openid"))
        .respond_with(SequentialTokens::new(3600))
        .expect(1)
        .mount(&server)
        .await;

    let settings = AuthSettings::new(Credentials::Password {
        username: "alice".to_string(),
        password: "pw".to_string(),
    });
    let provider = TokenProvider::connect(http(), &base_url(&server), settings)
        .await
        .unwrap();

    assert_eq!(provider.oidc(), &OidcConfig::new("hinted", ["openid", "email"]));
    assert_eq!(provider.get_access_token().await.unwrap(), "token-1");
    server.verify().await;
}

#[tokio::test]
async fn test_missing_client_id_without_hint_is_a_config_error() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    let settings = AuthSettings::new(Credentials::ClientCredentials {
        client_secret: "s3cret".to_string(),
    });
    let err = TokenProvider::connect(http(), &base_url(&server), settings)
        .await
        .unwrap_err();

    assert!(matches!(auth_error(&err), AuthError::Config(_)));
}

// ---------------------------------------------------------------------------
// Single-flight
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("fresh", Some("r2"), 3600))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let expired = Token::issued(
        "stale",
        Some("r1".to_string()),
        chrono::Utc::now() - chrono::Duration::seconds(120),
        60,
    )
    .unwrap();
    let metadata =
        ProviderMetadata::new(Url::parse(&format!("{}/token", server.uri())).unwrap());
    let provider = Arc::new(TokenProvider::new(
        metadata,
        OidcConfig::new("wcs", ["openid"]),
        GrantStrategy::RefreshToken { current: expired },
        TokenExchanger::new(http()),
        chrono::Duration::seconds(30),
    ));

    let callers = (0..10).map(|_| {
        let provider = Arc::clone(&provider);
        tokio::spawn(async move { provider.get_access_token().await })
    });
    let results = futures::future::join_all(callers).await;

    for result in results {
        assert_eq!(result.unwrap().unwrap(), "fresh");
    }
    server.verify().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_failed_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;

    let expired = Token::issued(
        "stale",
        Some("r1".to_string()),
        chrono::Utc::now() - chrono::Duration::seconds(120),
        60,
    )
    .unwrap();
    let provider = Arc::new(refresh_provider(&server, expired, 30));

    let callers = (0..5).map(|_| {
        let provider = Arc::clone(&provider);
        tokio::spawn(async move { provider.get_access_token().await })
    });
    let results = futures::future::join_all(callers).await;

    for result in results {
        let err = result.unwrap().unwrap_err();
        assert!(matches!(
            auth_error(&err),
            AuthError::TokenExchange { code, .. } if code == "http_500"
        ));
    }
    server.verify().await;
}

// ---------------------------------------------------------------------------
// Background refresh
// ---------------------------------------------------------------------------

/// 40s left of a 100s lifetime; a 60s margin is capped at 50s.
fn token_inside_margin() -> Token {
    Token::issued(
        "valid",
        Some("r1".to_string()),
        chrono::Utc::now() - chrono::Duration::seconds(60),
        100,
    )
    .unwrap()
}

#[tokio::test]
async fn test_token_inside_margin_is_served_without_waiting_on_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_secs(1)))
        .expect(1)
        .mount(&server)
        .await;

    let provider = refresh_provider(&server, token_inside_margin(), 60);

    let started = Instant::now();
    for _ in 0..3 {
        assert_eq!(provider.get_access_token().await.unwrap(), "valid");
    }
    assert!(started.elapsed() < Duration::from_millis(500));

    // Let the failed refresh finish; the back-off keeps later calls offline.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(provider.get_access_token().await.unwrap(), "valid");
    tokio::time::sleep(Duration::from_millis(200)).await;
    server.verify().await;
}

#[tokio::test]
async fn test_background_refresh_replaces_token_inside_margin() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("fresh", Some("r2"), 3600)))
        .expect(1)
        .mount(&server)
        .await;

    let provider = refresh_provider(&server, token_inside_margin(), 60);

    assert_eq!(provider.get_access_token().await.unwrap(), "valid");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(provider.get_access_token().await.unwrap(), "fresh");
    assert_eq!(provider.get_access_token().await.unwrap(), "fresh");
    server.verify().await;
}

#[tokio::test]
async fn test_password_grant_is_not_refreshed_in_background() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(SequentialTokens::new(4))
        .expect(1)
        .mount(&server)
        .await;

    let settings = AuthSettings::new(Credentials::Password {
        username: "alice".to_string(),
        password: "pw".to_string(),
    })
    .with_client_id("wcs");
    let provider = TokenProvider::connect(http(), &base_url(&server), settings)
        .await
        .unwrap();

    // Inside the margin (capped at 2s) but not expired.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(provider.get_access_token().await.unwrap(), "token-1");
    tokio::time::sleep(Duration::from_millis(300)).await;
    server.verify().await;
}

// ---------------------------------------------------------------------------
// Bearer tokens
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_bearer_without_refresh_token_is_served_after_expiry() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(SequentialTokens::new(3600))
        .expect(0)
        .mount(&server)
        .await;

    let settings = AuthSettings::new(Credentials::BearerToken {
        access_token: "supplied".to_string(),
        lifetime_seconds: 1,
        refresh_token: None,
    });
    let provider = TokenProvider::connect(http(), &base_url(&server), settings)
        .await
        .unwrap();

    assert_eq!(provider.get_access_token().await.unwrap(), "supplied");
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(provider.current_token().await.unwrap().is_expired());
    assert_eq!(provider.get_access_token().await.unwrap(), "supplied");
    server.verify().await;
}

#[tokio::test]
async fn test_rotated_refresh_token_is_used_for_next_refresh() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("a1", Some("r1"), 0)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("a2", Some("r2"), 3600)))
        .expect(1)
        .mount(&server)
        .await;

    // An already expired seed is refreshed during connect.
    let provider = TokenProvider::connect(http(), &base_url(&server), refresh_settings("a0", "r0", 0))
        .await
        .unwrap();

    assert_eq!(provider.get_access_token().await.unwrap(), "a2");
    let current = provider.current_token().await.unwrap();
    assert_eq!(current.refresh_token(), Some("r2"));
    server.verify().await;
}

#[tokio::test]
async fn test_refresh_unavailable_once_no_refresh_token_was_issued() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("refresh_token=r0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("a1", None, 0)))
        .expect(1)
        .mount(&server)
        .await;

    let provider = TokenProvider::connect(http(), &base_url(&server), refresh_settings("a0", "r0", 0))
        .await
        .unwrap();

    let err = provider.get_access_token().await.unwrap_err();
    assert!(matches!(
        auth_error(&err),
        AuthError::RefreshUnavailable(_)
    ));
    server.verify().await;
}

// ---------------------------------------------------------------------------
// Refresh failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_failed_refresh_serves_cached_token_until_expiry() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("first", None, 4)))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    // Margin is capped at half the 4s lifetime: refresh starts after 2s.
    let settings =
        client_credentials_settings().with_refresh_margin(chrono::Duration::seconds(3600));
    let provider = TokenProvider::connect(http(), &base_url(&server), settings)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(provider.get_access_token().await.unwrap(), "first");

    tokio::time::sleep(Duration::from_millis(2000)).await;
    let err = provider.get_access_token().await.unwrap_err();
    assert!(matches!(
        auth_error(&err),
        AuthError::TokenExchange { code, .. } if code == "http_503"
    ));
}

// ---------------------------------------------------------------------------
// Request authenticator
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_authenticator_attaches_provider_token() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(SequentialTokens::new(3600))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/schema"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "classes": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = TokenProvider::connect(http(), &base_url(&server), client_credentials_settings())
        .await
        .unwrap();
    let authenticator = RequestAuthenticator::new(Arc::new(provider));

    let response = authenticator
        .authorize(reqwest::Client::new().get(format!("{}/v1/schema", server.uri())))
        .await
        .unwrap()
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    server.verify().await;
}
