use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mailgraph::auth::{CredentialRecord, TokenManager};
use mailgraph::{AuthStatus, Config, MailgraphError};

fn test_config(authority_base: &str, cache: PathBuf) -> Config {
    Config {
        client_id: "client-id".into(),
        client_secret: "client-secret".into(),
        tenant_id: "test-tenant".into(),
        authority: format!("{authority_base}/oauth2/v2.0"),
        graph_url: format!("{authority_base}/v1.0"),
        redirect_uri: "http://localhost:3333/auth/callback".into(),
        token_cache: cache,
    }
}

fn token_response(
    access: &str,
    refresh: Option<&str>,
    expires_in: i64,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "token_type": "Bearer",
        "access_token": access,
        "expires_in": expires_in,
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = serde_json::json!(refresh);
    }
    body
}

fn expired_record() -> CredentialRecord {
    CredentialRecord {
        access_token: Some("stale".into()),
        refresh_token: Some("R1".into()),
        expires_on: Some(Utc::now() - Duration::hours(1)),
    }
}

fn write_cache(path: &PathBuf, record: &CredentialRecord) {
    std::fs::write(path, serde_json::to_string(record).unwrap()).unwrap();
}

fn read_cache(path: &PathBuf) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn expired_token_is_refreshed_and_persisted() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("tokens.json");
    write_cache(&cache, &expired_record());

    Mock::given(method("POST"))
        .and(path("/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=R1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_response("A2", Some("R2"), 3600)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = TokenManager::new(&test_config(&server.uri(), cache.clone()));
    assert_eq!(manager.get_access_token().await.unwrap(), "A2");
    assert!(matches!(
        manager.status().await,
        AuthStatus::Authenticated { .. }
    ));

    let persisted = read_cache(&cache);
    assert_eq!(persisted["accessToken"], "A2");
    assert_eq!(persisted["refreshToken"], "R2");
    assert!(persisted["expiresOn"].is_string());
}

#[tokio::test]
async fn concurrent_callers_share_a_single_refresh() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("tokens.json");
    write_cache(&cache, &expired_record());

    Mock::given(method("POST"))
        .and(path("/oauth2/v2.0/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_response("A2", Some("R2"), 3600))
                .set_delay(std::time::Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = Arc::new(TokenManager::new(&test_config(&server.uri(), cache)));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(
            async move { manager.get_access_token().await },
        ));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "A2");
    }
    // Mock::expect(1) verifies on drop that exactly one exchange happened.
}

#[tokio::test]
async fn concurrent_callers_share_a_single_failure() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("tokens.json");
    write_cache(&cache, &expired_record());

    Mock::given(method("POST"))
        .and(path("/oauth2/v2.0/token"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_string("service unavailable")
                .set_delay(std::time::Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = Arc::new(TokenManager::new(&test_config(&server.uri(), cache)));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(
            async move { manager.get_access_token().await },
        ));
    }
    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, MailgraphError::TemporaryAuthFailure(_)));
    }
    // Still silently recoverable: the refresh token was not discarded.
    assert_eq!(manager.status().await, AuthStatus::NeedsRefresh);
}

#[tokio::test]
async fn refresh_without_new_refresh_token_carries_old_one_forward() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("tokens.json");
    write_cache(&cache, &expired_record());

    Mock::given(method("POST"))
        .and(path("/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response("A2", None, 3600)))
        .expect(1)
        .mount(&server)
        .await;

    let manager = TokenManager::new(&test_config(&server.uri(), cache.clone()));
    assert_eq!(manager.get_access_token().await.unwrap(), "A2");

    let persisted = read_cache(&cache);
    assert_eq!(persisted["accessToken"], "A2");
    assert_eq!(persisted["refreshToken"], "R1");
}

#[tokio::test]
async fn invalid_grant_downgrades_to_unauthenticated_without_retrying() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("tokens.json");
    write_cache(&cache, &expired_record());

    Mock::given(method("POST"))
        .and(path("/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "AADSTS70000: the refresh token has expired",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = TokenManager::new(&test_config(&server.uri(), cache.clone()));
    let err = manager.get_access_token().await.unwrap_err();
    assert!(matches!(err, MailgraphError::AuthenticationRequired));
    assert_eq!(manager.status().await, AuthStatus::Unauthenticated);

    // Second call fails immediately; Mock::expect(1) proves no further
    // network call was made.
    let err = manager.get_access_token().await.unwrap_err();
    assert!(matches!(err, MailgraphError::AuthenticationRequired));

    // The on-disk record is only ever deleted by operator action.
    assert!(cache.exists());
}

#[tokio::test]
async fn transient_failure_leaves_refresh_possible() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("tokens.json");
    write_cache(&cache, &expired_record());

    // First attempt hits an outage, the next one succeeds.
    Mock::given(method("POST"))
        .and(path("/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v2.0/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_response("A2", Some("R2"), 3600)),
        )
        .mount(&server)
        .await;

    let manager = TokenManager::new(&test_config(&server.uri(), cache));
    let err = manager.get_access_token().await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(manager.status().await, AuthStatus::NeedsRefresh);

    assert_eq!(manager.get_access_token().await.unwrap(), "A2");
}

#[tokio::test]
async fn fresh_state_end_to_end_interactive_flow() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("tokens.json");

    Mock::given(method("POST"))
        .and(path("/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=validcode"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_response("A1", Some("R1"), 3600)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = TokenManager::new(&test_config(&server.uri(), cache.clone()));

    // No cache file: nothing to refresh, nothing usable.
    let err = manager.get_access_token().await.unwrap_err();
    assert!(matches!(err, MailgraphError::AuthenticationRequired));

    let url = manager.begin_interactive_authorization().await;
    assert!(url.contains("localhost%3A3333%2Fauth%2Fcallback"));
    assert!(url.contains("response_type=code"));

    manager
        .complete_interactive_authorization("validcode")
        .await
        .unwrap();

    let persisted = read_cache(&cache);
    assert_eq!(persisted["accessToken"], "A1");
    assert_eq!(persisted["refreshToken"], "R1");

    // Cached token is served without touching the network again
    // (Mock::expect(1) verifies).
    assert_eq!(manager.get_access_token().await.unwrap(), "A1");
}

#[tokio::test]
async fn failed_code_exchange_drops_to_unauthenticated() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("tokens.json");

    Mock::given(method("POST"))
        .and(path("/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "AADSTS70008: the code has expired",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = TokenManager::new(&test_config(&server.uri(), cache));
    manager.begin_interactive_authorization().await;
    let err = manager
        .complete_interactive_authorization("expiredcode")
        .await
        .unwrap_err();
    assert!(matches!(err, MailgraphError::InvalidGrant(_)));
    assert_eq!(manager.status().await, AuthStatus::Unauthenticated);
}

#[tokio::test]
async fn unsolicited_code_is_still_completable() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("tokens.json");

    Mock::given(method("POST"))
        .and(path("/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_response("A1", Some("R1"), 3600)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = TokenManager::new(&test_config(&server.uri(), cache));
    // No begin_interactive_authorization first: the exchange simply carries
    // no PKCE verifier.
    manager
        .complete_interactive_authorization("outofband")
        .await
        .unwrap();
    assert!(matches!(
        manager.status().await,
        AuthStatus::Authenticated { .. }
    ));
}

#[tokio::test]
async fn persistence_failure_does_not_block_token_acquisition() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    // A directory at the cache path makes every save fail.
    let cache = dir.path().join("tokens.json");
    std::fs::create_dir(&cache).unwrap();

    Mock::given(method("POST"))
        .and(path("/oauth2/v2.0/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_response("A1", Some("R1"), 3600)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = TokenManager::new(&test_config(&server.uri(), cache));
    manager
        .complete_interactive_authorization("validcode")
        .await
        .unwrap();

    // Save failed, but in-memory state stays authoritative for this process.
    assert_eq!(manager.get_access_token().await.unwrap(), "A1");
}
