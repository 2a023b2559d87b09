//! Session-level tests of the plugin facade over a mock backend.


use std::sync::Arc;

use futures_util::future::join_all;
use psnsync_cache::{CachePersistence, LEGACY_COMMUNICATION_IDS_CACHE_KEY};
use psnsync_client::{HttpRequest, HttpResponse, StoredCredentials, TokenGrant};
use psnsync_core::{AuthOutcome, ConfigError, GameId, PresenceState, PsnError, TransportError};
use psnsync_plugin::{PluginConfig, PsnPlugin};
use psnsync_test_utils::fixtures;
use psnsync_test_utils::{MockTokenExchange, MockTransport, MockTrophyApi};
use serde_json::{json, Value};
use test_support::{game_ids, trophy, RecordingSink, TestHost};

// ============================================================================
// HELPERS
// ============================================================================

fn reply(body: Value) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse::new(200, body.to_string()))
}

/// Ids listed in a trophy-title-info request URL.
fn requested_title_ids(url: &str) -> Vec<String> {
    url.split("npTitleIds=")
        .nth(1)
        .and_then(|rest| rest.split('&').next())
        .map(|ids| ids.split(',').map(str::to_string).collect())
        .unwrap_or_default()
}

/// Answers every backend endpoint with the sample library fixtures.
fn library_backend(request: &HttpRequest) -> Result<HttpResponse, TransportError> {
    let url = request.url.as_str();
    if url.contains("npTitleIds=") {
        let ids = requested_title_ids(url);
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        reply(fixtures::title_info_reply(&refs))
    } else if url.contains("trophyGroups/all/trophies") {
        reply(fixtures::earned_trophies_reply())
    } else if url.contains("trophy/v1/trophyTitles?") {
        reply(fixtures::trophy_titles_reply(&[(
            fixtures::COMMUNICATION_ID,
            "2021-01-01T00:00:00Z",
        )]))
    } else if url.contains("users/me/profile2") {
        reply(fixtures::user_profile_reply())
    } else if url.contains("gamelist.api.playstation.com/v1") {
        reply(fixtures::owned_games_page())
    } else if url.contains("gamelist.api.playstation.com/v2") {
        reply(json!({"totalResults": 1, "titles": [
            {"titleId": "CUSA07917_00", "playDuration": "PT2H33M3S", "lastPlayedDateTime": "2021-03-06T16:29:22.490Z"}
        ]}))
    } else if url.contains("primaryOnlineStatus") {
        reply(json!({"totalResults": 2, "profiles": [
            {"accountId": "111", "onlineId": "alice", "primaryOnlineStatus": "online",
             "presences": [{"platform": "PS4", "lastOnlineDate": "2021-03-06T16:29:22Z"}]},
            {"accountId": "222", "onlineId": "bob", "primaryOnlineStatus": "offline"}
        ]}))
    } else if url.contains("friends/profiles2") {
        reply(json!({"totalResults": 2, "profiles": [
            {"accountId": "111", "onlineId": "alice"},
            {"accountId": "222", "onlineId": "bob"}
        ]}))
    } else if url.contains("graphql") {
        reply(json!({"data": {"oracleUserProfileRetrieve": {"isPsPlusMember": true}}}))
    } else {
        Err(TransportError::Backend { status: 404 })
    }
}

fn build_plugin(
    host: &TestHost,
    transport: Arc<MockTransport>,
    exchange: Arc<MockTokenExchange>,
) -> PsnPlugin {
    PsnPlugin::builder(PluginConfig::default(), host.services())
        .transport(transport)
        .token_exchange(exchange)
        .build()
        .expect("plugin should build")
}

async fn logged_in_plugin(host: &TestHost, transport: Arc<MockTransport>) -> PsnPlugin {
    let plugin = build_plugin(host, transport, MockTokenExchange::new());
    plugin
        .authenticate(&StoredCredentials::with_npsso("npsso-value"))
        .await
        .expect("authentication should succeed");
    plugin
}

// ============================================================================
// AUTHENTICATION
// ============================================================================

#[tokio::test]
async fn test_authenticate_without_npsso_asks_for_login() {
    let host = TestHost::new();
    let exchange = MockTokenExchange::new();
    let plugin = build_plugin(&host, MockTransport::new(library_backend), exchange.clone());

    let outcome = plugin
        .authenticate(&StoredCredentials::default())
        .await
        .expect("authenticate should succeed");

    match outcome {
        AuthOutcome::NextStep(step) => {
            assert_eq!(step.next_step, "web_session");
            assert_eq!(step.auth_params["window_width"], json!(536));
        }
        other => panic!("expected a login step, got {:?}", other),
    }
    assert_eq!(exchange.calls(), 0);
    assert!(!plugin.is_authenticated());
}

#[tokio::test]
async fn test_authenticate_with_stored_npsso() {
    let host = TestHost::new();
    let plugin = build_plugin(&host, MockTransport::new(library_backend), MockTokenExchange::new());

    let outcome = plugin
        .authenticate(&StoredCredentials::with_npsso("npsso-value"))
        .await
        .expect("authenticate should succeed");

    match outcome {
        AuthOutcome::Authenticated(auth) => {
            assert_eq!(auth.user_id, "1234567890");
            assert_eq!(auth.user_name, "tester");
        }
        other => panic!("expected authentication, got {:?}", other),
    }
    assert!(plugin.is_authenticated());
    assert!(host.credentials.stored().is_empty());
}

#[tokio::test]
async fn test_failed_exchange_leaves_session_unauthenticated() {
    let host = TestHost::new();
    let exchange = MockTokenExchange::scripted(vec![Err(PsnError::InvalidCredentials)]);
    let plugin = build_plugin(&host, MockTransport::new(library_backend), exchange);

    let result = plugin
        .authenticate(&StoredCredentials::with_npsso("expired"))
        .await;
    assert_eq!(result, Err(PsnError::InvalidCredentials));
    assert!(!plugin.is_authenticated());
}

#[tokio::test]
async fn test_pass_login_credentials_stores_npsso() {
    let host = TestHost::new();
    let plugin = build_plugin(&host, MockTransport::new(library_backend), MockTokenExchange::new());

    let cookies = vec![
        ("other".to_string(), "x".to_string()),
        ("npsso".to_string(), "captured".to_string()),
    ];
    let auth = plugin
        .pass_login_credentials(&cookies)
        .await
        .expect("login should succeed");

    assert_eq!(auth.user_name, "tester");
    assert_eq!(
        host.credentials.stored(),
        vec![StoredCredentials::with_npsso("captured")]
    );
}

#[tokio::test]
async fn test_pass_login_credentials_keeps_rotated_npsso() {
    let host = TestHost::new();
    let exchange = MockTokenExchange::scripted(vec![Ok(TokenGrant {
        access_token: "token-a".to_string(),
        rotated_refresh_token: Some("rotated".to_string()),
    })]);
    let plugin = build_plugin(&host, MockTransport::new(library_backend), exchange);

    plugin
        .pass_login_credentials(&[("npsso".to_string(), "captured".to_string())])
        .await
        .expect("login should succeed");

    assert_eq!(
        host.credentials.stored().last(),
        Some(&StoredCredentials::with_npsso("rotated"))
    );
}

#[tokio::test]
async fn test_pass_login_credentials_without_npsso_is_rejected() {
    let host = TestHost::new();
    let exchange = MockTokenExchange::new();
    let plugin = build_plugin(&host, MockTransport::new(library_backend), exchange.clone());

    let result = plugin
        .pass_login_credentials(&[("npsso".to_string(), String::new())])
        .await;
    assert_eq!(result, Err(PsnError::InvalidCredentials));
    assert_eq!(exchange.calls(), 0);
    assert!(host.credentials.stored().is_empty());
}

#[tokio::test]
async fn test_concurrent_rejections_refresh_once() {
    let host = TestHost::new();
    let transport = MockTransport::new(|request| {
        let stale = request.header("authorization") == Some("Bearer token-0");
        if stale && !request.url.contains("users/me/profile2") {
            return Err(TransportError::AuthRejected);
        }
        library_backend(request)
    });
    let exchange = MockTokenExchange::new();
    let plugin = build_plugin(&host, transport, exchange.clone());
    plugin
        .authenticate(&StoredCredentials::with_npsso("npsso-value"))
        .await
        .expect("authentication should succeed");

    let results = join_all((0..8).map(|_| plugin.get_game_times())).await;

    for result in results {
        assert_eq!(result.expect("request should succeed after refresh").len(), 1);
    }
    // One exchange to log in, one shared refresh.
    assert_eq!(exchange.calls(), 2);
    assert_eq!(host.auth_lost.count(), 0);
}

#[tokio::test]
async fn test_auth_lost_is_notified_once() {
    let host = TestHost::new();
    let transport = MockTransport::new(|request| {
        if request.url.contains("users/me/profile2") {
            library_backend(request)
        } else {
            Err(TransportError::AuthRejected)
        }
    });
    let exchange = MockTokenExchange::scripted(vec![
        Ok(TokenGrant::new("token-a")),
        Err(PsnError::InvalidCredentials),
    ]);
    let plugin = build_plugin(&host, transport, exchange);
    plugin
        .authenticate(&StoredCredentials::with_npsso("npsso-value"))
        .await
        .expect("authentication should succeed");

    assert_eq!(plugin.get_friends().await, Err(PsnError::AuthenticationRequired));
    assert_eq!(plugin.get_friends().await, Err(PsnError::AuthenticationRequired));
    assert_eq!(host.auth_lost.count(), 1);
    assert!(!plugin.is_authenticated());
}

// ============================================================================
// LIBRARY
// ============================================================================

#[tokio::test]
async fn test_owned_games_exclude_dlc() {
    let host = TestHost::new();
    let transport = MockTransport::new(library_backend);
    let plugin = logged_in_plugin(&host, transport.clone()).await;

    let games = plugin.get_owned_games().await.expect("library should load");

    let ids: Vec<&str> = games.iter().map(|game| game.game_id.as_str()).collect();
    let expected: Vec<&str> = fixtures::GAMES.iter().map(|(id, _, _)| *id).collect();
    assert_eq!(ids, expected);
    assert!(!ids.contains(&fixtures::DLC.0));

    // Six titles resolve in batches of at most five.
    let title_requests = transport
        .requests()
        .iter()
        .filter(|request| request.url.contains("npTitleIds="))
        .count();
    assert_eq!(title_requests, 2);
}

#[tokio::test]
async fn test_import_through_backend_client() {
    let host = TestHost::new();
    let plugin = logged_in_plugin(&host, MockTransport::new(library_backend)).await;

    let sink = RecordingSink::default();
    let summary = plugin
        .import_games_achievements(&game_ids(&["CUSA07917_00", fixtures::DLC.0]), &sink)
        .await;

    let achievements = sink
        .success_of("CUSA07917_00")
        .expect("game should import");
    let unlocks: Vec<i64> = achievements.iter().map(|a| a.unlock_time).collect();
    assert_eq!(unlocks, vec![538304493, 1318782798]);
    assert_eq!(achievements[0].achievement_id, "NPWR12784_00_1");
    assert!(matches!(
        sink.failure_of(fixtures::DLC.0),
        Some(PsnError::InvalidParams { .. })
    ));
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn test_game_times() {
    let host = TestHost::new();
    let plugin = logged_in_plugin(&host, MockTransport::new(library_backend)).await;

    let times = plugin.get_game_times().await.expect("game times should load");
    assert_eq!(times.len(), 1);
    assert_eq!(times[0].game_id, GameId::new("CUSA07917_00"));
    assert_eq!(times[0].time_played_minutes, 154);
    assert_eq!(times[0].last_played, Some(1615048162));
}

#[tokio::test]
async fn test_subscriptions() {
    let host = TestHost::new();
    let transport = MockTransport::new(library_backend);
    let plugin = logged_in_plugin(&host, transport.clone()).await;

    let subscriptions = plugin.get_subscriptions().await.expect("status should load");
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].subscription_name, "PlayStation PLUS");
    assert!(subscriptions[0].owned);
    assert_eq!(subscriptions[0].end_time, None);

    let query = transport
        .requests()
        .into_iter()
        .find(|request| request.url.contains("graphql"))
        .expect("status query should be sent");
    assert!(query.body.unwrap_or_default().contains("getProfileOracle"));
}

// ============================================================================
// SOCIAL
// ============================================================================

#[tokio::test]
async fn test_friends() {
    let host = TestHost::new();
    let plugin = logged_in_plugin(&host, MockTransport::new(library_backend)).await;

    let friends = plugin.get_friends().await.expect("friends should load");
    let names: Vec<&str> = friends.iter().map(|f| f.user_name.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob"]);
}

#[tokio::test]
async fn test_presences_of_non_friends_are_unknown() {
    let host = TestHost::new();
    let plugin = logged_in_plugin(&host, MockTransport::new(library_backend)).await;

    let ids = vec!["111".to_string(), "222".to_string(), "999".to_string()];
    let presences = plugin
        .get_user_presences(&ids)
        .await
        .expect("presences should load");

    assert_eq!(presences.len(), 3);
    assert_eq!(presences["111"].state, PresenceState::Online);
    assert_eq!(presences["111"].platform.as_deref(), Some("PS4"));
    assert_eq!(presences["222"].state, PresenceState::Offline);
    assert_eq!(presences["999"].state, PresenceState::Unknown);
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_handshake_restores_caches_and_drops_legacy_key() {
    let host = TestHost::new();
    host.persistence
        .persist(LEGACY_COMMUNICATION_IDS_CACHE_KEY, "{}".to_string());
    let api = MockTrophyApi::new();
    api.with_game("G1", &["C1"])
        .with_trophies("C1", 100, vec![trophy("C1_1", 10)]);

    let first = PsnPlugin::builder(PluginConfig::default(), host.services())
        .transport(MockTransport::new(library_backend))
        .token_exchange(MockTokenExchange::new())
        .trophy_api(api.clone())
        .build()
        .expect("plugin should build");
    first.handshake_complete().await;
    assert!(!host.persistence.contains(LEGACY_COMMUNICATION_IDS_CACHE_KEY));
    first
        .import_games_achievements(&game_ids(&["G1"]), &RecordingSink::default())
        .await;

    // A new session over the same host storage starts warm.
    let second = PsnPlugin::builder(PluginConfig::default(), host.services())
        .transport(MockTransport::new(library_backend))
        .token_exchange(MockTokenExchange::new())
        .trophy_api(api.clone())
        .build()
        .expect("plugin should build");
    second.handshake_complete().await;

    let sink = RecordingSink::default();
    let summary = second
        .import_games_achievements(&game_ids(&["G1"]), &sink)
        .await;
    assert_eq!(sink.success_of("G1"), Some(vec![trophy("C1_1", 10)]));
    assert_eq!(summary.fetched, 0);
    assert_eq!(api.earned_calls("C1"), 1);
    assert_eq!(api.title_info_batches().len(), 1);
}

#[tokio::test]
async fn test_shutdown_closes_transport() {
    let host = TestHost::new();
    let transport = MockTransport::new(library_backend);
    let plugin = logged_in_plugin(&host, transport.clone()).await;

    plugin.shutdown().await;

    assert!(transport.is_closed());
    assert!(!plugin.is_authenticated());
    assert_eq!(plugin.get_friends().await, Err(PsnError::AuthenticationRequired));
}

#[test]
fn test_builder_rejects_invalid_config() {
    let host = TestHost::new();
    let config = PluginConfig {
        page_limit: 0,
        ..PluginConfig::default()
    };

    let result = PsnPlugin::builder(config, host.services())
        .transport(MockTransport::new(library_backend))
        .token_exchange(MockTokenExchange::new())
        .build();

    assert!(matches!(
        result,
        Err(PsnError::Config(ConfigError::InvalidValue { .. }))
    ));
}
