//! The session facade the host drives.
//!
//! A [`PsnPlugin`] owns one authenticated session: the token gate, both
//! caches, the title resolver and the import coordinator. Nothing is global;
//! two plugins never share state.

use crate::config::PluginConfig;
use crate::import::{AchievementImportCoordinator, AchievementSink, ImportSummary};
use crate::resolver::{filter_owned_games, TrophyTitleResolver};
use psnsync_cache::{
    CachePersistence, CacheSlot, Clock, SystemClock, LEGACY_COMMUNICATION_IDS_CACHE_KEY,
    TROPHIES_CACHE_KEY, TROPHY_TITLE_INFO_CACHE_KEY,
};
use psnsync_client::credentials::NPSSO_COOKIE;
use psnsync_client::endpoints::{oauth_login_url, OAUTH_LOGIN_REDIRECT_URL};
use psnsync_client::{
    AuthLostNotifier, AuthenticatedClient, CredentialStore, NpssoExchange, PsnClient,
    ReqwestTransport, StoredCredentials, TokenExchange, TokenGate, Transport, TrophyApi,
};
use psnsync_core::{
    AuthOutcome, Authentication, FriendInfo, GameId, GameTime, NextStep, OwnedGame, PsnError,
    PsnResult, Subscription, UserPresence,
};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub const PSPLUS_SUBSCRIPTION_NAME: &str = "PlayStation PLUS";

/// Callbacks and storage provided by the host.
#[derive(Clone)]
pub struct HostServices {
    pub credentials: Arc<dyn CredentialStore>,
    pub persistence: Arc<dyn CachePersistence>,
    pub auth_lost: Arc<dyn AuthLostNotifier>,
}

/// Interactive login descriptor for hosts without stored credentials.
pub fn login_next_step() -> NextStep {
    let mut auth_params = BTreeMap::new();
    auth_params.insert("window_title".to_string(), json!("Login to My PlayStation\u{2122}"));
    auth_params.insert("window_width".to_string(), json!(536));
    auth_params.insert("window_height".to_string(), json!(675));
    auth_params.insert("start_uri".to_string(), json!(oauth_login_url()));
    auth_params.insert(
        "end_uri_regex".to_string(),
        json!(format!("^{}.*", OAUTH_LOGIN_REDIRECT_URL)),
    );
    NextStep {
        next_step: "web_session".to_string(),
        auth_params,
    }
}

/// Assembles a [`PsnPlugin`]. Every collaborator not set explicitly gets its
/// production implementation.
pub struct PsnPluginBuilder {
    config: PluginConfig,
    host: HostServices,
    transport: Option<Arc<dyn Transport>>,
    exchange: Option<Arc<dyn TokenExchange>>,
    trophy_api: Option<Arc<dyn TrophyApi>>,
    clock: Arc<dyn Clock>,
}

impl PsnPluginBuilder {
    pub fn new(config: PluginConfig, host: HostServices) -> Self {
        Self {
            config,
            host,
            transport: None,
            exchange: None,
            trophy_api: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn token_exchange(mut self, exchange: Arc<dyn TokenExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    /// Serve trophy endpoints from `api` instead of the backend client.
    pub fn trophy_api(mut self, api: Arc<dyn TrophyApi>) -> Self {
        self.trophy_api = Some(api);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> PsnResult<PsnPlugin> {
        let config = self.config;
        config.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&config.transport_config())?),
        };
        let exchange: Arc<dyn TokenExchange> = match self.exchange {
            Some(exchange) => exchange,
            None => Arc::new(NpssoExchange::new(Arc::clone(&transport))),
        };
        let gate = TokenGate::with_host(
            exchange,
            Arc::clone(&self.host.credentials),
            Arc::clone(&self.host.auth_lost),
        );
        let http = Arc::new(AuthenticatedClient::new(transport, gate));
        let client = Arc::new(PsnClient::with_page_limit(Arc::clone(&http), config.page_limit));
        let trophy_api: Arc<dyn TrophyApi> = match self.trophy_api {
            Some(api) => api,
            None => client.clone(),
        };

        let persistence = Arc::clone(&self.host.persistence);
        let resolver = Arc::new(TrophyTitleResolver::new(
            Arc::clone(&trophy_api),
            CacheSlot::new(TROPHY_TITLE_INFO_CACHE_KEY, Arc::clone(&persistence)),
            self.clock,
            config.title_batch_size,
            config.title_info_ttl_secs,
        ));
        let importer = AchievementImportCoordinator::new(
            trophy_api,
            Arc::clone(&resolver),
            CacheSlot::new(TROPHIES_CACHE_KEY, persistence),
        );

        Ok(PsnPlugin {
            host: self.host,
            http,
            client,
            resolver,
            importer,
        })
    }
}

pub struct PsnPlugin {
    host: HostServices,
    http: Arc<AuthenticatedClient>,
    client: Arc<PsnClient>,
    resolver: Arc<TrophyTitleResolver>,
    importer: AchievementImportCoordinator,
}

impl PsnPlugin {
    pub fn builder(config: PluginConfig, host: HostServices) -> PsnPluginBuilder {
        PsnPluginBuilder::new(config, host)
    }

    /// Production plugin over a `reqwest` transport.
    pub fn new(config: PluginConfig, host: HostServices) -> PsnResult<Self> {
        PsnPluginBuilder::new(config, host).build()
    }

    pub fn is_authenticated(&self) -> bool {
        self.http.is_authenticated()
    }

    pub fn resolver(&self) -> &TrophyTitleResolver {
        &self.resolver
    }

    // ========================================================================
    // AUTHENTICATION
    // ========================================================================

    /// Log in with stored credentials, or ask the host for an interactive login.
    pub async fn authenticate(&self, stored: &StoredCredentials) -> PsnResult<AuthOutcome> {
        match stored.npsso() {
            None => Ok(AuthOutcome::NextStep(login_next_step())),
            Some(npsso) => {
                let auth = self.do_auth(npsso).await?;
                Ok(AuthOutcome::Authenticated(auth))
            }
        }
    }

    /// Finish an interactive login with the cookies captured by the host.
    pub async fn pass_login_credentials(
        &self,
        cookies: &[(String, String)],
    ) -> PsnResult<Authentication> {
        let npsso = cookies
            .iter()
            .find(|(name, value)| name == NPSSO_COOKIE && !value.is_empty())
            .map(|(_, value)| value.as_str())
            .ok_or(PsnError::InvalidCredentials)?;

        let auth = self.do_auth(npsso).await?;
        let credentials = self
            .http
            .gate()
            .stored_credentials()
            .unwrap_or_else(|| StoredCredentials::with_npsso(npsso));
        self.host.credentials.store(&credentials);
        Ok(auth)
    }

    async fn do_auth(&self, npsso: &str) -> PsnResult<Authentication> {
        self.http.gate().authenticate(npsso).await?;
        let user = self.client.user_info().await?;
        tracing::info!(user_id = %user.account_id, "Authenticated");
        Ok(user.into())
    }

    /// Load persisted caches and drop the legacy communication id map.
    pub async fn handshake_complete(&self) {
        self.resolver.slot().restore().await;
        self.importer.trophies().restore().await;
        self.host.persistence.remove(LEGACY_COMMUNICATION_IDS_CACHE_KEY);
    }

    // ========================================================================
    // LIBRARY
    // ========================================================================

    /// Owned games without DLC.
    pub async fn get_owned_games(&self) -> PsnResult<Vec<OwnedGame>> {
        let games = self.client.owned_games().await?;
        let ids: Vec<GameId> = games.iter().map(|game| game.game_id.clone()).collect();
        let titles = self.resolver.resolve(&ids).await?;
        Ok(filter_owned_games(games, &titles))
    }

    pub async fn import_games_achievements(
        &self,
        game_ids: &[GameId],
        sink: &dyn AchievementSink,
    ) -> ImportSummary {
        self.importer.import(game_ids, sink).await
    }

    pub async fn get_game_times(&self) -> PsnResult<Vec<GameTime>> {
        self.client.played_games().await
    }

    pub async fn get_subscriptions(&self) -> PsnResult<Vec<Subscription>> {
        let owned = self.client.psplus_status().await?;
        Ok(vec![Subscription {
            subscription_name: PSPLUS_SUBSCRIPTION_NAME.to_string(),
            owned,
            end_time: None,
        }])
    }

    // ========================================================================
    // SOCIAL
    // ========================================================================

    pub async fn get_friends(&self) -> PsnResult<Vec<FriendInfo>> {
        self.client.friends().await
    }

    /// Presence of each requested user. Users not on the friend list are unknown.
    pub async fn get_user_presences(
        &self,
        user_ids: &[String],
    ) -> PsnResult<HashMap<String, UserPresence>> {
        let mut presences = self.client.friend_presences().await?;
        Ok(user_ids
            .iter()
            .map(|id| {
                let presence = presences.remove(id).unwrap_or_else(UserPresence::unknown);
                (id.clone(), presence)
            })
            .collect())
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Wait for an in-flight token refresh, forget tokens, close the transport.
    pub async fn shutdown(&self) {
        tracing::debug!("Shutting down session");
        self.http.shutdown().await;
    }
}
