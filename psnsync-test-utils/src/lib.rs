//! psnsync Test Utilities
//!
//! Shared test infrastructure for the psnsync workspace:
//! - Mock implementations of every port (transport, token exchange, trophy
//!   API, host credential store and auth-lost notifier)
//! - A settable clock
//! - Backend payload fixtures
//! - Proptest generators for identifiers and records

pub use psnsync_cache::{Clock, InMemoryPersistence, Watermark};
pub use psnsync_client::{
    AuthLostNotifier, CredentialStore, HttpRequest, HttpResponse, StoredCredentials,
    TokenExchange, TokenGrant, Transport, TrophyApi,
};
pub use psnsync_core::{
    Achievement, CommunicationId, GameId, PsnError, PsnResult, TransportError, TrophyTitleInfo,
    UnixTimestamp,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync;

/// Transport answering every request through a handler closure.
pub struct MockTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<HttpRequest>>,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn new(
        handler: impl Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Transport serving JSON bodies by URL substring; unknown URLs are a 404.
    pub fn routes(routes: Vec<(&'static str, serde_json::Value)>) -> Arc<Self> {
        Self::new(move |request| {
            routes
                .iter()
                .find(|(pattern, _)| request.url.contains(pattern))
                .map(|(_, body)| HttpResponse::new(200, body.to_string()))
                .ok_or(TransportError::Backend { status: 404 })
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Network {
                reason: "transport closed".to_string(),
            });
        }
        let response = (self.handler)(&request);
        self.requests.lock().push(request);
        response
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// MOCK TOKEN EXCHANGE
// ============================================================================

/// Token exchange replaying a script, then issuing `token-<n>`.
pub struct MockTokenExchange {
    script: Mutex<Vec<PsnResult<TokenGrant>>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl MockTokenExchange {
    pub fn new() -> Arc<Self> {
        Self::scripted(Vec::new())
    }

    pub fn scripted(script: Vec<PsnResult<TokenGrant>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(10),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenExchange for MockTokenExchange {
    async fn exchange(&self, _refresh_token: &str) -> PsnResult<TokenGrant> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let mut script = self.script.lock();
        if script.is_empty() {
            Ok(TokenGrant::new(format!("token-{}", n)))
        } else {
            script.remove(0)
        }
    }
}

// ============================================================================
// MOCK TROPHY API
// ============================================================================

#[derive(Default)]
struct TrophyBackend {
    title_infos: HashMap<GameId, Vec<TrophyTitleInfo>>,
    watermarks: HashMap<CommunicationId, UnixTimestamp>,
    trophies: HashMap<CommunicationId, Vec<Achievement>>,
    failures: HashMap<CommunicationId, PsnError>,
    panics: HashSet<CommunicationId>,
    title_info_failure: Option<PsnError>,
    trophy_titles_failure: Option<PsnError>,
}

/// In-memory trophy backend with call accounting.
#[derive(Default)]
pub struct MockTrophyApi {
    backend: Mutex<TrophyBackend>,
    title_info_batches: Mutex<Vec<Vec<GameId>>>,
    trophy_titles_calls: AtomicUsize,
    earned_calls: Mutex<HashMap<CommunicationId, usize>>,
}

impl MockTrophyApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Map a game to communication ids; names default to the id.
    pub fn with_game(&self, game_id: &str, communication_ids: &[&str]) -> &Self {
        let infos = communication_ids
            .iter()
            .map(|id| TrophyTitleInfo::new(*id, *id))
            .collect();
        self.with_title_infos(game_id, infos)
    }

    pub fn with_title_infos(&self, game_id: &str, infos: Vec<TrophyTitleInfo>) -> &Self {
        self.backend
            .lock()
            .title_infos
            .insert(GameId::new(game_id), infos);
        self
    }

    /// Set the backend's last update time and earned trophies for an id.
    pub fn with_trophies(
        &self,
        communication_id: &str,
        watermark: UnixTimestamp,
        trophies: Vec<Achievement>,
    ) -> &Self {
        let id = CommunicationId::new(communication_id);
        let mut backend = self.backend.lock();
        backend.watermarks.insert(id.clone(), watermark);
        backend.trophies.insert(id, trophies);
        self
    }

    pub fn set_watermark(&self, communication_id: &str, watermark: UnixTimestamp) {
        self.backend
            .lock()
            .watermarks
            .insert(CommunicationId::new(communication_id), watermark);
    }

    pub fn remove_watermark(&self, communication_id: &str) {
        self.backend
            .lock()
            .watermarks
            .remove(&CommunicationId::new(communication_id));
    }

    pub fn fail_earned(&self, communication_id: &str, error: PsnError) {
        self.backend
            .lock()
            .failures
            .insert(CommunicationId::new(communication_id), error);
    }

    pub fn panic_earned(&self, communication_id: &str) {
        self.backend
            .lock()
            .panics
            .insert(CommunicationId::new(communication_id));
    }

    pub fn fail_title_info(&self, error: PsnError) {
        self.backend.lock().title_info_failure = Some(error);
    }

    pub fn fail_trophy_titles(&self, error: PsnError) {
        self.backend.lock().trophy_titles_failure = Some(error);
    }

    pub fn title_info_batches(&self) -> Vec<Vec<GameId>> {
        self.title_info_batches.lock().clone()
    }

    pub fn trophy_titles_calls(&self) -> usize {
        self.trophy_titles_calls.load(Ordering::SeqCst)
    }

    pub fn earned_calls(&self, communication_id: &str) -> usize {
        self.earned_calls
            .lock()
            .get(&CommunicationId::new(communication_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_earned_calls(&self) -> usize {
        self.earned_calls.lock().values().sum()
    }
}

#[async_trait]
impl TrophyApi for MockTrophyApi {
    async fn trophy_title_info_map(
        &self,
        game_ids: &[GameId],
    ) -> PsnResult<HashMap<GameId, Vec<TrophyTitleInfo>>> {
        self.title_info_batches.lock().push(game_ids.to_vec());
        tokio::time::sleep(Duration::from_millis(1)).await;
        let backend = self.backend.lock();
        if let Some(error) = &backend.title_info_failure {
            return Err(error.clone());
        }
        Ok(game_ids
            .iter()
            .map(|id| {
                let infos = backend.title_infos.get(id).cloned().unwrap_or_default();
                (id.clone(), infos)
            })
            .collect())
    }

    async fn trophy_titles(&self) -> PsnResult<HashMap<CommunicationId, UnixTimestamp>> {
        self.trophy_titles_calls.fetch_add(1, Ordering::SeqCst);
        let backend = self.backend.lock();
        match &backend.trophy_titles_failure {
            Some(error) => Err(error.clone()),
            None => Ok(backend.watermarks.clone()),
        }
    }

    async fn earned_trophies(
        &self,
        communication_id: &CommunicationId,
    ) -> PsnResult<Vec<Achievement>> {
        *self
            .earned_calls
            .lock()
            .entry(communication_id.clone())
            .or_insert(0) += 1;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let outcome = {
            let backend = self.backend.lock();
            if backend.panics.contains(communication_id) {
                None
            } else if let Some(error) = backend.failures.get(communication_id) {
                Some(Err(error.clone()))
            } else {
                Some(Ok(backend
                    .trophies
                    .get(communication_id)
                    .cloned()
                    .unwrap_or_default()))
            }
        };
        match outcome {
            Some(result) => result,
            None => panic!("scripted panic for {}", communication_id),
        }
    }
}

// ============================================================================
// HOST PORTS
// ============================================================================

#[derive(Default)]
pub struct RecordingCredentialStore {
    stored: Mutex<Vec<StoredCredentials>>,
}

impl RecordingCredentialStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stored(&self) -> Vec<StoredCredentials> {
        self.stored.lock().clone()
    }
}

impl CredentialStore for RecordingCredentialStore {
    fn store(&self, credentials: &StoredCredentials) {
        self.stored.lock().push(credentials.clone());
    }
}

#[derive(Default)]
pub struct CountingAuthLostNotifier {
    count: AtomicUsize,
}

impl CountingAuthLostNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl AuthLostNotifier for CountingAuthLostNotifier {
    fn auth_lost(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// CLOCK
// ============================================================================

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub fn at(now: UnixTimestamp) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(now),
        })
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> UnixTimestamp {
        self.now.load(Ordering::SeqCst)
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Backend payloads shaped like real replies.

    use serde_json::{json, Value};

    pub const COMMUNICATION_ID: &str = "NPWR12784_00";

    /// Games of the sample library with their communication ids.
    pub const GAMES: &[(&str, &str, &str)] = &[
        ("CUSA07917_00", "Tooth and Tail", "NPWR12784_00"),
        ("CUSA02000_00", "Batman: Return to Arkham - Arkham City", "NPWR10584_00"),
        ("CUSA05603_00", "Batman", "NPWR11243_00"),
        ("CUSA01427_00", "Game of Thrones", "NPWR07882_00"),
        ("CUSA07140_00", "Dreamfall Chapters", "NPWR12456_00"),
    ];

    /// A soundtrack without trophies.
    pub const DLC: (&str, &str) = ("CUSA07719_00", "Dreamfall Chapters (Original Soundtrack)");

    pub fn owned_games_page() -> Value {
        let mut titles: Vec<Value> = GAMES
            .iter()
            .map(|(id, name, _)| json!({"titleId": id, "name": name}))
            .collect();
        titles.push(json!({"titleId": DLC.0, "name": DLC.1}));
        json!({"start": 0, "size": titles.len(), "totalResults": titles.len(), "titles": titles})
    }

    pub fn title_info_reply(game_ids: &[&str]) -> Value {
        let apps: Vec<Value> = game_ids
            .iter()
            .map(|game_id| {
                let titles: Vec<Value> = GAMES
                    .iter()
                    .filter(|(id, _, _)| id == game_id)
                    .map(|(_, name, comm)| json!({"npCommunicationId": comm, "trophyTitleName": name}))
                    .collect();
                json!({"npTitleId": game_id, "trophyTitles": titles})
            })
            .collect();
        json!({ "apps": apps })
    }

    pub fn trophy_titles_reply(watermarks: &[(&str, &str)]) -> Value {
        let titles: Vec<Value> = watermarks
            .iter()
            .map(|(comm, date)| json!({"npCommunicationId": comm, "fromUser": {"lastUpdateDate": date}}))
            .collect();
        json!({"totalResults": titles.len(), "trophyTitles": titles})
    }

    pub fn earned_trophies_reply() -> Value {
        json!({"trophies": [
            {"trophyId": 0, "trophyName": "achievement 0", "fromUser": {"onlineId": "user-id", "earned": false}},
            {"trophyId": 1, "trophyName": "achievement 1", "fromUser": {"onlineId": "user-id", "earned": true, "earnedDate": "1987-01-22T09:01:33Z"}},
            {"trophyId": 2, "trophyName": "achievement 2", "fromUser": {"onlineId": "user-id", "earned": true, "earnedDate": "2011-10-16T16:33:18Z"}}
        ]})
    }

    pub fn user_profile_reply() -> Value {
        json!({"profile": {"accountId": "1234567890", "onlineId": "tester"}})
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for psnsync identifiers and records.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_game_id() -> impl Strategy<Value = GameId> {
        "CUSA[0-9]{5}_00".prop_map(GameId::new)
    }

    pub fn arb_communication_id() -> impl Strategy<Value = CommunicationId> {
        "NPWR[0-9]{5}_00".prop_map(CommunicationId::new)
    }

    pub fn arb_watermark() -> impl Strategy<Value = Watermark> {
        (0i64..2_000_000_000).prop_map(Watermark::new)
    }

    pub fn arb_achievement() -> impl Strategy<Value = Achievement> {
        (arb_communication_id(), 0u32..64, "[a-z ]{1,16}", 0i64..2_000_000_000).prop_map(
            |(comm, trophy, name, time)| {
                Achievement::new(Achievement::scoped_id(&comm, &trophy.to_string()), name, time)
            },
        )
    }
}
