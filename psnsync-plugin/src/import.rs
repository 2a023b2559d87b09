//! Achievement import fan-out/fan-in.
//!
//! One import call walks `Resolving IDs -> Resolving Freshness -> Fetching
//! Pending -> Done`:
//!
//! 1. Game ids resolve to communication ids. A game with none is DLC and
//!    fails with `InvalidParams`.
//! 2. One trophy-titles call yields the backend's last update time per
//!    communication id. That time is the watermark cached trophies must meet.
//! 3. Games whose every communication id is fresh in the cache succeed
//!    immediately. The rest wait on their stale ids.
//! 4. Each distinct stale id is fetched once, all concurrently. A success is
//!    cached and handed to every game waiting on it. A failure fails every
//!    game still waiting on it.
//!
//! Results are reported per game through an [`AchievementSink`]; one game's
//! failure never aborts the batch.

use crate::resolver::TrophyTitleResolver;
use futures_util::stream::{FuturesUnordered, StreamExt};
use futures_util::FutureExt;
use indexmap::{IndexMap, IndexSet};
use psnsync_cache::{CacheSlot, CacheStats, Watermark};
use psnsync_client::TrophyApi;
use psnsync_core::{Achievement, CommunicationId, GameId, PsnError, PsnResult, UnixTimestamp};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub type TrophySlot = CacheSlot<CommunicationId, Vec<Achievement>>;

/// Receives the per-game outcome of an import.
pub trait AchievementSink: Send + Sync {
    fn success(&self, game_id: &GameId, achievements: Vec<Achievement>);

    fn failure(&self, game_id: &GameId, error: PsnError);
}

/// Counters of one import call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Distinct communication ids fetched from the backend.
    pub fetched: usize,
    /// Communication id lookups answered by the cache.
    pub cache_hits: u64,
}

/// A game waiting on one or more communication ids.
struct PendingGame {
    communication_ids: Vec<CommunicationId>,
    pending: HashSet<CommunicationId>,
    collected: HashMap<CommunicationId, Vec<Achievement>>,
}

impl PendingGame {
    /// All achievements in the game's communication id order.
    fn into_achievements(mut self) -> Vec<Achievement> {
        self.communication_ids
            .iter()
            .filter_map(|id| self.collected.remove(id))
            .flatten()
            .collect()
    }
}

/// Reports outcomes and keeps the summary in step.
struct Reporter<'a> {
    sink: &'a dyn AchievementSink,
    summary: ImportSummary,
}

impl Reporter<'_> {
    fn success(&mut self, game_id: &GameId, achievements: Vec<Achievement>) {
        self.summary.succeeded += 1;
        self.sink.success(game_id, achievements);
    }

    fn failure(&mut self, game_id: &GameId, error: PsnError) {
        tracing::debug!(game_id = %game_id, error = %error, "Achievement import failed");
        self.summary.failed += 1;
        self.sink.failure(game_id, error);
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic while fetching trophies".to_string())
}

pub struct AchievementImportCoordinator {
    api: Arc<dyn TrophyApi>,
    resolver: Arc<TrophyTitleResolver>,
    trophies: TrophySlot,
}

impl AchievementImportCoordinator {
    pub fn new(
        api: Arc<dyn TrophyApi>,
        resolver: Arc<TrophyTitleResolver>,
        trophies: TrophySlot,
    ) -> Self {
        Self {
            api,
            resolver,
            trophies,
        }
    }

    pub fn trophies(&self) -> &TrophySlot {
        &self.trophies
    }

    /// Import achievements of `game_ids`, reporting each game exactly once.
    pub async fn import(&self, game_ids: &[GameId], sink: &dyn AchievementSink) -> ImportSummary {
        let mut reporter = Reporter {
            sink,
            summary: ImportSummary::default(),
        };
        let unique: IndexSet<GameId> = game_ids.iter().cloned().collect();
        let requested: Vec<GameId> = unique.into_iter().collect();

        // Resolving IDs
        let resolved = self.resolver.resolve_each(&requested).await;
        let mut candidates: IndexMap<GameId, Vec<CommunicationId>> = IndexMap::new();
        for game_id in &requested {
            if let Some(error) = resolved.failed.get(game_id) {
                reporter.failure(game_id, error.clone());
                continue;
            }
            let ids: IndexSet<CommunicationId> = resolved
                .resolved
                .get(game_id)
                .into_iter()
                .flatten()
                .map(|info| info.communication_id.clone())
                .collect();
            if ids.is_empty() {
                reporter.failure(
                    game_id,
                    PsnError::InvalidParams {
                        reason: format!("{} has no trophies (not a game)", game_id),
                    },
                );
                continue;
            }
            candidates.insert(game_id.clone(), ids.into_iter().collect());
        }
        if candidates.is_empty() {
            return reporter.summary;
        }

        // Resolving Freshness
        let watermarks = match self.api.trophy_titles().await {
            Ok(watermarks) => watermarks,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch trophy title watermarks");
                for game_id in candidates.keys() {
                    reporter.failure(game_id, e.clone());
                }
                return reporter.summary;
            }
        };

        let (jobs, waiting) = self
            .partition(candidates, &watermarks, &mut reporter)
            .await;

        // Fetching Pending
        self.fetch_pending(jobs, waiting, &watermarks, &mut reporter)
            .await;

        let summary = reporter.summary;
        tracing::info!(
            requested = requested.len(),
            succeeded = summary.succeeded,
            failed = summary.failed,
            fetched = summary.fetched,
            cache_hits = summary.cache_hits,
            "Achievement import finished"
        );
        summary
    }

    /// Answer what the cache can; return the games still pending and, per
    /// stale communication id, the games waiting on it.
    async fn partition(
        &self,
        candidates: IndexMap<GameId, Vec<CommunicationId>>,
        watermarks: &HashMap<CommunicationId, UnixTimestamp>,
        reporter: &mut Reporter<'_>,
    ) -> (
        HashMap<GameId, PendingGame>,
        IndexMap<CommunicationId, Vec<GameId>>,
    ) {
        let mut jobs = HashMap::new();
        let mut waiting: IndexMap<CommunicationId, Vec<GameId>> = IndexMap::new();
        let mut ready = Vec::new();
        let mut broken = Vec::new();
        let mut stats = CacheStats::default();

        {
            let cache = self.trophies.cache().read().await;
            'games: for (game_id, communication_ids) in candidates {
                let mut job = PendingGame {
                    communication_ids,
                    pending: HashSet::new(),
                    collected: HashMap::new(),
                };
                for id in &job.communication_ids {
                    let Some(&watermark) = watermarks.get(id) else {
                        tracing::error!(
                            game_id = %game_id,
                            communication_id = %id,
                            "Backend returned no trophy title for communication id"
                        );
                        broken.push((game_id, id.clone()));
                        continue 'games;
                    };
                    match stats.record(cache.get(id, Watermark::new(watermark))) {
                        Some(trophies) => {
                            job.collected.insert(id.clone(), trophies.clone());
                        }
                        None => {
                            job.pending.insert(id.clone());
                        }
                    }
                }
                if job.pending.is_empty() {
                    ready.push((game_id, job));
                } else {
                    for id in &job.pending {
                        waiting.entry(id.clone()).or_default().push(game_id.clone());
                    }
                    jobs.insert(game_id, job);
                }
            }
        }

        reporter.summary.cache_hits = stats.hits;
        for (game_id, communication_id) in broken {
            reporter.failure(
                &game_id,
                PsnError::unknown(format!("no freshness watermark for {}", communication_id)),
            );
        }
        for (game_id, job) in ready {
            reporter.success(&game_id, job.into_achievements());
        }
        (jobs, waiting)
    }

    async fn fetch_pending(
        &self,
        mut jobs: HashMap<GameId, PendingGame>,
        waiting: IndexMap<CommunicationId, Vec<GameId>>,
        watermarks: &HashMap<CommunicationId, UnixTimestamp>,
        reporter: &mut Reporter<'_>,
    ) {
        if waiting.is_empty() {
            return;
        }
        tracing::debug!(
            communication_ids = waiting.len(),
            games = jobs.len(),
            "Fetching earned trophies"
        );

        let mut fetches: FuturesUnordered<_> = waiting
            .keys()
            .cloned()
            .map(|id| {
                let api = Arc::clone(&self.api);
                async move {
                    let outcome: PsnResult<Vec<Achievement>> =
                        AssertUnwindSafe(async { api.earned_trophies(&id).await })
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|payload| {
                                let reason = panic_reason(payload.as_ref());
                                tracing::error!(
                                    communication_id = %id,
                                    reason = %reason,
                                    "Unexpected failure while fetching trophies"
                                );
                                Err(PsnError::unknown(reason))
                            });
                    (id, outcome)
                }
            })
            .collect();

        while let Some((id, outcome)) = fetches.next().await {
            let games = waiting.get(&id).map(Vec::as_slice).unwrap_or(&[]);
            match outcome {
                Ok(trophies) => {
                    reporter.summary.fetched += 1;
                    if let Some(&watermark) = watermarks.get(&id) {
                        self.trophies.cache().write().await.update(
                            id.clone(),
                            trophies.clone(),
                            Watermark::new(watermark),
                        );
                    }
                    for game_id in games {
                        let Some(job) = jobs.get_mut(game_id) else {
                            continue;
                        };
                        job.pending.remove(&id);
                        job.collected.insert(id.clone(), trophies.clone());
                        if job.pending.is_empty() {
                            if let Some(job) = jobs.remove(game_id) {
                                reporter.success(game_id, job.into_achievements());
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(communication_id = %id, error = %e, "Failed to fetch earned trophies");
                    for game_id in games {
                        if jobs.remove(game_id).is_some() {
                            reporter.failure(game_id, e.clone());
                        }
                    }
                }
            }
        }

        if reporter.summary.fetched > 0 {
            self.trophies.persist().await;
        }
    }
}
