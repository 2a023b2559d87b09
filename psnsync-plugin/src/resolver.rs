//! Game id to trophy title resolution.
//!
//! Resolved title info is cached per game id with an expiry watermark of
//! `now + ttl` and read back with `now`. Misses are fetched in batches of at
//! most [`MAX_TITLE_IDS_PER_REQUEST`] ids, all batches concurrently. A game
//! without trophy titles (DLC) resolves to an empty list, which is cached
//! like any other answer.

use futures_util::future::join_all;
use indexmap::IndexSet;
use psnsync_cache::{CacheSlot, CacheStats, Clock, Watermark};
use psnsync_client::endpoints::MAX_TITLE_IDS_PER_REQUEST;
use psnsync_client::TrophyApi;
use psnsync_core::{GameId, OwnedGame, PsnError, PsnResult, TrophyTitleInfo};
use std::collections::HashMap;
use std::sync::Arc;

pub type TitleInfoSlot = CacheSlot<GameId, Vec<TrophyTitleInfo>>;

/// Outcome of resolving a set of game ids.
#[derive(Debug, Default)]
pub struct ResolvedTitles {
    pub resolved: HashMap<GameId, Vec<TrophyTitleInfo>>,
    /// Games whose batch failed, with that batch's error.
    pub failed: HashMap<GameId, PsnError>,
}

pub struct TrophyTitleResolver {
    api: Arc<dyn TrophyApi>,
    slot: TitleInfoSlot,
    clock: Arc<dyn Clock>,
    batch_size: usize,
    ttl_secs: i64,
}

impl TrophyTitleResolver {
    pub fn new(
        api: Arc<dyn TrophyApi>,
        slot: TitleInfoSlot,
        clock: Arc<dyn Clock>,
        batch_size: usize,
        ttl_secs: i64,
    ) -> Self {
        Self {
            api,
            slot,
            clock,
            batch_size: batch_size.clamp(1, MAX_TITLE_IDS_PER_REQUEST),
            ttl_secs,
        }
    }

    pub fn slot(&self) -> &TitleInfoSlot {
        &self.slot
    }

    /// Resolve every id, failing with the first batch error.
    ///
    /// Batches that succeeded are cached even when another batch fails.
    pub async fn resolve(
        &self,
        game_ids: &[GameId],
    ) -> PsnResult<HashMap<GameId, Vec<TrophyTitleInfo>>> {
        let outcome = self.resolve_each(game_ids).await;
        let first_error = game_ids
            .iter()
            .find_map(|id| outcome.failed.get(id).cloned());
        match first_error {
            Some(e) => Err(e),
            None => Ok(outcome.resolved),
        }
    }

    /// Resolve every id, keeping failures per game.
    pub async fn resolve_each(&self, game_ids: &[GameId]) -> ResolvedTitles {
        let now = self.clock.now();
        let unique: IndexSet<&GameId> = game_ids.iter().collect();

        let mut outcome = ResolvedTitles::default();
        let mut stats = CacheStats::default();
        let mut misses = Vec::new();
        {
            let cache = self.slot.cache().read().await;
            for &id in &unique {
                match stats.record(cache.get(id, Watermark::new(now))) {
                    Some(infos) => {
                        outcome.resolved.insert(id.clone(), infos.clone());
                    }
                    None => misses.push(id.clone()),
                }
            }
        }
        tracing::debug!(
            hits = stats.hits,
            misses = stats.misses,
            "Trophy title info cache lookup"
        );
        if misses.is_empty() {
            return outcome;
        }

        let batches: Vec<&[GameId]> = misses.chunks(self.batch_size).collect();
        let replies = join_all(
            batches
                .iter()
                .map(|batch| self.api.trophy_title_info_map(batch)),
        )
        .await;

        let expiry = Watermark::expiring_after(now, self.ttl_secs);
        let mut wrote = false;
        for (batch, reply) in batches.into_iter().zip(replies) {
            match reply {
                Ok(mut map) => {
                    let mut cache = self.slot.cache().write().await;
                    for id in batch {
                        let infos = map.remove(id).unwrap_or_default();
                        cache.update(id.clone(), infos.clone(), expiry);
                        outcome.resolved.insert(id.clone(), infos);
                    }
                    wrote = true;
                }
                Err(e) => {
                    tracing::warn!(games = batch.len(), error = %e, "Failed to resolve trophy titles");
                    for id in batch {
                        outcome.failed.insert(id.clone(), e.clone());
                    }
                }
            }
        }

        if wrote {
            self.slot.persist().await;
        }
        outcome
    }
}

/// Drop DLC from a library listing and fill in missing titles.
///
/// A game without trophy titles is DLC. A nameless game adopts the name of
/// its only trophy title; a nameless bundle is dropped.
pub fn filter_owned_games(
    games: Vec<OwnedGame>,
    titles: &HashMap<GameId, Vec<TrophyTitleInfo>>,
) -> Vec<OwnedGame> {
    games
        .into_iter()
        .filter_map(|mut game| {
            let infos = titles.get(&game.game_id).map(Vec::as_slice).unwrap_or(&[]);
            if infos.is_empty() {
                return None;
            }
            if game.game_title.is_empty() {
                match infos {
                    [only] if !only.display_name.is_empty() => {
                        game.game_title = only.display_name.clone();
                    }
                    [_] => {
                        tracing::debug!(
                            game_id = %game.game_id,
                            "Keeping nameless game whose trophy title is nameless too"
                        );
                    }
                    _ => {
                        tracing::warn!(
                            game_id = %game.game_id,
                            titles = infos.len(),
                            "Dropping nameless game with several trophy titles"
                        );
                        return None;
                    }
                }
            }
            Some(game)
        })
        .collect()
}
