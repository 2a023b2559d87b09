//! psnsync Plugin
//!
//! The host-facing layer of psnsync. [`PsnPlugin`] is one authenticated
//! session: it authenticates with an NPSSO cookie, lists the library, and
//! imports trophies as achievements through a freshness-gated cache.
//!
//! - [`resolver`]: game id to trophy title resolution with a TTL cache
//! - [`import`]: the achievement import fan-out/fan-in
//! - [`plugin`]: the session facade and its builder
//! - [`config`], [`telemetry`]: configuration and tracing setup

pub mod config;
pub mod import;
pub mod plugin;
pub mod resolver;
pub mod telemetry;

pub use config::PluginConfig;
pub use import::{AchievementImportCoordinator, AchievementSink, ImportSummary};
pub use plugin::{login_next_step, HostServices, PsnPlugin, PsnPluginBuilder};
pub use resolver::{filter_owned_games, ResolvedTitles, TrophyTitleResolver};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
