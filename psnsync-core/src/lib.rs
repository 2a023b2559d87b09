//! psnsync Core - Entity Types
//!
//! Pure data structures shared by every other crate: identifiers, the
//! normalized records surfaced to the host, and the error taxonomy.
//! This crate contains ONLY data types - no network or cache logic.

pub mod entities;
pub mod error;
pub mod identity;

pub use entities::{
    Achievement, AuthOutcome, Authentication, FriendInfo, GameTime, NextStep, OwnedGame,
    PresenceState, Subscription, TrophyTitle, TrophyTitleInfo, UserInfo, UserPresence,
};
pub use error::{
    CodecError, ConfigError, ParseError, PsnError, PsnResult, TransportError,
};
pub use identity::{CommunicationId, GameId, UnixTimestamp};
