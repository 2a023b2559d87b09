//! Typed parse functions over backend payloads.
//!
//! Every function takes a decoded JSON body and returns normalized records
//! or a [`ParseError`]. Nothing past this module sees an untyped map.

use chrono::DateTime;
use once_cell::sync::Lazy;
use psnsync_core::{
    Achievement, CommunicationId, FriendInfo, GameId, GameTime, OwnedGame, ParseError,
    PresenceState, TrophyTitle, TrophyTitleInfo, UnixTimestamp, UserInfo, UserPresence,
};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

static PLAY_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:PT)?(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").expect("valid duration regex")
});

// ============================================================================
// SCALARS
// ============================================================================

/// Parse an RFC 3339 UTC timestamp. Fractional seconds are truncated.
pub fn parse_timestamp(raw: &str) -> Result<UnixTimestamp, ParseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp())
        .map_err(|e| ParseError::invalid("timestamp", format!("{}: {}", raw, e)))
}

/// Minutes played from a `PT<h>H<m>M<s>S` duration. Seconds round up.
pub fn parse_play_duration(raw: &str) -> Result<u64, ParseError> {
    let invalid = || ParseError::invalid("playDuration", raw.to_string());
    if raw.is_empty() {
        return Err(invalid());
    }
    let captures = PLAY_DURATION.captures(raw).ok_or_else(invalid)?;
    let part = |index: usize| -> Result<u64, ParseError> {
        captures
            .get(index)
            .map(|m| m.as_str().parse::<u64>().map_err(|_| invalid()))
            .unwrap_or(Ok(0))
    };
    let (hours, minutes, seconds) = (part(1)?, part(2)?, part(3)?);

    hours
        .checked_mul(60)
        .and_then(|m| m.checked_add(minutes))
        .and_then(|m| m.checked_add(seconds.div_ceil(60)))
        .ok_or_else(invalid)
}

/// A reply with nothing in it: `null`, `{}`, `[]` or `""`.
pub fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// The `totalResults` counter of a paginated listing. Absent means zero.
pub fn parse_total_results(value: &Value) -> Result<usize, ParseError> {
    match value.get("totalResults") {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| ParseError::invalid("totalResults", n.to_string())),
        Some(Value::String(s)) => s
            .trim()
            .parse::<usize>()
            .map_err(|_| ParseError::invalid("totalResults", s.clone())),
        Some(other) => Err(ParseError::invalid("totalResults", other.to_string())),
    }
}

fn field<'a>(value: &'a Value, name: &str) -> Result<&'a Value, ParseError> {
    value
        .get(name)
        .filter(|v| !v.is_null())
        .ok_or_else(|| ParseError::missing(name))
}

fn str_field<'a>(value: &'a Value, name: &str) -> Result<&'a str, ParseError> {
    field(value, name)?
        .as_str()
        .ok_or_else(|| ParseError::invalid(name, "expected string"))
}

/// Identifiers arrive as either strings or numbers.
fn id_field(value: &Value, name: &str) -> Result<String, ParseError> {
    match field(value, name)? {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(ParseError::invalid(name, "expected string or number")),
    }
}

fn list<'a>(value: &'a Value, name: &str) -> Result<&'a [Value], ParseError> {
    match value.get(name) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(ParseError::invalid(name, "expected array")),
    }
}

// ============================================================================
// PAYLOADS
// ============================================================================

/// `profile { accountId, onlineId }`.
pub fn parse_user_info(value: &Value) -> Result<UserInfo, ParseError> {
    let profile = field(value, "profile")?;
    Ok(UserInfo {
        account_id: id_field(profile, "accountId")?,
        online_id: id_field(profile, "onlineId")?,
    })
}

/// `data.oracleUserProfileRetrieve.isPsPlusMember`, strictly a boolean.
pub fn parse_psplus_status(value: &Value) -> Result<bool, ParseError> {
    value
        .pointer("/data/oracleUserProfileRetrieve/isPsPlusMember")
        .ok_or_else(|| ParseError::missing("isPsPlusMember"))?
        .as_bool()
        .ok_or_else(|| ParseError::invalid("isPsPlusMember", "expected boolean"))
}

/// One page of `titles[] { titleId, name }`.
pub fn parse_owned_games(value: &Value) -> Result<Vec<OwnedGame>, ParseError> {
    if is_empty_payload(value) {
        return Ok(Vec::new());
    }
    let titles = field(value, "titles")?
        .as_array()
        .ok_or_else(|| ParseError::invalid("titles", "expected array"))?;
    titles
        .iter()
        .map(|title| {
            let name = title.get("name").and_then(Value::as_str).unwrap_or_default();
            Ok(OwnedGame::new(str_field(title, "titleId")?, name))
        })
        .collect()
}

/// Trophy title info per requested game.
///
/// Lenient by contract: every requested id is present in the result, and
/// anything the reply does not say about an id leaves its list empty.
pub fn parse_trophy_title_info_map(
    value: &Value,
    requested: &[GameId],
) -> HashMap<GameId, Vec<TrophyTitleInfo>> {
    let mut result: HashMap<GameId, Vec<TrophyTitleInfo>> = requested
        .iter()
        .map(|id| (id.clone(), Vec::new()))
        .collect();

    let apps = value.get("apps").and_then(Value::as_array);
    for app in apps.into_iter().flatten() {
        let Some(game_id) = app.get("npTitleId").and_then(Value::as_str) else {
            continue;
        };
        let Some(infos) = result.get_mut(&GameId::new(game_id)) else {
            continue;
        };
        let titles = app.get("trophyTitles").and_then(Value::as_array);
        infos.extend(titles.into_iter().flatten().filter_map(|title| {
            let communication_id = title.get("npCommunicationId")?.as_str()?;
            let name = title
                .get("trophyTitleName")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Some(TrophyTitleInfo::new(communication_id, name))
        }));
    }
    result
}

/// One page of `trophyTitles[] { npCommunicationId, fromUser.lastUpdateDate }`.
pub fn parse_trophy_titles(value: &Value) -> Result<Vec<TrophyTitle>, ParseError> {
    if is_empty_payload(value) {
        return Ok(Vec::new());
    }
    list(value, "trophyTitles")?
        .iter()
        .map(|title| {
            let last_update = str_field(field(title, "fromUser")?, "lastUpdateDate")?;
            Ok(TrophyTitle {
                communication_id: CommunicationId::new(str_field(title, "npCommunicationId")?),
                last_update_time: parse_timestamp(last_update)?,
            })
        })
        .collect()
}

/// Earned entries of `trophies[]`, ids scoped by `communication_id`.
pub fn parse_earned_trophies(
    value: &Value,
    communication_id: &CommunicationId,
) -> Result<Vec<Achievement>, ParseError> {
    if is_empty_payload(value) {
        return Ok(Vec::new());
    }
    list(value, "trophies")?
        .iter()
        .filter_map(|trophy| {
            let from_user = trophy.get("fromUser")?;
            let earned = from_user.get("earned").and_then(Value::as_bool)?;
            earned.then_some((trophy, from_user))
        })
        .map(|(trophy, from_user)| {
            let trophy_id = id_field(trophy, "trophyId")?;
            Ok(Achievement::new(
                Achievement::scoped_id(communication_id, &trophy_id),
                id_field(trophy, "trophyName")?,
                parse_timestamp(str_field(from_user, "earnedDate")?)?,
            ))
        })
        .collect()
}

/// One page of `profiles[] { accountId, onlineId }`.
pub fn parse_friends(value: &Value) -> Result<Vec<FriendInfo>, ParseError> {
    if is_empty_payload(value) {
        return Ok(Vec::new());
    }
    list(value, "profiles")?
        .iter()
        .map(|profile| {
            Ok(FriendInfo {
                user_id: id_field(profile, "accountId")?,
                user_name: id_field(profile, "onlineId")?,
            })
        })
        .collect()
}

/// One page of profiles with presence fields, keyed by account id.
pub fn parse_presences(value: &Value) -> Result<Vec<(String, UserPresence)>, ParseError> {
    if is_empty_payload(value) {
        return Ok(Vec::new());
    }
    list(value, "profiles")?
        .iter()
        .map(|profile| {
            let state = match profile.get("primaryOnlineStatus").and_then(Value::as_str) {
                Some("online") => PresenceState::Online,
                Some("offline") => PresenceState::Offline,
                _ => PresenceState::Unknown,
            };
            let presence = profile
                .get("presences")
                .and_then(Value::as_array)
                .and_then(|p| p.first());
            let platform = presence
                .and_then(|p| p.get("platform"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let last_online = presence
                .and_then(|p| p.get("lastOnlineDate"))
                .and_then(Value::as_str)
                .map(parse_timestamp)
                .transpose()?;
            Ok((
                id_field(profile, "accountId")?,
                UserPresence {
                    state,
                    platform,
                    last_online,
                },
            ))
        })
        .collect()
}

/// One page of `titles[] { titleId, playDuration, lastPlayedDateTime }`.
pub fn parse_played_games(value: &Value) -> Result<Vec<GameTime>, ParseError> {
    if is_empty_payload(value) {
        return Ok(Vec::new());
    }
    list(value, "titles")?
        .iter()
        .map(|title| {
            let last_played = title
                .get("lastPlayedDateTime")
                .and_then(Value::as_str)
                .map(parse_timestamp)
                .transpose()?;
            Ok(GameTime {
                game_id: GameId::new(str_field(title, "titleId")?),
                time_played_minutes: parse_play_duration(str_field(title, "playDuration")?)?,
                last_played,
            })
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
