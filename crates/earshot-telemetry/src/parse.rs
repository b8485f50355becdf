//! Console commands and reply parsers.
//!
//! Replies are free text meant for humans, so every parser anchors on the
//! last `:` of the reply and reads what follows it.

use std::collections::BTreeSet;

use crate::{Orientation, Position, TelemetryError};

/// The command that lists online players.
pub const ROSTER_COMMAND: &str = "list";

/// The reply to a `data get entity` for someone who is not in the world.
pub const NOT_FOUND: &str = "No entity was found";

pub fn position_command(player: &str) -> String {
    format!("data get entity {player} Pos")
}

pub fn rotation_command(player: &str) -> String {
    format!("data get entity {player} Rotation")
}

/// Parses `"There are 2 of a max of 20 players online: alice, bob"`.
pub fn parse_roster(reply: &str) -> Result<BTreeSet<String>, TelemetryError> {
    let names = after_last_colon(reply)?;
    Ok(names
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_owned)
        .collect())
}

/// Parses `"alice has the following entity data: [1.5d, 64.0d, -3.25d]"`.
///
/// `Ok(None)` when the player is not in the world.
pub fn parse_position(reply: &str) -> Result<Option<Position>, TelemetryError> {
    Ok(parse_list::<3>(reply)?.map(|[x, y, z]| Position { x, y, z }))
}

/// Parses `"alice has the following entity data: [90.0f, -12.5f]"`.
///
/// `Ok(None)` when the player is not in the world.
pub fn parse_rotation(reply: &str) -> Result<Option<Orientation>, TelemetryError> {
    Ok(parse_list::<2>(reply)?.map(|[yaw, pitch]| Orientation { yaw, pitch }))
}

fn after_last_colon(reply: &str) -> Result<&str, TelemetryError> {
    reply
        .rsplit_once(':')
        .map(|(_, rest)| rest.trim())
        .ok_or_else(|| TelemetryError::Parse(format!("no ':' in {reply:?}")))
}

fn parse_list<const N: usize>(reply: &str) -> Result<Option<[f64; N]>, TelemetryError> {
    if reply.trim() == NOT_FOUND {
        return Ok(None);
    }

    let list = after_last_colon(reply)?;
    let inner = list
        .strip_prefix('[')
        .and_then(|l| l.strip_suffix(']'))
        .ok_or_else(|| TelemetryError::Parse(format!("expected [..] in {reply:?}")))?;

    let mut out = [0.0; N];
    let mut count = 0;
    for element in inner.split(',') {
        if count == N {
            return Err(TelemetryError::Parse(format!(
                "expected {N} numbers in {reply:?}"
            )));
        }
        out[count] = parse_number(element)?;
        count += 1;
    }
    if count != N {
        return Err(TelemetryError::Parse(format!(
            "expected {N} numbers in {reply:?}"
        )));
    }
    Ok(Some(out))
}

/// Parses one NBT number, dropping a trailing type suffix (`1.5d`, `90.0f`).
fn parse_number(element: &str) -> Result<f64, TelemetryError> {
    let trimmed = element.trim();
    let digits = trimmed.trim_end_matches(['d', 'D', 'f', 'F']);
    digits
        .parse()
        .map_err(|_| TelemetryError::Parse(format!("not a number: {trimmed:?}")))
}
