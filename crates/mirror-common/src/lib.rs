// Shared domain types and small helpers used across crates.
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid entity id: {0}")]
    InvalidEntityId(String),
    #[error("invalid entity kind: {0}")]
    InvalidEntityKind(String),
}

pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Current wall-clock time as nanoseconds since the Unix epoch, the same
/// scale consensus timestamps are expressed in.
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as i64)
        .unwrap_or_default()
}

/// Wall-clock duration until `timestamp` is reachable by consensus time.
/// Returns zero for timestamps that are already in the past.
pub fn nanos_until(timestamp: i64) -> Duration {
    let remaining = timestamp.saturating_sub(now_nanos());
    if remaining <= 0 {
        Duration::ZERO
    } else {
        Duration::from_nanos(remaining as u64)
    }
}

/// Opaque ledger entity id.
///
/// Entity ids are assigned by the ledger and shared by every entity kind;
/// the numeric value carries no meaning inside this codebase.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, Default,
)]
pub struct EntityId(i64);

impl EntityId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let id = input
            .parse::<i64>()
            .map_err(|_| Error::InvalidEntityId(input.into()))?;
        Ok(Self(id))
    }
}

/// Ledger entity kinds relevant to the mirror pipeline.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Account,
    Contract,
    File,
    Schedule,
    Token,
    Topic,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Account => "ACCOUNT",
            EntityKind::Contract => "CONTRACT",
            EntityKind::File => "FILE",
            EntityKind::Schedule => "SCHEDULE",
            EntityKind::Token => "TOKEN",
            EntityKind::Topic => "TOPIC",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        match input {
            "ACCOUNT" => Ok(EntityKind::Account),
            "CONTRACT" => Ok(EntityKind::Contract),
            "FILE" => Ok(EntityKind::File),
            "SCHEDULE" => Ok(EntityKind::Schedule),
            "TOKEN" => Ok(EntityKind::Token),
            "TOPIC" => Ok(EntityKind::Topic),
            other => Err(Error::InvalidEntityKind(other.into())),
        }
    }
}

/// Minimal entity view used for topic existence checks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
}

/// A single consensus message on a topic.
///
/// Per topic, `sequence_number` is a gap-free counter starting at 1 and
/// `consensus_timestamp` is unique and strictly increasing with it. Payloads
/// are `Bytes` so messages stay cheap to clone through the fan-out path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TopicMessage {
    pub topic_id: EntityId,
    pub sequence_number: u64,
    pub consensus_timestamp: i64,
    pub message: Bytes,
    pub running_hash: Bytes,
    pub running_hash_version: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_round_trip() {
        let id = EntityId::new(100);
        let parsed = EntityId::from_str(&id.to_string()).expect("parse");
        assert_eq!(id, parsed);
        assert_eq!(parsed.id(), 100);
    }

    #[test]
    fn entity_id_rejects_invalid_input() {
        let err = EntityId::from_str("not-a-number").expect_err("invalid");
        assert!(matches!(err, Error::InvalidEntityId(s) if s == "not-a-number"));
    }

    #[test]
    fn entity_kind_round_trip() {
        for kind in [
            EntityKind::Account,
            EntityKind::Contract,
            EntityKind::File,
            EntityKind::Schedule,
            EntityKind::Token,
            EntityKind::Topic,
        ] {
            let parsed = EntityKind::from_str(kind.as_str()).expect("parse");
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn entity_kind_rejects_unknown() {
        let err = EntityKind::from_str("WIDGET").expect_err("invalid");
        assert!(matches!(err, Error::InvalidEntityKind(s) if s == "WIDGET"));
    }

    #[test]
    fn nanos_until_past_timestamp_is_zero() {
        assert_eq!(nanos_until(0), Duration::ZERO);
        assert_eq!(nanos_until(now_nanos() - NANOS_PER_SECOND), Duration::ZERO);
    }

    #[test]
    fn nanos_until_future_timestamp_is_positive() {
        let wait = nanos_until(now_nanos() + 30 * NANOS_PER_SECOND);
        assert!(wait > Duration::from_secs(25));
        assert!(wait <= Duration::from_secs(30));
    }
}
