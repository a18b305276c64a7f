//! # Transactional Identity
//!
//! Builds and parses transactional ids of the form `<prefix>-<owner>-<sequence>`.
//!
//! The id is never persisted: any worker can regenerate it from the three fields, which is
//! what lets a restarted job find transactions that a dead producer left open. Parsing
//! splits from the right, so the prefix itself may contain `-`.

use crate::error::{RecoveryError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Separator between the three fields of a transactional id.
pub const SEPARATOR: char = '-';

/// Broker-side fencing counter of a transactional id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Epoch(pub i16);

impl Epoch {
    /// Epoch reported for an id that was never initialized before.
    pub const UNUSED: Epoch = Epoch(0);

    /// True when the id had never been opened before the fencing call.
    pub fn is_unused(self) -> bool {
        self == Self::UNUSED
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A transactional id in canonical `<prefix>-<owner>-<sequence>` form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionalId(String);

impl TransactionalId {
    /// Build the id for `owner`'s transaction number `sequence` under `prefix`.
    pub fn new(prefix: &str, owner: u32, sequence: u64) -> Self {
        TransactionalId(format!("{prefix}{SEPARATOR}{owner}{SEPARATOR}{sequence}"))
    }

    /// Build from signed inputs, rejecting negative or out-of-range fields.
    pub fn try_new(prefix: &str, owner: i64, sequence: i64) -> Result<Self> {
        let owner = u32::try_from(owner).map_err(|_| {
            RecoveryError::invalid("owner", format!("{owner} is not a valid subtask index"))
        })?;
        let sequence = u64::try_from(sequence).map_err(|_| {
            RecoveryError::invalid("sequence", format!("{sequence} must not be negative"))
        })?;
        Ok(Self::new(prefix, owner, sequence))
    }

    /// Wrap an id reported by the broker after checking it parses.
    pub fn parse(raw: &str) -> Result<Self> {
        parse_fields(raw)?;
        Ok(TransactionalId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn prefix(&self) -> Result<&str> {
        parse_prefix(&self.0)
    }

    pub fn owner(&self) -> Result<u32> {
        parse_owner(&self.0)
    }

    pub fn sequence(&self) -> Result<u64> {
        parse_sequence(&self.0)
    }

    /// Split into its three fields.
    pub fn fields(&self) -> Result<IdFields<'_>> {
        parse_fields(&self.0)
    }
}

impl fmt::Display for TransactionalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TransactionalId {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self> {
        TransactionalId::parse(s)
    }
}

impl AsRef<str> for TransactionalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for TransactionalId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<TransactionalId> for String {
    fn from(id: TransactionalId) -> String {
        id.0
    }
}

/// Borrowed view of the three fields of an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdFields<'a> {
    pub prefix: &'a str,
    pub owner: u32,
    pub sequence: u64,
}

/// Split `raw` from the right into prefix, owner and sequence.
pub fn parse_fields(raw: &str) -> Result<IdFields<'_>> {
    let mut parts = raw.rsplitn(3, SEPARATOR);
    let sequence = parts.next().unwrap_or_default();
    let (owner, prefix) = match (parts.next(), parts.next()) {
        (Some(owner), Some(prefix)) => (owner, prefix),
        _ => {
            return Err(RecoveryError::malformed(
                raw,
                "expected `<prefix>-<owner>-<sequence>`",
            ))
        }
    };
    let owner = parse_number::<u32>(raw, owner, "owner")?;
    let sequence = parse_number::<u64>(raw, sequence, "sequence")?;
    Ok(IdFields {
        prefix,
        owner,
        sequence,
    })
}

/// Prefix of `raw`, verbatim.
pub fn parse_prefix(raw: &str) -> Result<&str> {
    parse_fields(raw).map(|fields| fields.prefix)
}

/// Subtask index that opened `raw`.
pub fn parse_owner(raw: &str) -> Result<u32> {
    parse_fields(raw).map(|fields| fields.owner)
}

pub fn parse_sequence(raw: &str) -> Result<u64> {
    parse_fields(raw).map(|fields| fields.sequence)
}

fn parse_number<T: FromStr>(raw: &str, token: &str, field: &str) -> Result<T> {
    // `u64::from_str` accepts a leading `+`, which `new` never produces.
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RecoveryError::malformed(
            raw,
            format!("{field} `{token}` is not a non-negative integer"),
        ));
    }
    token
        .parse()
        .map_err(|_| RecoveryError::malformed(raw, format!("{field} `{token}` is out of range")))
}
