//! Compound identifiers: a fixed-length node id optionally followed by a
//! version (`@N`) or release (`@rN`) marker. Parsing is purely lexical.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, Result};

/// Length of every generated base id.
pub const ID_LENGTH: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Node,
    Version,
    Release,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CombinedId {
    pub base_id: String,
    pub kind: IdKind,
    pub number: Option<u64>,
}

impl CombinedId {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(HubError::MalformedId("empty id".into()));
        }
        // Short ids (such as the synthetic root) never carry a marker.
        if raw.len() <= ID_LENGTH {
            if raw.contains('@') {
                return Err(HubError::MalformedId(raw.to_string()));
            }
            return Ok(Self::node(raw));
        }
        let Some((base, suffix)) = raw.split_at_checked(ID_LENGTH) else {
            return Err(HubError::MalformedId(raw.to_string()));
        };
        if base.contains('@') {
            return Err(HubError::MalformedId(raw.to_string()));
        }
        let marker = suffix
            .strip_prefix('@')
            .ok_or_else(|| HubError::MalformedId(raw.to_string()))?;
        let (kind, digits) = match marker.strip_prefix('r') {
            Some(rest) => (IdKind::Release, rest),
            None => (IdKind::Version, marker),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(HubError::MalformedId(raw.to_string()));
        }
        let number = digits
            .parse::<u64>()
            .map_err(|_| HubError::MalformedId(raw.to_string()))?;
        Ok(Self {
            base_id: base.to_string(),
            kind,
            number: Some(number),
        })
    }

    pub fn node(id: &str) -> Self {
        Self {
            base_id: id.to_string(),
            kind: IdKind::Node,
            number: None,
        }
    }

    pub fn is_node(&self) -> bool {
        self.kind == IdKind::Node
    }

    pub fn is_version(&self) -> bool {
        self.kind == IdKind::Version
    }

    pub fn is_release(&self) -> bool {
        self.kind == IdKind::Release
    }
}

impl fmt::Display for CombinedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.number) {
            (IdKind::Version, Some(n)) => write!(f, "{}@{}", self.base_id, n),
            (IdKind::Release, Some(n)) => write!(f, "{}@r{}", self.base_id, n),
            _ => f.write_str(&self.base_id),
        }
    }
}

impl FromStr for CombinedId {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

pub fn encode_version(id: &str, number: u64) -> String {
    format!("{id}@{number}")
}

pub fn encode_release(id: &str, number: u64) -> String {
    format!("{id}@r{number}")
}

/// Whether `raw` is acceptable as a caller-supplied base id.
pub fn is_valid_base_id(raw: &str) -> bool {
    raw.len() == ID_LENGTH && raw.bytes().all(|b| b.is_ascii_alphanumeric())
}
