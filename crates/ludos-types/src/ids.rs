//! Identity types.
//!
//! All of these are "newtype wrappers": a primitive wrapped in a named
//! struct. `PlayerId(7)` and `SessionId(7)` share a representation but
//! the compiler refuses to mix them up.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PlayerId
// ---------------------------------------------------------------------------

/// A unique identifier for a player connected to the host server.
///
/// `#[serde(transparent)]` serializes `PlayerId(42)` as plain `42`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// A unique identifier for one running minigame session.
///
/// Session IDs are never reused within a process: the orchestrator hands
/// them out from a monotonically increasing counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ArenaId
// ---------------------------------------------------------------------------

/// Identifies a reusable game space owned by the arena pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArenaId(pub u32);

impl fmt::Display for ArenaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// GameType
// ---------------------------------------------------------------------------

/// Tag naming a kind of minigame (`"blockparty"`, `"arena"`, `"rush"`).
///
/// Tags are compared exactly (case-sensitive). Game modules declare
/// their tag once in their descriptor; arenas list the tags they can host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameType(pub String);

impl GameType {
    /// Creates a tag from anything string-like.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The raw tag.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameType {
    fn from(tag: &str) -> Self {
        Self(tag.to_owned())
    }
}

impl From<String> for GameType {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}
