//! Outcome of an Active phase.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::PlayerId;

/// Why a session ended without a real result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncompleteReason {
    /// The rules handler never reported within the verdict ceiling.
    VerdictTimeout,
    /// At most one participant was left and the module could not decide.
    PlayersLeft,
    /// An operator ended the session.
    ForcedEnd,
}

/// The terminal outcome of an Active phase, reported once by the
/// rules handler (or forced by the state machine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// One or more players won.
    Winner(Vec<PlayerId>),
    /// Nobody won.
    Draw,
    /// The module itself gave up on the round.
    Aborted { reason: String },
    /// The core ended the round on the module's behalf.
    Incomplete { reason: IncompleteReason },
}

impl Verdict {
    /// Shorthand for a core-forced outcome.
    pub fn incomplete(reason: IncompleteReason) -> Self {
        Self::Incomplete { reason }
    }

    /// Returns `true` if the state machine, not the module, produced this.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete { .. })
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Winner(players) => {
                f.write_str("winner(")?;
                for (i, p) in players.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{p}")?;
                }
                f.write_str(")")
            }
            Self::Draw => f.write_str("draw"),
            Self::Aborted { reason } => write!(f, "aborted: {reason}"),
            Self::Incomplete { reason } => write!(f, "incomplete: {reason:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_display() {
        let v = Verdict::Winner(vec![PlayerId(1), PlayerId(2)]);
        assert_eq!(v.to_string(), "winner(P-1, P-2)");
        assert_eq!(Verdict::Draw.to_string(), "draw");
        assert_eq!(
            Verdict::incomplete(IncompleteReason::VerdictTimeout).to_string(),
            "incomplete: VerdictTimeout"
        );
    }

    #[test]
    fn test_only_core_verdicts_are_incomplete() {
        assert!(Verdict::incomplete(IncompleteReason::PlayersLeft).is_incomplete());
        assert!(!Verdict::Draw.is_incomplete());
        assert!(!Verdict::Aborted { reason: "x".into() }.is_incomplete());
    }
}
