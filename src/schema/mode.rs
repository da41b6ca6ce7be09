use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModeError {
    #[error("unknown scheduling mode '{0}' (expected seque, sync or dialog)")]
    Unknown(String),
}

/// How a dispatched sequence decides when to play its next event.
///
/// Fixed when the sequence is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedulingMode {
    /// Advance once no actor anywhere is mid-motion.
    #[serde(rename = "seque", alias = "Sequential")]
    Sequential,
    /// Advance once the actor bound by the first event goes idle.
    #[serde(rename = "sync", alias = "Synchronized")]
    Synchronized,
    /// Same gate as `Synchronized`; the label tells the host the sequence
    /// drives a dialogue box.
    #[serde(rename = "dialog", alias = "DialogueGated")]
    DialogueGated,
}

impl SchedulingMode {
    /// The short label authors write (`seque`, `sync`, `dialog`).
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sequential => "seque",
            Self::Synchronized => "sync",
            Self::DialogueGated => "dialog",
        }
    }

    /// Whether readiness depends on a single bound actor rather than on
    /// the whole registry.
    pub fn is_actor_gated(&self) -> bool {
        !matches!(self, Self::Sequential)
    }
}

impl fmt::Display for SchedulingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SchedulingMode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "seque" | "sequential" => Ok(Self::Sequential),
            "sync" | "synchronized" => Ok(Self::Synchronized),
            "dialog" | "dialogue" | "dialoguegated" => Ok(Self::DialogueGated),
            _ => Err(ModeError::Unknown(s.to_string())),
        }
    }
}
