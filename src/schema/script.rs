use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use super::mode::SchedulingMode;
use super::record::EventInput;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// An authored event list and the mode it plays in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub mode: SchedulingMode,
    pub events: Vec<String>,
}

impl Scene {
    pub fn inputs(&self) -> Vec<EventInput> {
        self.events.iter().map(|e| EventInput::from(e.as_str())).collect()
    }
}

/// A story file: named scenes that can be dispatched by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Script {
    pub scenes: HashMap<String, Scene>,
}

impl Script {
    /// Load a script from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<Script, ScriptError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a script from a RON string.
    pub fn parse_ron(input: &str) -> Result<Script, ScriptError> {
        Ok(ron::from_str(input)?)
    }

    pub fn scene(&self, name: &str) -> Option<&Scene> {
        self.scenes.get(name)
    }

    /// Merge another script into this one; its scenes win on name clashes.
    pub fn merge(&mut self, other: Script) {
        self.scenes.extend(other.scenes);
    }
}
