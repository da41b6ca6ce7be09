use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One primitive story event, parsed from a single author token such as
/// `MOVE fg=0 x=120 fast #intro`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Event kind (`SHOW`, `MOVE`, `text`, ...). Never empty.
    pub name: String,
    #[serde(default, skip_serializing_if = "FxHashMap::is_empty")]
    pub fields: FxHashMap<String, String>,
    /// The bare token without `=`, if the event carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// `#`-prefixed flags in encounter order. Metadata only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defines: Vec<String>,
}

impl EventRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: FxHashMap::default(),
            default: None,
            defines: Vec::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Defines rendered the way authoring tools display them: `a;b;c`.
    pub fn defines_joined(&self) -> String {
        self.defines.join(";")
    }

    /// Render the record back into the textual token grammar.
    ///
    /// Fields are emitted in key order so the output is stable.
    pub fn to_token(&self) -> String {
        let mut out = self.name.clone();

        let mut keys: Vec<&String> = self.fields.keys().collect();
        keys.sort();
        for key in keys {
            out.push(' ');
            out.push_str(key);
            out.push('=');
            out.push_str(&self.fields[key]);
        }

        if let Some(ref default) = self.default {
            out.push(' ');
            out.push_str(default);
        }

        for define in &self.defines {
            out.push_str(" #");
            out.push_str(define);
        }

        out
    }

    pub fn to_json(&self) -> Result<String, RecordError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(input: &str) -> Result<EventRecord, RecordError> {
        Ok(serde_json::from_str(input)?)
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_token())
    }
}

/// An element of a dispatch request: either a raw author token or a
/// record that was already built (for example by an earlier expansion).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventInput {
    Token(String),
    Record(EventRecord),
}

impl From<&str> for EventInput {
    fn from(value: &str) -> Self {
        Self::Token(value.to_string())
    }
}

impl From<String> for EventInput {
    fn from(value: String) -> Self {
        Self::Token(value)
    }
}

impl From<EventRecord> for EventInput {
    fn from(value: EventRecord) -> Self {
        Self::Record(value)
    }
}
