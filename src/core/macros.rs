/// Macro table — loading, flattening, and expansion into event records.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::core::parser::{leading_word, parse};
use crate::schema::record::{EventInput, EventRecord, RecordError};

#[derive(Debug, Error)]
pub enum MacroError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Suffix of the parameter list entry in the flat authoring layout.
pub const PARAM_SUFFIX: &str = "_Param";

/// One entry of a macro body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacroItem {
    /// An event template, emitted after parameter substitution.
    Literal(String),
    /// Reference to another macro whose body is inlined here.
    Macro(String),
}

/// A named macro: positional placeholders and the body they appear in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroDef {
    pub params: Vec<String>,
    pub body: Vec<MacroItem>,
}

/// A set of named macros.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MacroTable {
    pub macros: HashMap<String, MacroDef>,
}

/// Findings from [`MacroTable::lint`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroLint {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl MacroLint {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

// The RON layout names the struct `Define` so files read as
// `"GREET": Define(params: [...], body: [...])`.
#[derive(Debug, Deserialize)]
#[serde(rename = "Define")]
struct RonMacro {
    #[serde(default)]
    params: Vec<String>,
    body: Vec<MacroItem>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a macro table from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<MacroTable, MacroError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a macro table from a RON string.
    pub fn parse_ron(input: &str) -> Result<MacroTable, MacroError> {
        let raw: HashMap<String, RonMacro> = ron::from_str(input)?;
        let macros = raw
            .into_iter()
            .map(|(name, m)| {
                (
                    name,
                    MacroDef {
                        params: m.params,
                        body: m.body,
                    },
                )
            })
            .collect();
        Ok(MacroTable { macros })
    }

    /// Build a table from the flat authoring layout, where each macro is a
    /// list of templates and its placeholders live under `<name>_Param`:
    ///
    /// `{ "GREET": ["text GreetMsg"], "GREET_Param": ["GreetMsg"] }`
    pub fn from_param_layout(entries: HashMap<String, Vec<String>>) -> MacroTable {
        let mut macros = HashMap::new();
        for (name, templates) in &entries {
            if name.ends_with(PARAM_SUFFIX) {
                continue;
            }
            let params = entries
                .get(&format!("{}{}", name, PARAM_SUFFIX))
                .cloned()
                .unwrap_or_default();
            let body = templates.iter().cloned().map(MacroItem::Literal).collect();
            macros.insert(name.clone(), MacroDef { params, body });
        }
        MacroTable { macros }
    }

    pub fn insert(&mut self, name: impl Into<String>, def: MacroDef) {
        self.macros.insert(name.into(), def);
    }

    pub fn get(&self, name: &str) -> Option<&MacroDef> {
        self.macros.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Merge another table into this one. Macros from `other` override
    /// macros in `self` with the same name.
    pub fn merge(&mut self, other: MacroTable) {
        for (name, def) in other.macros {
            self.macros.insert(name, def);
        }
    }

    /// Resolve a macro body into its literal templates, inlining nested
    /// macro references depth-first. Unknown or cyclic references are
    /// dropped with a warning.
    pub fn flatten(&self, name: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = Vec::new();
        self.flatten_into(name, &mut stack, &mut out);
        out
    }

    fn flatten_into(&self, name: &str, stack: &mut Vec<String>, out: &mut Vec<String>) {
        let Some(def) = self.macros.get(name) else {
            tracing::warn!(macro_name = name, "reference to unknown macro dropped");
            return;
        };
        if stack.iter().any(|s| s == name) {
            tracing::warn!(
                macro_name = name,
                chain = %stack.join(" -> "),
                "macro reference cycle cut"
            );
            return;
        }

        stack.push(name.to_string());
        for item in &def.body {
            match item {
                MacroItem::Literal(text) => out.push(text.clone()),
                MacroItem::Macro(inner) => self.flatten_into(inner, stack, out),
            }
        }
        stack.pop();
    }

    /// Expand one macro call (`NAME a=1 b=2 ...`) into concrete event
    /// templates.
    ///
    /// The `c`-th placeholder is replaced, everywhere it occurs, by the
    /// value part of the `c`-th trailing token (the text after its first
    /// `=`, or the whole token when it has none). Placeholders without a
    /// matching token are left as written.
    pub fn substitute(&self, call: &str) -> Vec<String> {
        let name = leading_word(call);
        let Some(def) = self.macros.get(name) else {
            return vec![call.to_string()];
        };

        let args: Vec<&str> = call[name.len()..]
            .split_whitespace()
            .map(|arg| arg.split_once('=').map_or(arg, |(_, value)| value))
            .collect();

        let mut templates = self.flatten(name);
        for (c, placeholder) in def.params.iter().enumerate() {
            if placeholder.is_empty() {
                tracing::warn!(macro_name = name, index = c, "empty placeholder ignored");
                continue;
            }
            let Some(value) = args.get(c) else {
                tracing::warn!(
                    macro_name = name,
                    placeholder = placeholder.as_str(),
                    expected = def.params.len(),
                    supplied = args.len(),
                    "macro call is missing an argument, placeholder left as written"
                );
                continue;
            };
            for template in templates.iter_mut() {
                if template.contains(placeholder.as_str()) {
                    *template = template.replace(placeholder.as_str(), value);
                }
            }
        }

        templates
    }

    /// Expand an author event list into the flat record sequence.
    ///
    /// When the first element is already a record the list is treated as
    /// pre-expanded: records pass through unchanged and any tokens are
    /// parsed without macro lookup.
    pub fn expand(&self, inputs: &[EventInput]) -> Vec<EventRecord> {
        if matches!(inputs.first(), Some(EventInput::Record(_))) {
            return inputs
                .iter()
                .filter_map(|input| match input {
                    EventInput::Record(record) => Some(record.clone()),
                    EventInput::Token(token) => parse_or_skip(token),
                })
                .collect();
        }

        let mut out = Vec::new();
        for input in inputs {
            match input {
                EventInput::Record(record) => out.push(record.clone()),
                EventInput::Token(token) => {
                    if self.contains(leading_word(token)) {
                        out.extend(self.substitute(token).iter().filter_map(|t| parse_or_skip(t)));
                    } else {
                        out.extend(parse_or_skip(token));
                    }
                }
            }
        }
        out
    }

    /// [`MacroTable::expand`] with each record serialized as JSON text.
    pub fn expand_tokens(&self, inputs: &[EventInput]) -> Result<Vec<String>, RecordError> {
        self.expand(inputs).iter().map(EventRecord::to_json).collect()
    }

    /// Check the table for authoring mistakes.
    pub fn lint(&self) -> MacroLint {
        let mut lint = MacroLint::default();

        let mut names: Vec<&String> = self.macros.keys().collect();
        names.sort();

        for name in names {
            let def = &self.macros[name];

            if def.body.is_empty() {
                lint.warnings
                    .push(format!("Macro '{}' has an empty body", name));
            }

            for item in &def.body {
                match item {
                    MacroItem::Macro(inner) if !self.macros.contains_key(inner) => {
                        lint.errors.push(format!(
                            "Macro '{}' references non-existent macro '{}'",
                            name, inner
                        ));
                    }
                    MacroItem::Literal(text) if parse(text).is_none() => {
                        lint.warnings.push(format!(
                            "Macro '{}' contains a blank template that expands to nothing",
                            name
                        ));
                    }
                    _ => {}
                }
            }

            if let Some(cycle) = self.find_cycle(name) {
                lint.errors.push(format!(
                    "Macro '{}' is part of a reference cycle: {}",
                    name,
                    cycle.join(" -> ")
                ));
            }

            let templates = self.flatten_quiet(name);
            for param in &def.params {
                if param.is_empty() {
                    lint.errors
                        .push(format!("Macro '{}' declares an empty placeholder", name));
                    continue;
                }
                if !templates.iter().any(|t| t.contains(param.as_str())) {
                    lint.warnings.push(format!(
                        "Macro '{}' placeholder '{}' never appears in its body",
                        name, param
                    ));
                }
                for other in &def.params {
                    if other != param && !param.is_empty() && other.contains(param.as_str()) {
                        lint.warnings.push(format!(
                            "Macro '{}' placeholder '{}' is contained in placeholder '{}'",
                            name, param, other
                        ));
                    }
                }
            }
        }

        lint
    }

    fn find_cycle(&self, start: &str) -> Option<Vec<String>> {
        let mut path = vec![start.to_string()];
        if self.cycle_from(start, start, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn cycle_from(&self, start: &str, current: &str, path: &mut Vec<String>) -> bool {
        let Some(def) = self.macros.get(current) else {
            return false;
        };
        for item in &def.body {
            let MacroItem::Macro(next) = item else {
                continue;
            };
            if next == start {
                path.push(next.clone());
                return true;
            }
            if path.iter().any(|p| p == next) {
                continue;
            }
            path.push(next.clone());
            if self.cycle_from(start, next, path) {
                return true;
            }
            path.pop();
        }
        false
    }

    // Flattening for lint purposes, without the warnings `flatten` logs.
    fn flatten_quiet(&self, name: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![name.to_string()];
        self.collect_literals(name, &mut stack, &mut out);
        out
    }

    fn collect_literals(&self, name: &str, stack: &mut Vec<String>, out: &mut Vec<String>) {
        let Some(def) = self.macros.get(name) else {
            return;
        };
        for item in &def.body {
            match item {
                MacroItem::Literal(text) => out.push(text.clone()),
                MacroItem::Macro(inner) if !stack.contains(inner) => {
                    stack.push(inner.clone());
                    self.collect_literals(inner, stack, out);
                    stack.pop();
                }
                MacroItem::Macro(_) => {}
            }
        }
    }
}

/// Convenience wrapper for [`MacroTable::expand`].
pub fn expand(table: &MacroTable, inputs: &[EventInput]) -> Vec<EventRecord> {
    table.expand(inputs)
}

fn parse_or_skip(token: &str) -> Option<EventRecord> {
    let record = parse(token);
    if record.is_none() {
        tracing::debug!(token, "blank event token skipped");
    }
    record
}
