//! WASM bindings for narrative-sequencer — lets a JavaScript scene host drive
//! event playback from its own render loop.

use std::collections::HashMap;
use wasm_bindgen::prelude::*;

use narrative_sequencer::core::director::{Director, RunHandle};
use narrative_sequencer::core::macros::MacroTable;
use narrative_sequencer::core::registry::{ActorSlot, ActorStateRegistry};
use narrative_sequencer::schema::mode::SchedulingMode;
use narrative_sequencer::schema::record::{EventInput, EventRecord};

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Serialize)]
struct ExecutedEvent<'a> {
    run: u64,
    event: &'a EventRecord,
}

#[derive(serde::Serialize)]
struct TickOutput<'a> {
    executed: Vec<ExecutedEvent<'a>>,
    completed: Vec<u64>,
}

#[derive(serde::Serialize)]
struct LintOutput<'a> {
    errors: &'a [String],
    warnings: &'a [String],
}

// ---------------------------------------------------------------------------
// StorySequencer — the main exported struct
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct StorySequencer {
    director: Director,
    registry: ActorStateRegistry,
    actors: HashMap<String, ActorSlot>,
}

#[wasm_bindgen]
impl StorySequencer {
    /// Create a sequencer from a RON macro table (empty string for none).
    #[wasm_bindgen(constructor)]
    pub fn new(macros_ron: &str) -> Result<StorySequencer, JsError> {
        Self::from_ron(macros_ron).map_err(|e| JsError::new(&e))
    }

    /// Create a sequencer from the flat JSON macro layout:
    /// `{ "GREET": ["text GreetMsg"], "GREET_Param": ["GreetMsg"] }`.
    pub fn from_param_layout(macros_json: &str) -> Result<StorySequencer, JsError> {
        let entries: HashMap<String, Vec<String>> = serde_json::from_str(macros_json)
            .map_err(|e| JsError::new(&format!("Invalid macro JSON: {e}")))?;
        Self::with_table(MacroTable::from_param_layout(entries)).map_err(|e| JsError::new(&e))
    }

    /// Register a named actor; events whose `fg` field names it bind to
    /// its slot. Returns the slot index.
    pub fn register_actor(&mut self, name: &str) -> Result<u32, JsError> {
        self.register(name).map_err(|e| JsError::new(&e))
    }

    /// Allocate an anonymous actor slot. The host binds runs to it
    /// explicitly with `bind_actor`.
    pub fn allocate_slot(&mut self) -> Result<u32, JsError> {
        self.allocate()
            .map(|(_, index)| index)
            .map_err(|e| JsError::new(&e))
    }

    /// Report an actor's state for this frame (`"nothing"` when idle).
    pub fn report(&mut self, slot: u32, state: &str) {
        self.registry.report(ActorSlot(slot as usize), state);
    }

    /// Dispatch a JSON array of event tokens and/or records.
    ///
    /// `mode` is one of `seque`, `sync`, `dialog`. Returns the run id.
    pub fn dispatch(&mut self, events_json: &str, mode: &str) -> Result<u64, JsError> {
        self.dispatch_json(events_json, mode).map_err(|e| JsError::new(&e))
    }

    /// Bind a run's pending actor subscription explicitly.
    pub fn bind_actor(&mut self, run: u64, slot: u32) -> bool {
        self.director.bind_actor(RunHandle(run), ActorSlot(slot as usize))
    }

    pub fn cancel(&mut self, run: u64) -> bool {
        self.director.cancel(RunHandle(run))
    }

    pub fn is_active(&self, run: u64) -> bool {
        self.director.is_active(RunHandle(run))
    }

    pub fn active_runs(&self) -> usize {
        self.director.active_runs()
    }

    /// Advance one frame. Returns JSON:
    /// ```json
    /// { "executed": [{ "run": 0, "event": { "name": "SHOW", "fields": { "fg": "0" } } }],
    ///   "completed": [0] }
    /// ```
    /// The host performs each executed event, then reports actor states
    /// before the next call.
    pub fn tick(&mut self) -> Result<String, JsError> {
        self.tick_json().map_err(|e| JsError::new(&e))
    }

    /// Expand a JSON event list without dispatching it. Returns a JSON
    /// array of records.
    pub fn expand(&self, events_json: &str) -> Result<String, JsError> {
        self.expand_json(events_json).map_err(|e| JsError::new(&e))
    }

    /// Lint the loaded macros. Returns `{ "errors": [...], "warnings": [...] }`.
    pub fn lint(&self) -> String {
        let lint = self.director.macros().lint();
        serde_json::to_string(&LintOutput {
            errors: &lint.errors,
            warnings: &lint.warnings,
        })
        .unwrap_or_else(|_| r#"{"errors":[],"warnings":[]}"#.to_string())
    }

    /// Return JSON array of scheduling mode labels.
    pub fn modes() -> String {
        serde_json::to_string(&["seque", "sync", "dialog"]).unwrap_or_else(|_| "[]".to_string())
    }
}

// Private helpers; errors stay plain strings until they cross into JS.
impl StorySequencer {
    fn from_ron(macros_ron: &str) -> Result<StorySequencer, String> {
        let macros = if macros_ron.trim().is_empty() {
            MacroTable::new()
        } else {
            MacroTable::parse_ron(macros_ron).map_err(|e| format!("Macro parse error: {e}"))?
        };
        Self::with_table(macros)
    }

    fn with_table(macros: MacroTable) -> Result<StorySequencer, String> {
        let director = Director::builder()
            .with_macros(macros)
            .build()
            .map_err(|e| format!("Director build error: {e}"))?;
        Ok(StorySequencer {
            director,
            registry: ActorStateRegistry::new(),
            actors: HashMap::new(),
        })
    }

    fn register(&mut self, name: &str) -> Result<u32, String> {
        if let Some(slot) = self.actors.get(name) {
            return slot_index(*slot);
        }
        let (slot, index) = self.allocate()?;
        self.actors.insert(name.to_string(), slot);
        Ok(index)
    }

    // A slot JS cannot address is handed back before the error returns.
    fn allocate(&mut self) -> Result<(ActorSlot, u32), String> {
        let slot = self.registry.allocate_slot();
        match slot_index(slot) {
            Ok(index) => Ok((slot, index)),
            Err(e) => {
                self.registry.release(slot);
                Err(e)
            }
        }
    }

    fn dispatch_json(&mut self, events_json: &str, mode: &str) -> Result<u64, String> {
        let inputs = parse_inputs(events_json)?;
        let mode: SchedulingMode = mode.parse().map_err(|e| format!("{e}"))?;
        Ok(self.director.dispatch(inputs, mode).0)
    }

    fn tick_json(&mut self) -> Result<String, String> {
        let actors = &self.actors;
        let mut executed: Vec<(u64, EventRecord)> = Vec::new();
        let report = self.director.tick_each(&self.registry, |handle, record| {
            executed.push((handle.0, record.clone()));
            record
                .field("fg")
                .and_then(|who| actors.get(who))
                .copied()
        });

        let output = TickOutput {
            executed: executed
                .iter()
                .map(|(run, event)| ExecutedEvent { run: *run, event })
                .collect(),
            completed: report.completed.iter().map(|h| h.0).collect(),
        };
        serde_json::to_string(&output)
            .map_err(|e| format!("Serialization error: {e}"))
    }

    fn expand_json(&self, events_json: &str) -> Result<String, String> {
        let inputs = parse_inputs(events_json)?;
        let records = self.director.macros().expand(&inputs);
        serde_json::to_string(&records).map_err(|e| format!("Serialization error: {e}"))
    }
}

/// Slot indices cross into JS as `u32`.
fn slot_index(slot: ActorSlot) -> Result<u32, String> {
    u32::try_from(slot.0).map_err(|_| format!("actor slot {} does not fit in a u32", slot.0))
}

fn parse_inputs(events_json: &str) -> Result<Vec<EventInput>, String> {
    serde_json::from_str(events_json).map_err(|e| format!("Invalid events JSON: {e}"))
}
