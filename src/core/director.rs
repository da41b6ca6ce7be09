/// The event director: author events → expanded runs → per-frame playback.
///
/// Wires together macro expansion, record parsing, and the frame
/// scheduler, and acts as the tick registry the host drives once a frame.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::macros::{MacroError, MacroTable};
use crate::core::registry::{ActorSlot, ActorStateRegistry};
use crate::core::scheduler::{
    EventExecutor, RunState, StepOutcome, DEFAULT_STALL_WARNING_TICKS,
};
use crate::schema::mode::SchedulingMode;
use crate::schema::record::{EventInput, EventRecord};
use crate::schema::script::{Script, ScriptError};

#[derive(Debug, Error)]
pub enum DirectorError {
    #[error("macro error: {0}")]
    Macro(#[from] MacroError),
    #[error("script error: {0}")]
    Script(#[from] ScriptError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("scene not found: {0}")]
    SceneNotFound(String),
    #[error("stall warning threshold must be at least one tick")]
    InvalidStallThreshold,
}

/// Identifies one dispatched run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunHandle(pub u64);

impl fmt::Display for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run#{}", self.0)
    }
}

/// What one [`Director::tick`] did across all registered runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Runs that executed a record this tick, in tick order.
    pub executed: Vec<RunHandle>,
    /// Runs that finished this tick and were unregistered.
    pub completed: Vec<RunHandle>,
}

/// The top-level sequencer. Built via `Director::builder()`.
pub struct Director {
    macros: MacroTable,
    runs: Vec<(RunHandle, RunState)>,
    next_run: u64,
    stall_warning_ticks: u32,
}

/// Builder for constructing a `Director`.
pub struct DirectorBuilder {
    macros_dir: Option<PathBuf>,
    macro_files: Vec<PathBuf>,
    stall_warning_ticks: u32,
    /// Directly provided macros (for testing without files).
    macros: Option<MacroTable>,
}

impl Director {
    pub fn builder() -> DirectorBuilder {
        DirectorBuilder {
            macros_dir: None,
            macro_files: Vec::new(),
            stall_warning_ticks: DEFAULT_STALL_WARNING_TICKS,
            macros: None,
        }
    }

    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    pub fn macros_mut(&mut self) -> &mut MacroTable {
        &mut self.macros
    }

    /// Expand `inputs` and register the resulting run for playback.
    ///
    /// A list that expands to nothing is not registered; its handle is
    /// reported inactive straight away.
    pub fn dispatch<I>(&mut self, inputs: I, mode: SchedulingMode) -> RunHandle
    where
        I: IntoIterator,
        I::Item: Into<EventInput>,
    {
        let inputs: Vec<EventInput> = inputs.into_iter().map(Into::into).collect();
        let sequence = self.macros.expand(&inputs);
        self.register(sequence, mode)
    }

    /// Dispatch a named scene from `script`.
    pub fn dispatch_scene(
        &mut self,
        script: &Script,
        name: &str,
    ) -> Result<RunHandle, DirectorError> {
        let scene = script
            .scene(name)
            .ok_or_else(|| DirectorError::SceneNotFound(name.to_string()))?;
        Ok(self.dispatch(scene.inputs(), scene.mode))
    }

    fn register(&mut self, sequence: Vec<EventRecord>, mode: SchedulingMode) -> RunHandle {
        let handle = RunHandle(self.next_run);
        self.next_run += 1;

        if sequence.is_empty() {
            tracing::debug!(run = %handle, "dispatched sequence is empty, not registering");
            return handle;
        }

        tracing::debug!(run = %handle, %mode, events = sequence.len(), "run registered");
        let run = RunState::new(sequence, mode).with_stall_warning_ticks(self.stall_warning_ticks);
        self.runs.push((handle, run));
        handle
    }

    /// Unregister a run before it finishes. Returns `false` if it was not
    /// registered (already finished or cancelled).
    pub fn cancel(&mut self, handle: RunHandle) -> bool {
        let before = self.runs.len();
        self.runs.retain(|(h, _)| *h != handle);
        let removed = self.runs.len() != before;
        if removed {
            tracing::debug!(run = %handle, "run cancelled");
        }
        removed
    }

    pub fn is_active(&self, handle: RunHandle) -> bool {
        self.run(handle).is_some()
    }

    pub fn run(&self, handle: RunHandle) -> Option<&RunState> {
        self.runs.iter().find(|(h, _)| *h == handle).map(|(_, r)| r)
    }

    fn run_mut(&mut self, handle: RunHandle) -> Option<&mut RunState> {
        self.runs
            .iter_mut()
            .find(|(h, _)| *h == handle)
            .map(|(_, r)| r)
    }

    /// The actor a registered run is gated on, once bound.
    pub fn bound_actor(&self, handle: RunHandle) -> Option<ActorSlot> {
        self.run(handle).and_then(RunState::bound_actor)
    }

    /// Fulfill a run's pending actor binding from outside the executor.
    pub fn bind_actor(&mut self, handle: RunHandle, slot: ActorSlot) -> bool {
        self.run_mut(handle)
            .map(|run| run.bind_actor(slot))
            .unwrap_or(false)
    }

    pub fn active_runs(&self) -> usize {
        self.runs.len()
    }

    pub fn handles(&self) -> impl Iterator<Item = RunHandle> + '_ {
        self.runs.iter().map(|(h, _)| *h)
    }

    /// Advance every registered run by at most one record.
    pub fn tick<E>(&mut self, registry: &ActorStateRegistry, executor: &mut E) -> TickReport
    where
        E: EventExecutor + ?Sized,
    {
        self.tick_each(registry, |_, record| executor.execute(record))
    }

    /// Like [`Director::tick`], but the executor also learns which run each
    /// record belongs to.
    pub fn tick_each<F>(&mut self, registry: &ActorStateRegistry, mut execute: F) -> TickReport
    where
        F: FnMut(RunHandle, &EventRecord) -> Option<ActorSlot>,
    {
        let mut report = TickReport::default();

        for (handle, run) in self.runs.iter_mut() {
            let handle = *handle;
            let _span = tracing::trace_span!("run", id = handle.0).entered();
            let mut exec = |record: &EventRecord| execute(handle, record);
            match run.step(registry, &mut exec) {
                StepOutcome::Advanced => report.executed.push(handle),
                StepOutcome::Completed => {
                    report.executed.push(handle);
                    report.completed.push(handle);
                }
                StepOutcome::Waiting | StepOutcome::Finished => {}
            }
        }

        if !report.completed.is_empty() {
            self.runs.retain(|(_, run)| !run.is_finished());
            for handle in &report.completed {
                tracing::debug!(run = %handle, "run finished");
            }
        }

        report
    }
}

impl DirectorBuilder {
    /// Load every `.ron` macro file in `path`. Files are applied in name
    /// order, later ones overriding earlier ones.
    pub fn macros_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.macros_dir = Some(path.into());
        self
    }

    /// Load one RON macro file. Applied after `macros_dir`.
    pub fn macro_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.macro_files.push(path.into());
        self
    }

    pub fn stall_warning_ticks(mut self, ticks: u32) -> Self {
        self.stall_warning_ticks = ticks;
        self
    }

    /// Provide macros directly (for testing without files).
    pub fn with_macros(mut self, macros: MacroTable) -> Self {
        self.macros = Some(macros);
        self
    }

    pub fn build(self) -> Result<Director, DirectorError> {
        if self.stall_warning_ticks == 0 {
            return Err(DirectorError::InvalidStallThreshold);
        }

        let mut macros = self.macros.unwrap_or_default();

        if let Some(ref dir) = self.macros_dir {
            if dir.exists() {
                load_ron_files_from_dir(dir, |path| {
                    macros.merge(MacroTable::load_from_ron(path)?);
                    Ok(())
                })?;
            } else {
                tracing::warn!(dir = %dir.display(), "macro directory does not exist");
            }
        }

        for path in &self.macro_files {
            macros.merge(MacroTable::load_from_ron(path)?);
        }

        tracing::debug!(macros = macros.len(), "director built");

        Ok(Director {
            macros,
            runs: Vec::new(),
            next_run: 0,
            stall_warning_ticks: self.stall_warning_ticks,
        })
    }
}

/// Load all .ron files from a directory in name order, calling `loader`
/// for each.
fn load_ron_files_from_dir<F>(dir: &Path, mut loader: F) -> Result<(), DirectorError>
where
    F: FnMut(&Path) -> Result<(), DirectorError>,
{
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) == Some("ron") {
            paths.push(path);
        }
    }
    paths.sort();
    for path in &paths {
        loader(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::IDLE_STATE;
    use std::collections::HashMap;

    fn greet_director() -> Director {
        let macros = MacroTable::from_param_layout(HashMap::from([
            ("GREET".to_string(), vec!["text GreetMsg".to_string()]),
            ("GREET_Param".to_string(), vec!["GreetMsg".to_string()]),
        ]));
        Director::builder().with_macros(macros).build().unwrap()
    }

    #[test]
    fn dispatch_show_sequential() {
        let mut director = Director::builder().build().unwrap();
        let registry = ActorStateRegistry::new();
        let handle = director.dispatch(["SHOW fg=0"], SchedulingMode::Sequential);

        let run = director.run(handle).unwrap();
        assert_eq!(
            run.sequence(),
            &[EventRecord::new("SHOW").with_field("fg", "0")]
        );

        let mut executed = Vec::new();
        let mut exec = |r: &EventRecord| -> Option<ActorSlot> {
            executed.push(r.name.clone());
            None
        };
        let report = director.tick(&registry, &mut exec);
        assert_eq!(report.executed, vec![handle]);
        assert_eq!(report.completed, vec![handle]);
        assert!(!director.is_active(handle));

        let report = director.tick(&registry, &mut exec);
        assert!(report.executed.is_empty());
        assert_eq!(executed, vec!["SHOW".to_string()]);
    }

    #[test]
    fn dispatch_expands_macros() {
        let mut director = greet_director();
        let handle = director.dispatch(["GREET default=Hello"], SchedulingMode::Sequential);
        assert_eq!(
            director.run(handle).unwrap().sequence(),
            &[EventRecord::new("text").with_default("Hello")]
        );
    }

    #[test]
    fn synchronized_scenario() {
        let mut director = Director::builder().build().unwrap();
        let mut registry = ActorStateRegistry::new();
        let actor = registry.allocate_slot();
        let handle = director.dispatch(
            ["MOVE fg=0 x=10", "text Arrived"],
            SchedulingMode::Synchronized,
        );

        let mut calls: Vec<(u32, String)> = Vec::new();
        for tick in 1..=3u32 {
            if tick == 3 {
                registry.report(actor, IDLE_STATE);
            }
            let mut exec = |r: &EventRecord| -> Option<ActorSlot> {
                calls.push((tick, r.name.clone()));
                (r.name == "MOVE").then_some(actor)
            };
            director.tick(&registry, &mut exec);
            if tick == 1 {
                assert_eq!(director.bound_actor(handle), Some(actor));
                registry.report(actor, "moving");
            }
        }

        assert_eq!(calls, vec![(1, "MOVE".to_string()), (3, "text".to_string())]);
        assert!(!director.is_active(handle));
    }

    #[test]
    fn empty_dispatch_is_inactive() {
        let mut director = Director::builder().build().unwrap();
        let handle = director.dispatch(["", " "], SchedulingMode::Sequential);
        assert!(!director.is_active(handle));
        assert_eq!(director.active_runs(), 0);
    }

    #[test]
    fn handles_are_unique() {
        let mut director = Director::builder().build().unwrap();
        let a = director.dispatch(["A"], SchedulingMode::Sequential);
        let b = director.dispatch(["B"], SchedulingMode::Sequential);
        assert_ne!(a, b);
        assert_eq!(director.handles().collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut director = Director::builder().build().unwrap();
        let handle = director.dispatch(["A", "B"], SchedulingMode::Sequential);
        assert!(director.cancel(handle));
        assert!(!director.cancel(handle));
        assert!(!director.is_active(handle));
    }

    #[test]
    fn runs_keep_their_own_order() {
        let mut director = Director::builder().build().unwrap();
        let registry = ActorStateRegistry::new();
        let a = director.dispatch(["A1", "A2", "A3"], SchedulingMode::Sequential);
        let b = director.dispatch(["B1", "B2"], SchedulingMode::Sequential);

        let mut seen: Vec<(RunHandle, String)> = Vec::new();
        for _ in 0..4 {
            director.tick_each(&registry, |handle, record| {
                seen.push((handle, record.name.clone()));
                None
            });
        }

        let of = |h: RunHandle| -> Vec<String> {
            seen.iter()
                .filter(|(run, _)| *run == h)
                .map(|(_, name)| name.clone())
                .collect()
        };
        assert_eq!(of(a), vec!["A1", "A2", "A3"]);
        assert_eq!(of(b), vec!["B1", "B2"]);
        assert_eq!(director.active_runs(), 0);
    }

    #[test]
    fn one_event_per_run_per_tick() {
        let mut director = Director::builder().build().unwrap();
        let registry = ActorStateRegistry::new();
        director.dispatch(["A", "B", "C"], SchedulingMode::Sequential);
        let mut count = 0;
        let mut exec = |_: &EventRecord| -> Option<ActorSlot> {
            count += 1;
            None
        };
        director.tick(&registry, &mut exec);
        director.tick(&registry, &mut exec);
        assert_eq!(count, 2);
    }

    #[test]
    fn explicit_binding() {
        let mut director = Director::builder().build().unwrap();
        let mut registry = ActorStateRegistry::new();
        let actor = registry.allocate_slot();
        let handle =
            director.dispatch(["SAY who=ann", "text Hi"], SchedulingMode::DialogueGated);
        let mut exec = |_: &EventRecord| -> Option<ActorSlot> { None };

        director.tick(&registry, &mut exec);
        assert_eq!(director.bound_actor(handle), None);
        director.tick(&registry, &mut exec);
        assert!(director.is_active(handle));

        assert!(director.bind_actor(handle, actor));
        assert!(!director.bind_actor(handle, ActorSlot(9)));
        registry.report(actor, IDLE_STATE);
        let report = director.tick(&registry, &mut exec);
        assert_eq!(report.completed, vec![handle]);
    }

    #[test]
    fn bind_unknown_run_is_false() {
        let mut director = Director::builder().build().unwrap();
        assert!(!director.bind_actor(RunHandle(42), ActorSlot(0)));
        assert_eq!(director.bound_actor(RunHandle(42)), None);
    }

    #[test]
    fn dispatch_scene_by_name() {
        let script = Script::parse_ron(
            r#"Script(scenes: { "intro": Scene(mode: sync, events: ["GREET default=Yo"]) })"#,
        )
        .unwrap();
        let mut director = greet_director();
        let handle = director.dispatch_scene(&script, "intro").unwrap();
        let run = director.run(handle).unwrap();
        assert_eq!(run.mode(), SchedulingMode::Synchronized);
        assert_eq!(run.sequence()[0], EventRecord::new("text").with_default("Yo"));

        let err = director.dispatch_scene(&script, "missing").unwrap_err();
        assert!(matches!(err, DirectorError::SceneNotFound(name) if name == "missing"));
    }

    #[test]
    fn zero_stall_threshold_rejected() {
        let result = Director::builder().stall_warning_ticks(0).build();
        assert!(matches!(result, Err(DirectorError::InvalidStallThreshold)));
    }

    #[test]
    fn missing_macro_file_is_error() {
        let result = Director::builder()
            .macro_file("does/not/exist.ron")
            .build();
        assert!(matches!(result, Err(DirectorError::Macro(MacroError::Io(_)))));
    }

    #[test]
    fn run_handle_display() {
        assert_eq!(RunHandle(7).to_string(), "run#7");
    }
}
