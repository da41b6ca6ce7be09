/// Frame scheduler — steps one expanded sequence forward per frame.
///
/// A run executes its first record on the first tick no matter what, then
/// waits for a mode-specific readiness gate before each following record.

use crate::core::registry::{ActorSlot, ActorStateRegistry};
use crate::schema::mode::SchedulingMode;
use crate::schema::record::EventRecord;

/// Default number of gated frames before a run is reported as stalled
/// (ten seconds at 60 fps).
pub const DEFAULT_STALL_WARNING_TICKS: u32 = 600;

/// The host side of event playback: performs one primitive event.
pub trait EventExecutor {
    /// Run `record`'s effect (show a node, move it, print text, ...).
    ///
    /// Returns the slot of the actor whose behavior the event started, if
    /// any. Actor-gated runs bind to the first slot reported this way.
    fn execute(&mut self, record: &EventRecord) -> Option<ActorSlot>;
}

impl<F> EventExecutor for F
where
    F: FnMut(&EventRecord) -> Option<ActorSlot>,
{
    fn execute(&mut self, record: &EventRecord) -> Option<ActorSlot> {
        self(record)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    NotStarted,
    Running,
    Finished,
}

/// One-shot subscription to the actor a run waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorBinding {
    /// Sequential runs gate on the whole registry and never bind.
    Unsubscribed,
    /// Waiting for the first reported actor.
    Pending,
    Bound(ActorSlot),
}

impl ActorBinding {
    pub fn slot(&self) -> Option<ActorSlot> {
        match self {
            Self::Bound(slot) => Some(*slot),
            _ => None,
        }
    }
}

/// What a single [`RunState::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The readiness gate was closed; nothing executed.
    Waiting,
    /// One record executed and more remain.
    Advanced,
    /// The final record executed; the run is now finished.
    Completed,
    /// The run had already finished.
    Finished,
}

impl StepOutcome {
    pub fn executed(&self) -> bool {
        matches!(self, Self::Advanced | Self::Completed)
    }
}

/// Cursor over one dispatched sequence.
#[derive(Debug, Clone)]
pub struct RunState {
    sequence: Vec<EventRecord>,
    mode: SchedulingMode,
    cursor: usize,
    phase: RunPhase,
    binding: ActorBinding,
    idle_ticks: u32,
    stall_warning_ticks: u32,
}

impl RunState {
    pub fn new(sequence: Vec<EventRecord>, mode: SchedulingMode) -> Self {
        let phase = if sequence.is_empty() {
            RunPhase::Finished
        } else {
            RunPhase::NotStarted
        };
        let binding = if mode.is_actor_gated() {
            ActorBinding::Pending
        } else {
            ActorBinding::Unsubscribed
        };
        Self {
            sequence,
            mode,
            cursor: 0,
            phase,
            binding,
            idle_ticks: 0,
            stall_warning_ticks: DEFAULT_STALL_WARNING_TICKS,
        }
    }

    pub fn with_stall_warning_ticks(mut self, ticks: u32) -> Self {
        self.stall_warning_ticks = ticks;
        self
    }

    pub fn mode(&self) -> SchedulingMode {
        self.mode
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase == RunPhase::Finished
    }

    /// Index of the next record to execute.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn sequence(&self) -> &[EventRecord] {
        &self.sequence
    }

    pub fn next_record(&self) -> Option<&EventRecord> {
        if self.is_finished() {
            return None;
        }
        self.sequence.get(self.cursor)
    }

    pub fn binding(&self) -> ActorBinding {
        self.binding
    }

    pub fn bound_actor(&self) -> Option<ActorSlot> {
        self.binding.slot()
    }

    /// Consecutive gated ticks since the run last made progress.
    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }

    /// Fulfill the pending actor subscription. Returns `false` when the
    /// run is not waiting for a binding (sequential, or already bound).
    pub fn bind_actor(&mut self, slot: ActorSlot) -> bool {
        if self.binding != ActorBinding::Pending {
            return false;
        }
        tracing::debug!(slot = slot.0, mode = %self.mode, "run bound to actor");
        self.binding = ActorBinding::Bound(slot);
        true
    }

    /// Whether the gate for the next record is open.
    pub fn is_ready(&self, registry: &ActorStateRegistry) -> bool {
        match self.mode {
            SchedulingMode::Sequential => registry.all_idle(),
            SchedulingMode::Synchronized | SchedulingMode::DialogueGated => self
                .binding
                .slot()
                .is_some_and(|slot| registry.is_idle(slot)),
        }
    }

    /// Advance by at most one record.
    pub fn step<E>(&mut self, registry: &ActorStateRegistry, executor: &mut E) -> StepOutcome
    where
        E: EventExecutor + ?Sized,
    {
        match self.phase {
            RunPhase::Finished => return StepOutcome::Finished,
            RunPhase::NotStarted => self.phase = RunPhase::Running,
            RunPhase::Running => {
                if !self.is_ready(registry) {
                    self.note_idle_tick();
                    return StepOutcome::Waiting;
                }
            }
        }

        let record = &self.sequence[self.cursor];
        tracing::trace!(index = self.cursor, event = %record, "executing event");
        if let Some(slot) = executor.execute(record) {
            self.bind_actor(slot);
        }
        self.cursor += 1;
        self.idle_ticks = 0;

        if self.cursor == self.sequence.len() {
            self.phase = RunPhase::Finished;
            StepOutcome::Completed
        } else {
            StepOutcome::Advanced
        }
    }

    /// Stop the run where it is. Already executed events stay executed.
    pub fn cancel(&mut self) {
        self.phase = RunPhase::Finished;
    }

    fn note_idle_tick(&mut self) {
        self.idle_ticks = self.idle_ticks.saturating_add(1);
        if self.idle_ticks != self.stall_warning_ticks {
            return;
        }
        let next = self
            .sequence
            .get(self.cursor)
            .map(|r| r.name.as_str())
            .unwrap_or_default();
        match self.binding {
            ActorBinding::Pending => tracing::warn!(
                ticks = self.idle_ticks,
                mode = %self.mode,
                next_event = next,
                "run stalled: no actor was ever bound, it will not advance"
            ),
            ActorBinding::Bound(slot) => tracing::warn!(
                ticks = self.idle_ticks,
                mode = %self.mode,
                slot = slot.0,
                next_event = next,
                "run stalled waiting for bound actor to go idle"
            ),
            ActorBinding::Unsubscribed => tracing::warn!(
                ticks = self.idle_ticks,
                next_event = next,
                "run stalled waiting for every actor to go idle"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse;
    use crate::core::registry::IDLE_STATE;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    fn records(tokens: &[&str]) -> Vec<EventRecord> {
        tokens.iter().filter_map(|t| parse(t)).collect()
    }

    #[test]
    fn single_event_sequential_run() {
        let registry = ActorStateRegistry::new();
        let mut run = RunState::new(records(&["SHOW fg=0"]), SchedulingMode::Sequential);
        let mut executed = Vec::new();
        let mut exec = |r: &EventRecord| -> Option<ActorSlot> {
            executed.push(r.clone());
            None
        };

        assert_eq!(run.phase(), RunPhase::NotStarted);
        assert_eq!(run.step(&registry, &mut exec), StepOutcome::Completed);
        assert!(run.is_finished());
        assert_eq!(run.step(&registry, &mut exec), StepOutcome::Finished);
        assert_eq!(
            executed,
            vec![EventRecord::new("SHOW").with_field("fg", "0")]
        );
    }

    #[test]
    fn first_step_ignores_gate() {
        let mut registry = ActorStateRegistry::new();
        let slot = registry.allocate_slot();
        registry.report(slot, "moving");

        let mut run = RunState::new(records(&["A", "B"]), SchedulingMode::Sequential);
        let mut exec = |_: &EventRecord| -> Option<ActorSlot> { None };
        assert_eq!(run.step(&registry, &mut exec), StepOutcome::Advanced);
        assert_eq!(run.cursor(), 1);
    }

    #[test]
    fn sequential_waits_for_every_actor() {
        let mut registry = ActorStateRegistry::new();
        let a = registry.allocate_slot();
        let b = registry.allocate_slot();
        let mut run = RunState::new(records(&["A", "B"]), SchedulingMode::Sequential);
        let mut exec = |_: &EventRecord| -> Option<ActorSlot> { None };

        run.step(&registry, &mut exec);
        registry.report(a, "moving");
        registry.report(b, "talking");
        for _ in 0..5 {
            assert_eq!(run.step(&registry, &mut exec), StepOutcome::Waiting);
            assert_eq!(run.cursor(), 1);
        }

        registry.report(a, IDLE_STATE);
        assert_eq!(run.step(&registry, &mut exec), StepOutcome::Waiting);

        registry.report(b, IDLE_STATE);
        assert_eq!(run.step(&registry, &mut exec), StepOutcome::Completed);
    }

    #[test]
    fn synchronized_advances_on_tick_after_idle() {
        let mut registry = ActorStateRegistry::new();
        let actor = registry.allocate_slot();
        let mut run = RunState::new(
            records(&["MOVE fg=0", "text done"]),
            SchedulingMode::Synchronized,
        );

        let mut log: Vec<(u32, String)> = Vec::new();
        for tick in 1..=4u32 {
            // Host frame: the actor updates before the sequencer.
            match tick {
                2 => registry.report(actor, "moving"),
                3 => registry.report(actor, IDLE_STATE),
                _ => {}
            }
            let mut exec = |r: &EventRecord| -> Option<ActorSlot> {
                log.push((tick, r.name.clone()));
                if r.name == "MOVE" {
                    Some(actor)
                } else {
                    None
                }
            };
            run.step(&registry, &mut exec);
            if tick == 1 {
                registry.report(actor, "moving");
            }
        }

        assert_eq!(
            log,
            vec![(1, "MOVE".to_string()), (3, "text".to_string())]
        );
        assert!(run.is_finished());
        assert_eq!(run.bound_actor(), Some(actor));
    }

    #[test]
    fn synchronized_ignores_other_actors() {
        let mut registry = ActorStateRegistry::new();
        let bound = registry.allocate_slot();
        let other = registry.allocate_slot();
        registry.report(other, "moving");

        let mut run = RunState::new(records(&["A", "B"]), SchedulingMode::DialogueGated);
        let mut exec = |_: &EventRecord| -> Option<ActorSlot> { Some(bound) };
        run.step(&registry, &mut exec);
        assert_eq!(run.step(&registry, &mut exec), StepOutcome::Completed);
    }

    #[test]
    fn unbound_actor_gated_run_stalls() {
        let registry = ActorStateRegistry::new();
        let mut run = RunState::new(records(&["A", "B"]), SchedulingMode::Synchronized)
            .with_stall_warning_ticks(3);
        let mut exec = |_: &EventRecord| -> Option<ActorSlot> { None };

        run.step(&registry, &mut exec);
        for expected in 1..=10 {
            assert_eq!(run.step(&registry, &mut exec), StepOutcome::Waiting);
            assert_eq!(run.idle_ticks(), expected);
        }
        assert_eq!(run.binding(), ActorBinding::Pending);
        assert_eq!(run.phase(), RunPhase::Running);
    }

    #[derive(Clone, Default)]
    struct WarnCounter(Arc<AtomicUsize>);

    impl WarnCounter {
        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn stall_warning_once_per_episode() {
        let warnings = WarnCounter::default();
        let subscriber = tracing_subscriber::registry().with(warnings.clone());

        tracing::subscriber::with_default(subscriber, || {
            let mut registry = ActorStateRegistry::new();
            let actor = registry.allocate_slot();
            let mut run = RunState::new(records(&["A", "B", "C"]), SchedulingMode::Synchronized)
                .with_stall_warning_ticks(3);
            let mut exec = |_: &EventRecord| -> Option<ActorSlot> { Some(actor) };

            run.step(&registry, &mut exec);
            registry.report(actor, "moving");

            for _ in 0..2 {
                run.step(&registry, &mut exec);
            }
            assert_eq!(warnings.count(), 0);
            run.step(&registry, &mut exec);
            assert_eq!(warnings.count(), 1);

            for _ in 0..3 {
                assert_eq!(run.step(&registry, &mut exec), StepOutcome::Waiting);
            }
            assert_eq!(run.idle_ticks(), 6);
            assert_eq!(warnings.count(), 1);

            registry.report(actor, IDLE_STATE);
            assert_eq!(run.step(&registry, &mut exec), StepOutcome::Advanced);
            assert_eq!(run.idle_ticks(), 0);

            registry.report(actor, "moving");
            for _ in 0..3 {
                run.step(&registry, &mut exec);
            }
            assert_eq!(warnings.count(), 2);
        });
    }

    #[test]
    fn binding_is_one_shot() {
        let mut run = RunState::new(records(&["A", "B", "C"]), SchedulingMode::Synchronized);
        assert!(run.bind_actor(ActorSlot(2)));
        assert!(!run.bind_actor(ActorSlot(5)));
        assert_eq!(run.bound_actor(), Some(ActorSlot(2)));
    }

    #[test]
    fn later_reports_do_not_rebind() {
        let mut registry = ActorStateRegistry::new();
        let first = registry.allocate_slot();
        let second = registry.allocate_slot();
        let mut run = RunState::new(records(&["A", "B", "C"]), SchedulingMode::Synchronized);
        let mut next = vec![second, first];
        let mut exec = |_: &EventRecord| -> Option<ActorSlot> { next.pop() };

        run.step(&registry, &mut exec);
        run.step(&registry, &mut exec);
        assert_eq!(run.bound_actor(), Some(first));
    }

    #[test]
    fn sequential_never_binds() {
        let mut run = RunState::new(records(&["A"]), SchedulingMode::Sequential);
        assert_eq!(run.binding(), ActorBinding::Unsubscribed);
        assert!(!run.bind_actor(ActorSlot(0)));
    }

    #[test]
    fn idle_counter_resets_on_progress() {
        let mut registry = ActorStateRegistry::new();
        let slot = registry.allocate_slot();
        let mut run = RunState::new(records(&["A", "B", "C"]), SchedulingMode::Sequential);
        let mut exec = |_: &EventRecord| -> Option<ActorSlot> { None };

        run.step(&registry, &mut exec);
        registry.report(slot, "busy");
        run.step(&registry, &mut exec);
        run.step(&registry, &mut exec);
        assert_eq!(run.idle_ticks(), 2);

        registry.report(slot, IDLE_STATE);
        assert_eq!(run.step(&registry, &mut exec), StepOutcome::Advanced);
        assert_eq!(run.idle_ticks(), 0);
    }

    #[test]
    fn empty_run_is_finished() {
        let registry = ActorStateRegistry::new();
        let mut run = RunState::new(Vec::new(), SchedulingMode::Sequential);
        let mut exec = |_: &EventRecord| -> Option<ActorSlot> { panic!("nothing to run") };
        assert!(run.is_finished());
        assert_eq!(run.step(&registry, &mut exec), StepOutcome::Finished);
    }

    #[test]
    fn cancel_stops_playback() {
        let registry = ActorStateRegistry::new();
        let mut run = RunState::new(records(&["A", "B"]), SchedulingMode::Sequential);
        let mut count = 0;
        let mut exec = |_: &EventRecord| -> Option<ActorSlot> {
            count += 1;
            None
        };
        run.step(&registry, &mut exec);
        run.cancel();
        run.cancel();
        assert_eq!(run.step(&registry, &mut exec), StepOutcome::Finished);
        assert!(run.next_record().is_none());
        assert_eq!(count, 1);
    }

    #[test]
    fn struct_executor() {
        struct Counter(usize);
        impl EventExecutor for Counter {
            fn execute(&mut self, _record: &EventRecord) -> Option<ActorSlot> {
                self.0 += 1;
                None
            }
        }

        let registry = ActorStateRegistry::new();
        let mut run = RunState::new(records(&["A", "B", "C"]), SchedulingMode::Sequential);
        let mut counter = Counter(0);
        while run.step(&registry, &mut counter) != StepOutcome::Completed {}
        assert_eq!(counter.0, 3);
    }
}
