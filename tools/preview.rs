/// Preview — interactive playback shell for testing macros and scenes.
///
/// Usage: preview [--macros <path>] [--script <path>] [--seed <n>] [--max-busy <frames>]
///
/// Commands:
///   actor <name>                  — place a named actor on the simulated stage
///   actors                        — list actors and their states
///   run <mode> <event; event; …>  — dispatch events (mode: seque, sync, dialog)
///   scene <name>                  — dispatch a scene from the loaded script
///   expand <event; event; …>      — show the expanded records without playing
///   step [n]                      — advance n frames (default 1)
///   play                          — advance until every run has finished
///   cancel <id>                   — cancel a run
///   seed <n>                      — reseed actor busy durations
///   help                          — list commands
///   quit                          — exit

use narrative_sequencer::core::director::{Director, RunHandle};
use narrative_sequencer::core::macros::MacroTable;
use narrative_sequencer::core::registry::{ActorSlot, ActorStateRegistry, IDLE_STATE};
use narrative_sequencer::schema::mode::SchedulingMode;
use narrative_sequencer::schema::record::{EventInput, EventRecord};
use narrative_sequencer::schema::script::Script;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Frames `play` will run before giving up on stalled runs.
const PLAY_FRAME_LIMIT: u32 = 10_000;

/// A stage stand-in: every event that names an actor through `fg=` keeps
/// that actor busy for a random number of frames.
struct SimulatedStage {
    registry: ActorStateRegistry,
    actors: HashMap<String, ActorSlot>,
    busy: HashMap<ActorSlot, u32>,
    rng: StdRng,
    max_busy: u32,
    frame: u64,
}

impl SimulatedStage {
    fn new(seed: u64, max_busy: u32) -> Self {
        Self {
            registry: ActorStateRegistry::new(),
            actors: HashMap::new(),
            busy: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
            max_busy: max_busy.max(1),
            frame: 0,
        }
    }

    fn actor(&mut self, name: &str) -> ActorSlot {
        if let Some(slot) = self.actors.get(name) {
            return *slot;
        }
        let slot = self.registry.allocate_slot();
        self.actors.insert(name.to_string(), slot);
        slot
    }

    /// Per-frame actor update. Each actor reports as its final step.
    fn update_actors(&mut self) {
        self.frame += 1;
        let mut slots: Vec<ActorSlot> = self.busy.keys().copied().collect();
        slots.sort();
        for slot in slots {
            let remaining = self.busy[&slot].saturating_sub(1);
            if remaining == 0 {
                self.busy.remove(&slot);
                self.registry.report(slot, IDLE_STATE);
            } else {
                self.busy.insert(slot, remaining);
                self.registry.report(slot, "acting");
            }
        }
    }

    fn execute(&mut self, handle: RunHandle, record: &EventRecord) -> Option<ActorSlot> {
        println!("  [frame {:>4}] {} {}", self.frame, handle, record);
        let who = record.field("fg")?.to_string();
        let slot = self.actor(&who);
        let frames = self.rng.gen_range(1..=self.max_busy);
        self.busy.insert(slot, frames);
        Some(slot)
    }

    /// Run one host frame: actors first, then the director.
    fn frame(&mut self, director: &mut Director) {
        self.update_actors();

        let mut started: Vec<ActorSlot> = Vec::new();
        let registry = self.registry.clone();
        let report = director.tick_each(&registry, |handle, record| {
            let slot = self.execute(handle, record);
            started.extend(slot);
            slot
        });
        for slot in started {
            if self.busy.contains_key(&slot) {
                self.registry.report(slot, "acting");
            }
        }
        for handle in report.completed {
            println!("  {} finished", handle);
        }
    }
}

fn main() {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();

    let mut macros_path = None;
    let mut script_path = None;
    let mut seed: u64 = 42;
    let mut max_busy: u32 = 3;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--macros" if i + 1 < args.len() => {
                i += 1;
                macros_path = Some(args[i].clone());
            }
            "--script" if i + 1 < args.len() => {
                i += 1;
                script_path = Some(args[i].clone());
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(42);
            }
            "--max-busy" if i + 1 < args.len() => {
                i += 1;
                max_busy = args[i].parse().unwrap_or(3);
            }
            "--help" | "-h" => {
                print_usage();
                return;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let mut builder = Director::builder();
    if let Some(ref path) = macros_path {
        if Path::new(path).is_dir() {
            builder = builder.macros_dir(path);
        } else {
            builder = builder.macro_file(path);
        }
    }
    let mut director = match builder.build() {
        Ok(d) => d,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    let script = match script_path {
        Some(ref path) => match Script::load_from_ron(Path::new(path)) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("ERROR loading script '{}': {}", path, e);
                std::process::exit(1);
            }
        },
        None => Script::default(),
    };

    println!("Loaded {} macros, {} scenes", director.macros().len(), script.scenes.len());
    println!("Seed: {}", seed);
    println!("Type 'help' for commands.\n");

    let mut stage = SimulatedStage::new(seed, max_busy);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("preview> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match cmd.to_lowercase().as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_help(),
            "actor" => {
                if rest.is_empty() {
                    println!("Usage: actor <name>");
                    continue;
                }
                let slot = stage.actor(rest);
                println!("Actor '{}' in slot {}", rest, slot.0);
            }
            "actors" => {
                let mut names: Vec<(&String, &ActorSlot)> = stage.actors.iter().collect();
                names.sort_by_key(|(_, slot)| **slot);
                for (name, slot) in names {
                    let state = stage.registry.read(*slot).unwrap_or("-");
                    println!("  {:>3} {:<12} {}", slot.0, name, state);
                }
            }
            "run" => {
                let (mode, events) = rest.split_once(' ').unwrap_or((rest, ""));
                let mode: SchedulingMode = match mode.parse() {
                    Ok(m) => m,
                    Err(e) => {
                        println!("{}", e);
                        continue;
                    }
                };
                let handle = director.dispatch(split_events(events), mode);
                report_dispatch(&director, handle);
            }
            "scene" => match director.dispatch_scene(&script, rest) {
                Ok(handle) => report_dispatch(&director, handle),
                Err(e) => println!("ERROR: {}", e),
            },
            "expand" => {
                let inputs: Vec<EventInput> =
                    split_events(rest).into_iter().map(EventInput::from).collect();
                print_expansion(director.macros(), &inputs);
            }
            "step" => {
                let frames: u32 = rest.parse().unwrap_or(1);
                for _ in 0..frames {
                    stage.frame(&mut director);
                }
            }
            "play" => {
                let mut frames = 0;
                while director.active_runs() > 0 && frames < PLAY_FRAME_LIMIT {
                    stage.frame(&mut director);
                    frames += 1;
                }
                if director.active_runs() > 0 {
                    println!(
                        "Stopped after {} frames; {} run(s) still waiting",
                        frames,
                        director.active_runs()
                    );
                } else {
                    println!("All runs finished after {} frames", frames);
                }
            }
            "cancel" => match rest.trim_start_matches("run#").parse::<u64>() {
                Ok(id) => {
                    if director.cancel(RunHandle(id)) {
                        println!("Cancelled run#{}", id);
                    } else {
                        println!("run#{} is not active", id);
                    }
                }
                Err(_) => println!("Usage: cancel <id>"),
            },
            "seed" => match rest.parse::<u64>() {
                Ok(n) => {
                    stage.rng = StdRng::seed_from_u64(n);
                    println!("Seed set to {}", n);
                }
                Err(_) => println!("Usage: seed <n>"),
            },
            other => {
                println!("Unknown command '{}'. Type 'help' for commands.", other);
            }
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

fn split_events(text: &str) -> Vec<String> {
    text.split(';').map(|e| e.trim().to_string()).collect()
}

fn report_dispatch(director: &Director, handle: RunHandle) {
    match director.run(handle) {
        Some(run) => println!(
            "Dispatched {} ({} events, mode {})",
            handle,
            run.len(),
            run.mode()
        ),
        None => println!("{} expanded to nothing", handle),
    }
}

fn print_expansion(macros: &MacroTable, inputs: &[EventInput]) {
    let records = macros.expand(inputs);
    println!("\n--- Expansion ({} records) ---", records.len());
    for (i, record) in records.iter().enumerate() {
        println!("  {:>3}: {}", i, record);
        if !record.defines.is_empty() {
            println!("       defines: {}", record.defines_joined());
        }
    }
    println!("--- End ---\n");
}

fn print_usage() {
    println!("Usage: preview [--macros <path>] [--script <path>] [--seed <n>] [--max-busy <frames>]");
}

fn print_help() {
    println!("Commands:");
    println!("  actor <name>                  place a named actor on the stage");
    println!("  actors                        list actors and their states");
    println!("  run <mode> <event; event; …>  dispatch events (seque, sync, dialog)");
    println!("  scene <name>                  dispatch a scene from the loaded script");
    println!("  expand <event; event; …>      show expanded records");
    println!("  step [n]                      advance n frames");
    println!("  play                          advance until every run finishes");
    println!("  cancel <id>                   cancel a run");
    println!("  seed <n>                      reseed actor busy durations");
    println!("  help                          this list");
    println!("  quit                          exit");
}
