/// Opening Scene demo — plays a short scripted scene against a console stage.
///
/// Two characters walk on, trade a line of dialogue, and the curtain
/// falls. Moves take a few frames; the sequencer waits for them.
///
/// Run with: cargo run --example opening_scene

use narrative_sequencer::core::director::Director;
use narrative_sequencer::core::macros::MacroTable;
use narrative_sequencer::core::registry::{ActorSlot, ActorStateRegistry, IDLE_STATE};
use narrative_sequencer::schema::record::EventRecord;
use narrative_sequencer::schema::script::Script;
use std::collections::HashMap;
use tracing_subscriber::EnvFilter;

const MACROS: &str = r#"{
    "ENTER": Define(
        params: ["$who", "$x"],
        body: [
            Literal("SHOW fg=$who"),
            Literal("MOVE fg=$who x=$x #entrance"),
        ],
    ),
    "LINE": Define(
        params: ["$who", "$text"],
        body: [
            Literal("face fg=$who"),
            Literal("text $text"),
        ],
    ),
    "CURTAIN": Define(
        body: [
            Literal("LOG curtain"),
            Literal("HIDE fg=stage"),
        ],
    ),
}"#;

const SCRIPT: &str = r#"Script(
    scenes: {
        "opening": Scene(
            mode: seque,
            events: [
                "ENTER who=maya x=-80",
                "ENTER who=tom x=80",
                "LINE who=maya text=Late_again?",
                "LINE who=tom text=Traffic.",
                "CURTAIN",
            ],
        ),
    },
)"#;

/// Frames a `MOVE` keeps its actor busy.
const MOVE_FRAMES: u32 = 4;

fn main() {
    init_tracing();

    let macros = MacroTable::parse_ron(MACROS).expect("Failed to parse demo macros");
    let script = Script::parse_ron(SCRIPT).expect("Failed to parse demo script");

    let mut director = Director::builder()
        .with_macros(macros)
        .build()
        .expect("Failed to build director");

    let mut registry = ActorStateRegistry::new();
    let mut actors: HashMap<String, ActorSlot> = HashMap::new();
    for name in ["maya", "tom"] {
        actors.insert(name.to_string(), registry.allocate_slot());
    }
    let mut busy: HashMap<ActorSlot, u32> = HashMap::new();

    let handle = director
        .dispatch_scene(&script, "opening")
        .expect("Scene missing");
    println!("=== Opening Scene ({}) ===\n", handle);

    let mut frame = 0u32;
    while director.is_active(handle) {
        frame += 1;

        // Actors update first and report their state last.
        for (slot, remaining) in busy.iter_mut() {
            *remaining = remaining.saturating_sub(1);
            let state = if *remaining == 0 { IDLE_STATE } else { "walking" };
            registry.report(*slot, state);
        }
        busy.retain(|_, remaining| *remaining > 0);

        let mut started = Vec::new();
        director.tick(&registry, &mut |record: &EventRecord| -> Option<ActorSlot> {
            println!("frame {:>3}: {}", frame, describe(record));
            let slot = *actors.get(record.field("fg")?)?;
            if record.name == "MOVE" {
                started.push(slot);
            }
            Some(slot)
        });
        for slot in started {
            busy.insert(slot, MOVE_FRAMES);
            registry.report(slot, "walking");
        }
    }

    println!("\n=== Scene finished after {} frames ===", frame);
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

fn describe(record: &EventRecord) -> String {
    match record.name.as_str() {
        "SHOW" => format!("{} appears", record.field("fg").unwrap_or("?")),
        "MOVE" => format!(
            "{} walks to x={}",
            record.field("fg").unwrap_or("?"),
            record.field("x").unwrap_or("0")
        ),
        "face" => format!("{} turns to speak", record.field("fg").unwrap_or("?")),
        "text" => format!(
            "\"{}\"",
            record.default.as_deref().unwrap_or("").replace('_', " ")
        ),
        _ => record.to_string(),
    }
}
