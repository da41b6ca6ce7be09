/// Macro Linter — validates macro tables before they ship with a story.
///
/// Usage: macro_linter <macro_file_or_dir> [--strict]

use narrative_sequencer::core::macros::MacroTable;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: macro_linter <macro_file_or_dir> [--strict]");
        println!();
        println!("  --strict   treat warnings as errors");
        process::exit(0);
    }

    let macro_path = Path::new(&args[1]);
    let strict = args[2..].iter().any(|a| a == "--strict");

    let mut macros = MacroTable::new();
    if macro_path.is_file() {
        match MacroTable::load_from_ron(macro_path) {
            Ok(table) => macros.merge(table),
            Err(e) => {
                eprintln!("ERROR: Failed to load macro file: {}", e);
                process::exit(1);
            }
        }
    } else if macro_path.is_dir() {
        load_macros_recursive(macro_path, &mut macros);
    } else {
        eprintln!("ERROR: Path '{}' does not exist", macro_path.display());
        process::exit(1);
    }

    println!("Loaded {} macros", macros.len());

    let lint = macros.lint();

    println!("\n=== Macro Lint Report ===\n");

    if lint.is_clean() {
        println!("All checks passed!");
    }

    for warning in &lint.warnings {
        println!("WARNING: {}", warning);
    }

    for error in &lint.errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        lint.errors.len(),
        lint.warnings.len()
    );

    if !lint.errors.is_empty() || (strict && !lint.warnings.is_empty()) {
        process::exit(1);
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

fn load_macros_recursive(dir: &Path, macros: &mut MacroTable) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut paths: Vec<_> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            load_macros_recursive(&path, macros);
        } else if path.extension().and_then(|s| s.to_str()) == Some("ron") {
            match MacroTable::load_from_ron(&path) {
                Ok(table) => {
                    println!("  Loaded: {}", path.display());
                    macros.merge(table);
                }
                Err(e) => {
                    eprintln!("  ERROR loading {}: {}", path.display(), e);
                }
            }
        }
    }
}
