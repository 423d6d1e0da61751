/// Event Search: one-shot query against an event markup corpus.
///
/// Usage: event_search [options] <query...>
///
/// Prints the rendered result, or the structured result as JSON with --json.
/// Exits 1 when nothing matched and 2 on a configuration or corpus error.

use event_search::core::config::SearchConfig;
use event_search::core::query::{SearchMode, SearchOutcome};
use std::io::Write;
use std::path::PathBuf;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut data_dir: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut mode: Option<String> = None;
    let mut max_depth: Option<usize> = None;
    let mut only_outcomes = false;
    let mut json = false;
    let mut quiet = false;
    let mut query_parts: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--data" if i + 1 < args.len() => {
                i += 1;
                data_dir = Some(PathBuf::from(&args[i]));
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(PathBuf::from(&args[i]));
            }
            "--mode" if i + 1 < args.len() => {
                i += 1;
                mode = Some(args[i].clone());
            }
            "--max-depth" if i + 1 < args.len() => {
                i += 1;
                match args[i].parse() {
                    Ok(n) => max_depth = Some(n),
                    Err(_) => {
                        eprintln!("ERROR: --max-depth expects a number, got '{}'", args[i]);
                        process::exit(2);
                    }
                }
            }
            "--only-outcomes" => only_outcomes = true,
            "--json" => json = true,
            "--quiet" | "-q" => quiet = true,
            "--" => {
                query_parts.extend(args[i + 1..].iter().cloned());
                break;
            }
            arg if arg.starts_with("--") => {
                eprintln!("Unknown argument: {}", arg);
                print_usage();
                process::exit(2);
            }
            _ => query_parts.push(args[i].clone()),
        }
        i += 1;
    }

    init_logging(quiet);

    let mut config = match config_path {
        Some(ref path) => match SearchConfig::load_from_ron(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("ERROR: Failed to load config {}: {}", path.display(), e);
                process::exit(2);
            }
        },
        None => SearchConfig::default(),
    };
    config.apply_env();
    if let Some(dir) = data_dir {
        config.data_dir = Some(dir);
    }
    if let Some(ref m) = mode {
        match m.parse::<SearchMode>() {
            Ok(m) => config.mode = m,
            Err(e) => {
                eprintln!("ERROR: {}", e);
                process::exit(2);
            }
        }
    }
    if let Some(depth) = max_depth {
        config.max_depth = depth;
    }
    if only_outcomes {
        config.only_outcomes = true;
    }

    let root = config.locate_data_dir();
    let engine = config.engine();
    let query = query_parts.join(" ");

    let outcome = match engine.search(&query, &root, &config.search_options()) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(2);
        }
    };

    if json {
        match serde_json::to_string_pretty(&outcome) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("ERROR: Failed to serialize result: {}", e);
                process::exit(2);
            }
        }
    } else {
        println!("{}", outcome);
    }
    std::io::stdout().flush().ok();

    if matches!(outcome, SearchOutcome::NotFound | SearchOutcome::EmptyQuery) {
        process::exit(1);
    }
}

fn init_logging(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .target(env_logger::Target::Stderr)
        .init();
}

fn print_usage() {
    println!("Event Search: query an event markup corpus.");
    println!();
    println!("Usage: event_search [options] <query...>");
    println!();
    println!("  --data <dir>        Corpus root (default: FTL_DATA_DIR or nearest data/)");
    println!("  --config <path>     RON configuration file");
    println!("  --mode <mode>       auto, text or id (default: auto)");
    println!("  --max-depth <n>     Expansion depth bound (default: 16)");
    println!("  --only-outcomes     Show only lines from the first combat outcome on");
    println!("  --json              Print the structured result as JSON");
    println!("  --quiet, -q         Only log warnings and errors");
}
