/// Search Shell: interactive query loop over an event markup corpus.
///
/// Usage: search_shell [--data <dir>] [--config <path>]
///
/// Any line not starting with ':' is a query. Commands:
///   :mode <auto|text|id>    set search mode
///   :depth <n>              set expansion depth bound
///   :outcomes <on|off>      toggle the combat outcome filter
///   :stats                  corpus and cache statistics
///   :reload                 drop cached indices and rebuild on next query
///   :help                   list commands
///   :quit                   exit

use event_search::core::config::SearchConfig;
use event_search::core::query::SearchMode;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut data_dir: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage();
                return;
            }
            "--data" if i + 1 < args.len() => {
                i += 1;
                data_dir = Some(PathBuf::from(&args[i]));
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(PathBuf::from(&args[i]));
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let mut config = match config_path {
        Some(ref path) => match SearchConfig::load_from_ron(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("ERROR: Failed to load config {}: {}", path.display(), e);
                process::exit(1);
            }
        },
        None => SearchConfig::default(),
    };
    config.apply_env();
    if let Some(dir) = data_dir {
        config.data_dir = Some(dir);
    }

    let root = config.locate_data_dir();
    if !root.is_dir() {
        eprintln!("ERROR: corpus directory not found: {}", root.display());
        process::exit(1);
    }

    let engine = config.engine();
    let mut options = config.search_options();

    // Build up front so the first query answers immediately.
    match engine.cache().get_or_build(&root) {
        Ok(lookup) => println!(
            "Indexed {} events from {} ({:.2}s)",
            lookup.value.events().len(),
            root.display(),
            lookup.elapsed.as_secs_f64()
        ),
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    }
    println!("Type a search string, or ':help' for commands.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("search [{}]> ", options.mode);
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix(':') {
            let parts: Vec<&str> = command.split_whitespace().collect();
            let Some(cmd) = parts.first() else {
                continue;
            };
            match cmd.to_lowercase().as_str() {
                "quit" | "exit" | "q" => break,
                "help" | "h" | "?" => print_help(),
                "mode" => match parts.get(1).map(|m| m.parse::<SearchMode>()) {
                    Some(Ok(mode)) => {
                        options.mode = mode;
                        println!("mode: {}", mode);
                    }
                    Some(Err(e)) => println!("{}", e),
                    None => println!("Usage: :mode <auto|text|id>"),
                },
                "depth" => match parts.get(1).and_then(|d| d.parse::<usize>().ok()) {
                    Some(depth) => {
                        options.max_depth = depth;
                        println!("max depth: {}", depth);
                    }
                    None => println!("Usage: :depth <n>"),
                },
                "outcomes" => match parts.get(1).copied() {
                    Some("on") => options.only_outcomes = true,
                    Some("off") => options.only_outcomes = false,
                    _ => println!("Usage: :outcomes <on|off>"),
                },
                "stats" => print_stats(&engine, &root, options.max_depth),
                "reload" => {
                    engine.cache().invalidate(&root);
                    println!("cache cleared; the next query rebuilds the indices");
                }
                other => println!("Unknown command: :{} (try :help)", other),
            }
            continue;
        }

        match engine.search(line, &root, &options) {
            Ok(outcome) => println!("{}\n", outcome),
            Err(e) => println!("ERROR: {}\n", e),
        }
    }
}

fn print_stats(engine: &event_search::core::query::SearchEngine, root: &std::path::Path, max_depth: usize) {
    let registry = match engine.cache().get_or_build(root) {
        Ok(lookup) => lookup.value,
        Err(e) => {
            println!("ERROR: {}", e);
            return;
        }
    };
    let nodes = engine.cache().nodes_for(root, &registry).value;
    let entries = engine.cache().entries_for(root, &registry, max_depth).value;
    let fallback = registry.files().iter().filter(|f| !f.is_parsed()).count();

    println!("files:        {} ({} via fallback scan)", registry.files().len(), fallback);
    println!("events:       {}", registry.events().len());
    println!("event lists:  {}", registry.event_lists().len());
    println!("text lists:   {}", registry.text_lists().len());
    println!("ships:        {}", registry.ship_outcomes().len());
    println!("event nodes:  {}", nodes.len());
    println!("entries:      {} (depth {})", entries.len(), entries.max_depth());
    println!("cache:        {}", if engine.cache().is_enabled() { "on" } else { "off" });
    println!();
}

fn print_usage() {
    println!("Search Shell: interactive event search.");
    println!();
    println!("Usage: search_shell [--data <dir>] [--config <path>]");
    println!();
    println!("  --data <dir>     Corpus root (default: FTL_DATA_DIR or nearest data/)");
    println!("  --config <path>  RON configuration file");
}

fn print_help() {
    println!("Commands:");
    println!("  <text>                Search for text or an event id");
    println!("  :mode <auto|text|id>  Set search mode");
    println!("  :depth <n>            Set expansion depth bound");
    println!("  :outcomes <on|off>    Only show lines from the first combat outcome on");
    println!("  :stats                Corpus and cache statistics");
    println!("  :reload               Rebuild indices on the next query");
    println!("  :help                 Show this help");
    println!("  :quit                 Exit");
    println!();
}
