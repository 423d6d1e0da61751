/// Corpus Linter: reports load references that resolve to nothing and
/// events that load themselves.
///
/// Usage: corpus_linter <data_dir> [--quiet]

use event_search::core::expand::COMBAT_CHECK;
use event_search::core::registry::Registry;
use event_search::schema::markup::{tags, Element};
use event_search::schema::outcome::OutcomeRef;
use std::collections::BTreeSet;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: corpus_linter <data_dir> [--quiet]");
        process::exit(0);
    }

    let data_dir = Path::new(&args[1]);
    let quiet = args[2..].iter().any(|a| a == "--quiet" || a == "-q");

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if quiet { "warn" } else { "info" }),
    )
    .target(env_logger::Target::Stderr)
    .init();

    let registry = match Registry::build(data_dir) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };

    let unparsed: Vec<_> = registry.files().iter().filter(|f| !f.is_parsed()).collect();
    println!(
        "Loaded {} files ({} via fallback scan)",
        registry.files().len(),
        unparsed.len()
    );
    println!(
        "  {} events, {} event lists, {} text lists, {} ships",
        registry.events().len(),
        registry.event_lists().len(),
        registry.text_lists().len(),
        registry.ship_outcomes().len()
    );

    let (errors, warnings) = lint_corpus(&registry);

    println!("\n=== Corpus Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for file in &unparsed {
        println!("WARNING: {} could not be parsed; only its text is searchable", file.path.display());
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len() + unparsed.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

/// A reference found in markup: what kind of table it should resolve in.
enum Target<'a> {
    EventOrList(&'a str),
    List(&'a str),
    TextList(&'a str),
    Ship(&'a str),
}

fn references(el: &Element) -> Option<Target<'_>> {
    if el.is(tags::TEXT) {
        return el.load().map(Target::TextList);
    }
    if el.is(tags::SHIP) {
        return el.load().map(Target::Ship);
    }
    if let Some(name) = el.load() {
        return Some(Target::EventOrList(name));
    }
    let text = el.text.trim();
    if text.is_empty() {
        return None;
    }
    if el.is(tags::LOAD_EVENT) {
        Some(Target::EventOrList(text))
    } else if el.is(tags::LOAD_EVENT_LIST) {
        Some(Target::List(text))
    } else {
        None
    }
}

fn lint_corpus(registry: &Registry) -> (Vec<String>, Vec<String>) {
    let mut errors = BTreeSet::new();
    let mut warnings = BTreeSet::new();
    let root = registry.corpus_root();

    for file in registry.files() {
        let Some(tree) = file.tree() else { continue };
        let rel = file.path.strip_prefix(root).unwrap_or(&file.path);

        for el in tree.iter() {
            let Some(target) = references(el) else { continue };
            let missing = match target {
                Target::EventOrList(name) => {
                    name != COMBAT_CHECK
                        && registry.event(name).is_none()
                        && registry.event_list(name).is_none()
                }
                Target::List(name) => registry.event_list(name).is_none(),
                Target::TextList(name) => registry.text_list(name).is_none(),
                Target::Ship(name) => registry.ship(name).is_none(),
            };
            if missing {
                let name = match target {
                    Target::EventOrList(n) | Target::List(n) | Target::TextList(n) | Target::Ship(n) => n,
                };
                errors.insert(format!(
                    "{}: <{}> references unknown '{}'",
                    rel.display(),
                    el.tag,
                    name
                ));
            }
        }
    }

    for (ship, outcomes) in registry.ship_outcomes() {
        for (kind, outcome) in outcomes {
            if let OutcomeRef::Load(target) = outcome {
                if registry.event(target).is_none() && registry.event_list(target).is_none() {
                    errors.insert(format!(
                        "ship '{}': {} loads unknown '{}'",
                        ship,
                        kind.tag(),
                        target
                    ));
                }
            }
        }
    }

    for (name, def) in registry.events() {
        let loads_itself = def
            .element
            .descendants()
            .any(|el| el.load() == Some(name.as_str()) && !el.is(tags::TEXT) && !el.is(tags::SHIP));
        if loads_itself {
            warnings.insert(format!("event '{}' loads itself", name));
        }
    }

    (errors.into_iter().collect(), warnings.into_iter().collect())
}
