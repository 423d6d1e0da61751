/// Registry and index integration tests against the fixture corpus.

use event_search::core::entries::EntryIndex;
use event_search::core::indexer::{minimal, NodeIndex};
use event_search::core::loader::discover;
use event_search::core::registry::Registry;
use event_search::schema::outcome::{OutcomeRef, ShipOutcomeKind};
use std::path::Path;

const CORPUS: &str = "tests/fixtures/corpus";

fn registry() -> Registry {
    Registry::build(Path::new(CORPUS)).unwrap()
}

#[test]
fn discovery_filters_and_orders_files() {
    let files = discover(Path::new(CORPUS));
    let names: Vec<String> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "broken.xml.append",
            "events_core.xml",
            "z_base_greetings.xml",
            "events_localized.xml",
        ]
    );
}

#[test]
fn build_is_idempotent() {
    let first = registry();
    let second = registry();

    let mut a: Vec<&String> = first.events().keys().collect();
    let mut b: Vec<&String> = second.events().keys().collect();
    a.sort();
    b.sort();
    assert_eq!(a, b);

    for (name, def) in first.events() {
        assert_eq!(second.event(name), Some(def));
    }
    assert_eq!(first.event_lists(), second.event_lists());
    assert_eq!(first.text_lists(), second.text_lists());
    assert_eq!(first.ship_outcomes(), second.ship_outcomes());
    assert_eq!(first.event_ancestors(), second.event_ancestors());
}

#[test]
fn tables_cover_the_corpus() {
    let reg = registry();
    assert!(reg.event("A").is_some());
    assert!(reg.event("INNER_WRECK").is_some());
    assert!(reg.event("BROKEN_EVENT").is_none());
    assert_eq!(reg.event_list("LIST_MIXED").map(<[_]>::len), Some(3));
    assert_eq!(reg.ancestors("INNER_WRECK"), ["OUTER_WRECK".to_string()]);
    assert!(reg.ancestors("OUTER_WRECK").is_empty());

    let raider = reg.ship("PIRATE_RAIDER").unwrap();
    assert_eq!(
        raider.get(&ShipOutcomeKind::Surrender),
        Some(&OutcomeRef::Load("PIRATE_SURRENDER".into()))
    );
    assert!(matches!(raider.get(&ShipOutcomeKind::Escape), Some(OutcomeRef::Inline(_))));
    assert!(raider.get(&ShipOutcomeKind::GotAway).is_none());

    // recovered from the malformed file
    let ghost = reg.ship("GHOST_SHIP").unwrap();
    assert_eq!(
        ghost.get(&ShipOutcomeKind::Destroyed),
        Some(&OutcomeRef::Load("GHOST_WRECK".into()))
    );
}

#[test]
fn localized_file_overrides_base_definition() {
    let reg = registry();
    let def = reg.event("GREETING").unwrap();
    assert!(def.file.ends_with("lang_zh/events_localized.xml"));
}

#[test]
fn node_index_holds_every_occurrence() {
    let reg = registry();
    let index = NodeIndex::build(&reg);

    let greetings = index
        .iter()
        .filter(|n| n.name.as_deref() == Some("GREETING"))
        .count();
    assert_eq!(greetings, 2);

    let escape = index
        .iter()
        .find(|n| n.name.as_deref() == Some("PIRATE_RAIDER:escape"))
        .unwrap();
    assert!(escape.text.contains("spools its drive"));
    assert!(escape.ancestors.is_empty());

    let inner = index
        .iter()
        .find(|n| n.name.as_deref() == Some("INNER_WRECK"))
        .unwrap();
    let outer = index.get(inner.ancestors[0]).unwrap();
    assert_eq!(outer.name.as_deref(), Some("OUTER_WRECK"));
}

#[test]
fn minimal_match_prefers_the_inner_node() {
    let reg = registry();
    let index = NodeIndex::build(&reg);
    let hits = minimal(index.search("salvage the reactor"));
    let names: Vec<Option<&str>> = hits.iter().map(|n| n.name.as_deref()).collect();
    assert_eq!(names, vec![Some("INNER_WRECK")]);
}

#[test]
fn anonymous_nodes_report_their_named_parent() {
    let reg = registry();
    let index = NodeIndex::build(&reg);
    let hits = minimal(index.search("static hiss"));
    assert_eq!(hits.len(), 2);
    for hit in hits {
        assert!(hit.is_anonymous());
        assert_eq!(index.nearest_named_ancestor(hit), Some("HAIL_LINES"));
    }
}

#[test]
fn entries_include_loaded_and_fallback_text() {
    let reg = registry();
    let entries = EntryIndex::build(&reg, 16);
    assert_eq!(entries.get("A").unwrap().text, "foo bar go done");
    assert!(entries
        .get("SUPPLY_DEPOT")
        .unwrap()
        .text
        .contains("Inspectors board to check cargo."));

    let broken = entries.get("BROKEN_EVENT").unwrap();
    assert!(broken.file.ends_with("broken.xml.append"));
    assert!(broken.text.contains("derelict beacon"));
}
