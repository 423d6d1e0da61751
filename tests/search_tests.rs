/// Search integration tests: queries against the fixture corpus, end to end.

use event_search::core::cache::IndexCache;
use event_search::core::query::{SearchEngine, SearchError, SearchMode, SearchOptions, SearchOutcome};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;

const CORPUS: &str = "tests/fixtures/corpus";

fn engine() -> SearchEngine {
    SearchEngine::new(Arc::new(IndexCache::new()))
}

fn options(mode: SearchMode) -> SearchOptions {
    SearchOptions {
        mode,
        ..SearchOptions::default()
    }
}

fn search(query: &str, mode: SearchMode) -> SearchOutcome {
    engine()
        .search(query, Path::new(CORPUS), &options(mode))
        .unwrap()
}

/// Name and rendered lines of an `Expand` outcome.
fn expanded(outcome: SearchOutcome) -> (String, Vec<String>) {
    match outcome {
        SearchOutcome::Expand { name, text } => (name, text.lines().map(str::to_string).collect()),
        other => panic!("expected an expansion, got {other:?}"),
    }
}

#[test]
fn text_query_expands_the_single_match() {
    let (name, lines) = expanded(search("foo", SearchMode::Text));
    assert_eq!(name, "A");
    assert!(lines[0].starts_with("matched event: A ("));
    assert!(lines[0].ends_with("events_core.xml)"));
    assert_eq!(
        lines[1..].to_vec(),
        vec!["lead text: foo bar", "choice: go", "  → event B", "    lead text: done"]
    );
}

#[test]
fn event_list_groups_carry_probabilities() {
    let (_, lines) = expanded(search("SUPPLY_DEPOT", SearchMode::Id));
    let text = lines.join("\n");
    assert!(text.contains("  → event-list LIST_MIXED:"));
    assert!(text.contains("    random-branch 1 (p=66.7%):"));
    assert!(text.contains("      → event CARGO_CHECK"));
    assert!(text.contains("    random-branch 2 (p=33.3%):"));
    assert_eq!(lines.iter().filter(|l| l.contains("random-branch")).count(), 2);
}

#[test]
fn sibling_inline_events_become_random_branches() {
    let (_, lines) = expanded(search("HAIL_LINES", SearchMode::Id));
    assert!(lines.contains(&"  → random-branch 1 (p=50%):".to_string()));
    assert!(lines.contains(&"  → random-branch 2 (p=50%):".to_string()));
}

#[test]
fn nested_match_keeps_only_the_innermost_event() {
    let (name, lines) = expanded(search("reactor core", SearchMode::Text));
    assert_eq!(name, "INNER_WRECK");
    assert!(lines[0].starts_with("matched event: INNER_WRECK ("));
}

#[test]
fn anonymous_matches_are_labelled_by_their_parent() {
    match search("static hiss", SearchMode::Text) {
        SearchOutcome::Names {
            names,
            match_count,
            note,
        } => {
            assert_eq!(names, vec!["HAIL_LINES (anonymous sub-event ×2)".to_string()]);
            assert_eq!(match_count, 2);
            assert_eq!(note.as_deref(), Some("a few events matched; their ids are:"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn cycle_is_reported_once() {
    let (_, lines) = expanded(search("LOOP_START", SearchMode::Id));
    let cycles: Vec<&String> = lines.iter().filter(|l| l.contains("cycle detected")).collect();
    assert_eq!(cycles.len(), 1);
    assert!(cycles[0].trim_start().starts_with("→ event LOOP_NEXT"));
}

#[test]
fn id_lookup_folds_case() {
    let upper = search("LOOP_START", SearchMode::Id);
    let lower = search("loop_start", SearchMode::Id);
    assert_eq!(upper, lower);
    assert_eq!(search("loop_start", SearchMode::Auto), upper);
}

#[test]
fn id_mode_never_falls_back_to_text() {
    assert_eq!(search("foo bar", SearchMode::Id), SearchOutcome::NotFound);
    assert_eq!(search("no such text anywhere", SearchMode::Auto), SearchOutcome::NotFound);
}

#[test]
fn empty_query_is_rejected_without_a_corpus() {
    let engine = engine();
    let outcome = engine
        .search(" \t ", Path::new("tests/fixtures/missing"), &SearchOptions::default())
        .unwrap();
    assert_eq!(outcome, SearchOutcome::EmptyQuery);
}

#[test]
fn missing_corpus_is_an_error() {
    let err = engine()
        .search("foo", Path::new("tests/fixtures/missing"), &SearchOptions::default())
        .unwrap_err();
    assert!(matches!(err, SearchError::CorpusMissing(_)));
}

#[test]
fn localized_definition_wins_for_ids() {
    let (name, lines) = expanded(search("GREETING", SearchMode::Id));
    assert_eq!(name, "GREETING");
    assert!(lines[0].contains("events_localized.xml"));
    assert!(lines.contains(&"lead text: 你好，旅行者。".to_string()));
}

#[test]
fn base_language_text_is_still_searchable() {
    let (name, lines) = expanded(search("welcome aboard", SearchMode::Text));
    assert_eq!(name, "GREETING");
    assert!(lines[0].contains("z_base_greetings.xml"));
}

#[test]
fn unparseable_file_yields_a_warning_line() {
    let (name, lines) = expanded(search("derelict beacon", SearchMode::Auto));
    assert_eq!(name, "BROKEN_EVENT");
    assert!(lines[0].contains("broken.xml.append"));
    assert_eq!(
        lines[1],
        "[warning] could not parse the event file, skipping detailed expansion."
    );
    assert_eq!(lines.len(), 2);
}

#[test]
fn ship_outcomes_from_unparseable_file_still_render() {
    let (_, lines) = expanded(search("GHOST_ENCOUNTER", SearchMode::Id));
    let text = lines.join("\n");
    assert!(text.contains("combat: GHOST_SHIP\n  destroyed (victory):\n    → event GHOST_WRECK"));
}

#[test]
fn empty_sentinel_event_is_found_by_id() {
    let (name, _) = expanded(search("OPTION_INVALID", SearchMode::Id));
    assert_eq!(name, "OPTION_INVALID");
}

#[test]
fn invalid_option_is_dropped() {
    let (_, lines) = expanded(search("HULL_BREACH", SearchMode::Id));
    assert!(lines.contains(&"choice: Seal the breach.".to_string()));
    assert!(!lines.iter().any(|l| l.contains("engineer") || l.contains("engi_drone")));
}

#[test]
fn depth_bound_truncates() {
    let shallow = SearchOptions {
        mode: SearchMode::Id,
        max_depth: 1,
        ..SearchOptions::default()
    };
    let outcome = engine().search("A", Path::new(CORPUS), &shallow).unwrap();
    let (_, lines) = expanded(outcome);
    assert_eq!(lines.last().map(String::as_str), Some("    …"));
    assert!(!lines.iter().any(|l| l.contains("done")));
}

#[test]
fn only_outcomes_starts_at_combat() {
    let filtered = SearchOptions {
        mode: SearchMode::Id,
        only_outcomes: true,
        ..SearchOptions::default()
    };
    let outcome = engine().search("PIRATE_AMBUSH", Path::new(CORPUS), &filtered).unwrap();
    let (_, lines) = expanded(outcome);
    assert!(lines[0].starts_with("matched event: PIRATE_AMBUSH"));
    assert_eq!(lines[2], "combat: PIRATE_RAIDER");
    assert!(!lines.iter().any(|l| l.starts_with("lead text:") || l.starts_with("choice:")));
    assert!(lines.contains(&"  surrender:".to_string()));
    assert!(lines.contains(&"  destroyed (victory):".to_string()));
    assert!(lines.contains(&"  escape attempt:".to_string()));
}

#[test]
fn only_outcomes_without_combat_keeps_everything() {
    let filtered = SearchOptions {
        mode: SearchMode::Id,
        only_outcomes: true,
        ..SearchOptions::default()
    };
    let outcome = engine().search("A", Path::new(CORPUS), &filtered).unwrap();
    let (_, lines) = expanded(outcome);
    assert!(lines.contains(&"lead text: foo bar".to_string()));
}

#[test]
fn text_across_a_load_falls_back_to_entries() {
    // "go" is A's choice text and "done" lives in B, reached through a load.
    let (name, lines) = expanded(search("go done", SearchMode::Text));
    assert_eq!(name, "A");
    assert_eq!(
        lines[1],
        "located text: not pinpointed inside the event (match may come from a sub-event or list)"
    );
}

#[test]
fn long_lines_are_clipped() {
    let narrow = SearchOptions {
        mode: SearchMode::Id,
        max_line_len: 12,
        ..SearchOptions::default()
    };
    let outcome = engine().search("SUPPLY_DEPOT", Path::new(CORPUS), &narrow).unwrap();
    let (_, lines) = expanded(outcome);
    assert!(lines.iter().all(|l| l.chars().count() <= 12));
    assert!(lines.iter().any(|l| l.ends_with('…')));
}

#[test]
fn outcome_serializes_for_adapters() {
    let outcome = search("static hiss", SearchMode::Text);
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["kind"], "names");
    assert_eq!(json["match_count"], 2);
    assert_eq!(json["names"][0], "HAIL_LINES (anonymous sub-event ×2)");
}

mod scratch_corpus {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn write_corpus(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in files {
            fs::write(dir.path().join(name), body).unwrap();
        }
        dir
    }

    #[test]
    fn repeated_names_and_orphans_are_labelled() {
        let dir = write_corpus(&[(
            "a.xml",
            r#"<FTL>
                <event name="ECHO"><text>ripple</text></event>
                <event name="ECHO"><text>ripple</text></event>
                <event><text>ripple</text></event>
            </FTL>"#,
        )]);
        match engine().search("ripple", dir.path(), &options(SearchMode::Text)).unwrap() {
            SearchOutcome::Names { names, match_count, .. } => {
                assert_eq!(match_count, 3);
                assert_eq!(names.len(), 2);
                assert_eq!(names[0], "ECHO ×2");
                assert!(names[1].starts_with("anonymous event (no parent event, file a.xml, node EN"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn events_without_text_are_id_targets() {
        let dir = write_corpus(&[(
            "a.xml",
            r#"<FTL>
                <ship name="S"><destroyed load="W"/></ship>
                <event name="W"><text>wreck</text></event>
                <event name="AMBUSH"><ship load="S" hostile="true"/></event>
            </FTL>"#,
        )]);
        let outcome = engine().search("ambush", dir.path(), &options(SearchMode::Id)).unwrap();
        let (name, lines) = expanded(outcome.clone());
        assert_eq!(name, "AMBUSH");
        assert!(lines[0].starts_with("matched event: AMBUSH ("));
        let text = lines.join("\n");
        assert!(text.contains("combat: S\n  destroyed (victory):\n    → event W\n      lead text: wreck"));

        let auto = engine().search("AMBUSH", dir.path(), &options(SearchMode::Auto)).unwrap();
        assert_eq!(auto, outcome);
    }

    #[test]
    fn too_many_matches_ask_for_a_narrower_query() {
        let events: String = (0..6)
            .map(|i| format!(r#"<event name="DRONE_{i}"><text>drone swarm {i}</text></event>"#))
            .collect();
        let dir = write_corpus(&[("drones.xml", &format!("<FTL>{events}</FTL>"))]);
        match engine().search("drone swarm", dir.path(), &options(SearchMode::Auto)).unwrap() {
            SearchOutcome::Names {
                names,
                match_count,
                note,
            } => {
                assert!(names.is_empty());
                assert_eq!(match_count, 6);
                assert_eq!(
                    note.as_deref(),
                    Some("too many matching events: 6 (please narrow your query)")
                );
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
