/// Tree expander: renders an event as indented lines, following load
/// references into events and event-lists.
///
/// Two sets travel with one render. `visited` holds the references open on
/// the current path and stops self-reference; `expanded` holds every
/// reference already rendered and stops repeats. Both are keyed by
/// [`RefKey`] because event names and list names are separate namespaces.
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

use crate::core::registry::Registry;
use crate::core::text::abbrev_text;
use crate::schema::effect::extract_effects;
use crate::schema::markup::{tags, Element};
use crate::schema::outcome::{OutcomeRef, ShipOutcomeKind};

/// Load target that hands control to the engine's combat resolution.
pub const COMBAT_CHECK: &str = "COMBAT_CHECK";

/// Load target marking a choice as unavailable.
pub const OPTION_INVALID: &str = "OPTION_INVALID";

const LEAD_HEAD: usize = 10;
const LEAD_TAIL: usize = 10;
const LOCATE_CONTEXT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefKey {
    Event(String),
    List(String),
}

/// Reference-tracking state for one render.
#[derive(Debug, Default)]
pub struct ExpandState {
    visited: FxHashSet<RefKey>,
    expanded: FxHashSet<RefKey>,
}

impl ExpandState {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct Expander<'a> {
    registry: &'a Registry,
    max_depth: usize,
}

/// Render `event` from depth zero with fresh state.
pub fn expand(event: &Element, registry: &Registry, max_depth: usize) -> Vec<String> {
    Expander::new(registry, max_depth).expand(event)
}

fn push_line(out: &mut Vec<String>, depth: usize, text: impl AsRef<str>) {
    out.push(format!("{}{}", "  ".repeat(depth), text.as_ref()));
}

impl<'a> Expander<'a> {
    pub fn new(registry: &'a Registry, max_depth: usize) -> Self {
        Self {
            registry,
            max_depth,
        }
    }

    pub fn expand(&self, event: &Element) -> Vec<String> {
        let mut state = ExpandState::new();
        let mut out = Vec::new();
        self.summarize(event, 0, &mut state, &mut out);
        out
    }

    /// Render one event body: lead text, effects, choices, hostile ships.
    pub fn summarize(&self, event: &Element, depth: usize, state: &mut ExpandState, out: &mut Vec<String>) {
        if depth > self.max_depth {
            push_line(out, depth, "…");
            return;
        }

        if let Some(text) = event.first_child(tags::TEXT) {
            let lead = self.render_text(text);
            if !lead.is_empty() {
                push_line(out, depth, format!("lead text: {}", abbrev_text(&lead, LEAD_HEAD, LEAD_TAIL)));
            }
        }

        let effects = extract_effects(event);
        if !effects.is_empty() {
            push_line(out, depth, format!("effects: {}", effects.join(", ")));
        }

        for choice in event.children_tagged(tags::CHOICE) {
            self.choice(choice, depth, state, out);
        }

        for ship in event.children_tagged(tags::SHIP) {
            let hostile = ship.attr("hostile").map_or(false, |h| h.eq_ignore_ascii_case("true"));
            if hostile {
                self.combat(ship, depth, state, out);
            }
        }
    }

    /// A `<text>` element as displayed: text-list references show the
    /// first two values, keyed text shows its id.
    pub fn render_text(&self, el: &Element) -> String {
        let text = el.text.trim();
        if let Some(list) = el.load() {
            return match self.registry.text_list(list) {
                Some(values) if !values.is_empty() => {
                    let sample: Vec<&str> = values.iter().take(2).map(String::as_str).collect();
                    format!("[textList {list}] {}", sample.join(" | "))
                }
                _ => format!("[textList {list}]"),
            };
        }
        match el.attr("id").filter(|id| !id.is_empty()) {
            Some(id) => format!("[text id={id}] {text}"),
            None => text.to_string(),
        }
    }

    fn choice(&self, choice: &Element, depth: usize, state: &mut ExpandState, out: &mut Vec<String>) {
        if self.offers_invalid_option(choice) {
            return;
        }

        let label = choice
            .first_child(tags::TEXT)
            .map(|t| self.render_text(t))
            .unwrap_or_default();
        let mut meta = Vec::new();
        if let Some(req) = choice.attr("req").filter(|r| !r.is_empty()) {
            meta.push(format!("req={req}"));
        }
        if matches!(choice.attr("hidden"), Some("true") | Some("1")) {
            meta.push("hidden".to_string());
        }
        let suffix = if meta.is_empty() {
            String::new()
        } else {
            format!(" [{}]", meta.join("; "))
        };
        push_line(out, depth, format!("choice: {}{suffix}", abbrev_text(&label, LEAD_HEAD, LEAD_TAIL)));

        let nested: Vec<Arc<Element>> = choice.children_tagged(tags::EVENT).cloned().collect();
        if nested.len() > 1 {
            let groups = group_branches(&nested);
            for (i, (rep, count)) in groups.iter().enumerate() {
                push_line(
                    out,
                    depth + 1,
                    format!("→ random-branch {} (p={}):", i + 1, format_probability(*count, nested.len())),
                );
                self.event_ref(rep, depth + 1, state, out);
            }
        } else if let Some(only) = nested.first() {
            // A lone outcome sits one level under the choice line.
            self.event_ref(only, depth, state, out);
        }

        for list in choice.children_tagged(tags::EVENT_LIST) {
            match list.load() {
                Some(name) => self.resolve_reference(name, depth, state, out),
                None => {
                    let items: Vec<Arc<Element>> = list.children_tagged(tags::EVENT).cloned().collect();
                    push_line(
                        out,
                        depth + 1,
                        format!("→ event-list (inline) with {} items:", items.len()),
                    );
                    self.render_branches(&items, depth, state, out);
                }
            }
        }

        for load in choice
            .children
            .iter()
            .filter(|c| c.is(tags::LOAD_EVENT) || c.is(tags::LOAD_EVENT_LIST))
        {
            let name = load.text.trim();
            if !name.is_empty() {
                self.resolve_reference(name, depth, state, out);
            }
        }
    }

    /// True when one of the choice's immediate outcomes is the invalid
    /// option sentinel. Lists are checked one level deep only.
    fn offers_invalid_option(&self, choice: &Element) -> bool {
        let is_invalid = |el: &Arc<Element>| el.load() == Some(OPTION_INVALID);
        let list_has_invalid = |name: &str| {
            self.registry
                .event_list(name)
                .map_or(false, |items| items.iter().any(is_invalid))
        };

        choice.children.iter().any(|child| match child.tag.as_str() {
            tags::EVENT => is_invalid(child),
            tags::LOAD_EVENT => child.text.trim() == OPTION_INVALID,
            tags::EVENT_LIST => match child.load() {
                Some(name) => list_has_invalid(name),
                None => child.children_tagged(tags::EVENT).any(is_invalid),
            },
            tags::LOAD_EVENT_LIST => list_has_invalid(child.text.trim()),
            _ => false,
        })
    }

    /// An `<event>` that either loads a target or is written inline.
    fn event_ref(&self, event: &Element, depth: usize, state: &mut ExpandState, out: &mut Vec<String>) {
        match event.load() {
            Some(target) => self.resolve_reference(target, depth, state, out),
            None => self.summarize(event, depth + 1, state, out),
        }
    }

    /// Follow a load target: a named event first, then a named event-list,
    /// otherwise an unknown-reference line.
    pub fn resolve_reference(&self, name: &str, depth: usize, state: &mut ExpandState, out: &mut Vec<String>) {
        if name == COMBAT_CHECK {
            return;
        }

        if let Some(def) = self.registry.event(name) {
            let key = RefKey::Event(name.to_string());
            let label = format!("→ event {name}");
            if !self.enter(&key, &label, depth, state, out) {
                return;
            }
            push_line(out, depth + 1, &label);
            self.summarize(&def.element, depth + 2, state, out);
            state.visited.remove(&key);
            return;
        }

        if let Some(items) = self.registry.event_list(name) {
            let key = RefKey::List(name.to_string());
            let label = format!("→ event-list {name}");
            if !self.enter(&key, &label, depth, state, out) {
                return;
            }
            push_line(out, depth + 1, format!("{label}:"));
            self.render_branches(items, depth, state, out);
            state.visited.remove(&key);
            return;
        }

        push_line(out, depth + 1, format!("→ unknown {name} (not found as event or event-list)"));
    }

    /// Mark `key` as open. Emits the skip line and returns false if it is
    /// already open on this path or was rendered earlier.
    fn enter(&self, key: &RefKey, label: &str, depth: usize, state: &mut ExpandState, out: &mut Vec<String>) -> bool {
        if state.visited.contains(key) {
            push_line(
                out,
                depth + 1,
                format!("{label} (already expanded on the current path, cycle detected, skipped)"),
            );
            return false;
        }
        if state.expanded.contains(key) {
            push_line(out, depth + 1, format!("{label} (already shown above, skipped)"));
            return false;
        }
        state.visited.insert(key.clone());
        state.expanded.insert(key.clone());
        true
    }

    /// Event-list items grouped into weighted random branches.
    fn render_branches(&self, items: &[Arc<Element>], depth: usize, state: &mut ExpandState, out: &mut Vec<String>) {
        if items.is_empty() {
            push_line(out, depth + 2, "(empty)");
            return;
        }
        for (i, (rep, count)) in group_branches(items).iter().enumerate() {
            push_line(
                out,
                depth + 2,
                format!("random-branch {} (p={}):", i + 1, format_probability(*count, items.len())),
            );
            if rep.load().is_some() {
                self.event_ref(rep, depth + 2, state, out);
            } else {
                self.summarize(rep, depth + 3, state, out);
            }
        }
    }

    fn combat(&self, ship: &Element, depth: usize, state: &mut ExpandState, out: &mut Vec<String>) {
        let key = ship.load().or_else(|| ship.name()).unwrap_or("(unknown)");
        push_line(out, depth, format!("combat: {key}"));
        let defined = self.registry.ship(key);

        for kind in ShipOutcomeKind::ALL {
            let inline: Vec<OutcomeRef> = ship
                .children_tagged(kind.tag())
                .map(OutcomeRef::from_element)
                .collect();
            let branches = if !inline.is_empty() {
                inline
            } else {
                defined
                    .and_then(|d| d.get(&kind))
                    .cloned()
                    .into_iter()
                    .collect()
            };
            if branches.is_empty() {
                continue;
            }

            push_line(out, depth + 1, format!("{}:", kind.label()));
            for branch in &branches {
                match branch {
                    OutcomeRef::Load(target) => self.resolve_reference(target, depth + 1, state, out),
                    OutcomeRef::Inline(el) => self.summarize(el, depth + 2, state, out),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum BranchKey {
    Load(String),
    Inline(String),
}

/// Group list items by structural identity, first-seen order. Returns each
/// group's representative and its size.
pub fn group_branches(items: &[Arc<Element>]) -> Vec<(Arc<Element>, usize)> {
    let mut groups: Vec<(Arc<Element>, usize)> = Vec::new();
    let mut slot: FxHashMap<BranchKey, usize> = FxHashMap::default();
    for item in items {
        let key = match item.load() {
            Some(target) => BranchKey::Load(target.to_string()),
            None => BranchKey::Inline(item.to_markup()),
        };
        match slot.get(&key) {
            Some(&i) => groups[i].1 += 1,
            None => {
                slot.insert(key, groups.len());
                groups.push((Arc::clone(item), 1));
            }
        }
    }
    groups
}

/// `count / total` as a percentage. Whole numbers (within 0.05) print
/// without decimals, everything else with one.
pub fn format_probability(count: usize, total: usize) -> String {
    let p = count as f64 * 100.0 / total.max(1) as f64;
    if (p - p.round()).abs() < 0.05 {
        format!("{:.0}%", p)
    } else {
        format!("{:.1}%", p)
    }
}

/// Where a query sits inside an event.
#[derive(Debug, Clone)]
pub struct Located {
    /// `…<before>[query]<after>…` with up to 20 characters of context.
    pub snippet: String,
    /// Innermost choice enclosing the match, if any.
    pub choice: Option<Arc<Element>>,
}

/// First element of `root` (pre-order) whose text contains `query`. For
/// `<text>` elements the whole subtree text counts, elsewhere only the
/// element's own leading text.
pub fn locate(root: &Arc<Element>, query: &str) -> Option<Located> {
    let mut path = Vec::new();
    find_match(root, query, &mut path)
}

fn find_match<'e>(node: &'e Arc<Element>, query: &str, path: &mut Vec<&'e Arc<Element>>) -> Option<Located> {
    let text = if node.is(tags::TEXT) {
        node.itertext().concat()
    } else {
        node.text.clone()
    };
    if let Some(at) = text.find(query) {
        let before: Vec<char> = text[..at].chars().rev().take(LOCATE_CONTEXT).collect();
        let before: String = before.into_iter().rev().collect();
        let after: String = text[at + query.len()..].chars().take(LOCATE_CONTEXT).collect();
        let choice = path.iter().rev().find(|a| a.is(tags::CHOICE)).map(|a| Arc::clone(a));
        return Some(Located {
            snippet: format!("…{before}[{query}]{after}…"),
            choice,
        });
    }

    path.push(node);
    for child in &node.children {
        if let Some(found) = find_match(child, query, path) {
            return Some(found);
        }
    }
    path.pop();
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loader::{parse_markup, SourceContent, SourceFile};
    use pretty_assertions::assert_eq;
    use std::path::{Path, PathBuf};

    fn registry(source: &str) -> Registry {
        Registry::from_sources(
            Path::new("data"),
            vec![SourceFile {
                path: PathBuf::from("data/a.xml"),
                content: SourceContent::Parsed(Arc::new(parse_markup(source).unwrap())),
            }],
        )
    }

    fn render(reg: &Registry, name: &str, max_depth: usize) -> Vec<String> {
        let def = reg.event(name).unwrap();
        expand(&def.element, reg, max_depth)
    }

    #[test]
    fn single_outcome_follows_load() {
        let reg = registry(
            r#"<event name="A"><text>foo bar</text><choice><text>go</text><event load="B"/></choice></event>
               <event name="B"><text>done</text></event>"#,
        );
        assert_eq!(
            render(&reg, "A", 8),
            vec!["lead text: foo bar", "choice: go", "  → event B", "    lead text: done"]
        );
    }

    #[test]
    fn list_branches_carry_probabilities() {
        let reg = registry(
            r#"<event name="START"><choice><text>roll</text><eventList load="L"/></choice></event>
               <eventList name="L"><event load="C"/><event load="C"/><event><text>inline</text></event></eventList>
               <event name="C"><text>cargo</text></event>"#,
        );
        assert_eq!(
            render(&reg, "START", 8),
            vec![
                "choice: roll",
                "  → event-list L:",
                "    random-branch 1 (p=66.7%):",
                "      → event C",
                "        lead text: cargo",
                "    random-branch 2 (p=33.3%):",
                "      lead text: inline",
            ]
        );
    }

    #[test]
    fn cycles_are_reported_once() {
        let reg = registry(
            r#"<event name="A"><text>ping</text><choice><text>on</text><event load="B"/></choice></event>
               <event name="B"><text>pong</text><choice><text>back</text><event load="A"/></choice></event>"#,
        );
        // the root itself is not on the path, so the loop closes at B
        let lines = render(&reg, "A", 16);
        let cycles: Vec<&String> = lines.iter().filter(|l| l.contains("cycle detected")).collect();
        assert_eq!(cycles.len(), 1, "{lines:#?}");
        assert!(cycles[0].contains("→ event B"));

        let mut state = ExpandState::new();
        let mut out = Vec::new();
        Expander::new(&reg, 16).resolve_reference("A", 0, &mut state, &mut out);
        let cycles: Vec<&String> = out.iter().filter(|l| l.contains("cycle detected")).collect();
        assert_eq!(cycles.len(), 1, "{out:#?}");
        assert!(cycles[0].contains("→ event A"));
    }

    #[test]
    fn repeated_reference_is_shown_once() {
        let reg = registry(
            r#"<event name="A"><choice><text>one</text><event load="B"/></choice><choice><text>two</text><event load="B"/></choice></event>
               <event name="B"><text>shared</text></event>"#,
        );
        assert_eq!(
            render(&reg, "A", 8),
            vec![
                "choice: one",
                "  → event B",
                "    lead text: shared",
                "choice: two",
                "  → event B (already shown above, skipped)",
            ]
        );
    }

    #[test]
    fn unknown_and_combat_check_targets() {
        let reg = registry(
            r#"<event name="A"><choice><text>fight</text><event load="COMBAT_CHECK"/></choice><choice><text>lost</text><event load="NOWHERE"/></choice></event>"#,
        );
        assert_eq!(
            render(&reg, "A", 8),
            vec![
                "choice: fight",
                "choice: lost",
                "  → unknown NOWHERE (not found as event or event-list)",
            ]
        );
    }

    #[test]
    fn invalid_options_are_dropped() {
        let reg = registry(
            r#"<event name="A"><choice><text>keep</text></choice><choice><text>drop</text><event load="OPTION_INVALID"/></choice>
               <choice><text>drop too</text><loadEventList>BAD</loadEventList></choice></event>
               <eventList name="BAD"><event load="OPTION_INVALID"/><event load="X"/></eventList>"#,
        );
        assert_eq!(render(&reg, "A", 8), vec!["choice: keep"]);
    }

    #[test]
    fn sibling_inline_events_are_random_branches() {
        let reg = registry(
            r#"<event name="A"><choice><text>gamble</text><event><text>win</text></event><event><text>lose</text></event></choice></event>"#,
        );
        assert_eq!(
            render(&reg, "A", 8),
            vec![
                "choice: gamble",
                "  → random-branch 1 (p=50%):",
                "    lead text: win",
                "  → random-branch 2 (p=50%):",
                "    lead text: lose",
            ]
        );
    }

    #[test]
    fn inline_event_lists_in_choices() {
        let reg = registry(
            r#"<event name="A"><choice><text>scatter</text><eventList><event><text>drift</text></event><event><text>drift</text></event><event load="B"/></eventList></choice>
               <choice><text>direct</text><loadEvent>B</loadEvent></choice>
               <choice><text>nothing</text><eventList></eventList></choice></event>
               <event name="B"><text>arrive</text></event>"#,
        );
        assert_eq!(
            render(&reg, "A", 8),
            vec![
                "choice: scatter",
                "  → event-list (inline) with 3 items:",
                "    random-branch 1 (p=66.7%):",
                "      lead text: drift",
                "    random-branch 2 (p=33.3%):",
                "      → event B",
                "        lead text: arrive",
                "choice: direct",
                "  → event B (already shown above, skipped)",
                "choice: nothing",
                "  → event-list (inline) with 0 items:",
                "    (empty)",
            ]
        );
    }

    #[test]
    fn load_event_text_names_the_target() {
        let reg = registry(
            r#"<event name="A"><choice><text>go</text><loadEvent> B </loadEvent></choice><choice><text>lost</text><loadEvent>NOWHERE</loadEvent></choice></event>
               <event name="B"><text>arrive</text></event>"#,
        );
        assert_eq!(
            render(&reg, "A", 8),
            vec![
                "choice: go",
                "  → event B",
                "    lead text: arrive",
                "choice: lost",
                "  → unknown NOWHERE (not found as event or event-list)",
            ]
        );
    }

    #[test]
    fn hostile_ship_outcomes_prefer_inline_then_registry() {
        let reg = registry(
            r#"<ship name="RAIDER"><surrender load="GIVE_UP"/><destroyed><text>boom</text></destroyed></ship>
               <event name="GIVE_UP"><text>they yield</text></event>
               <event name="A"><ship load="RAIDER" hostile="true"><destroyed><text>override</text></destroyed></ship></event>"#,
        );
        assert_eq!(
            render(&reg, "A", 8),
            vec![
                "combat: RAIDER",
                "  surrender:",
                "    → event GIVE_UP",
                "      lead text: they yield",
                "  destroyed (victory):",
                "    lead text: override",
            ]
        );
    }

    #[test]
    fn depth_bound_truncates() {
        let reg = registry(
            r#"<event name="A"><text>top</text><choice><text>down</text><event load="B"/></choice></event>
               <event name="B"><text>bottom</text></event>"#,
        );
        assert_eq!(
            render(&reg, "A", 1),
            vec!["lead text: top", "choice: down", "  → event B", "    …"]
        );
    }

    #[test]
    fn text_list_and_keyed_text() {
        let reg = registry(
            r#"<textList name="T"><text>a</text><text>b</text><text>c</text></textList>
               <event name="A"><text load="T"/><choice><text id="k">Go</text></choice></event>"#,
        );
        assert_eq!(
            render(&reg, "A", 8),
            vec!["lead text: [textList T] a | b", "choice: [text id=k] Go"]
        );
    }

    #[test]
    fn probability_formatting() {
        assert_eq!(format_probability(2, 3), "66.7%");
        assert_eq!(format_probability(1, 3), "33.3%");
        assert_eq!(format_probability(1, 4), "25%");
        assert_eq!(format_probability(1, 8), "12.5%");
        assert_eq!(format_probability(1, 0), "100%");
    }

    #[test]
    fn locate_finds_enclosing_choice() {
        let root = Arc::new(
            parse_markup(r#"<event name="A"><text>intro</text><choice><text>pick the blue wire</text></choice></event>"#)
                .unwrap(),
        );
        let event = Arc::clone(&root.children[0]);
        let found = locate(&event, "blue").unwrap();
        assert_eq!(found.snippet, "…pick the [blue] wire…");
        assert!(found.choice.is_some());

        let found = locate(&event, "intro").unwrap();
        assert!(found.choice.is_none());
        assert!(locate(&event, "absent").is_none());
    }
}
