/// Named-event entries whose text includes everything reachable through
/// load references, up to a depth bound. Serves exact-id lookup and the
/// name-based text search used when no indexed node matches.
use rustc_hash::{FxHashMap, FxHashSet};

use crate::core::expand::COMBAT_CHECK;
use crate::core::loader::SourceContent;
use crate::core::registry::Registry;
use crate::core::text::{collapse_whitespace, strip_whitespace};
use crate::schema::markup::{tags, Element};
use crate::schema::node::EventEntry;

#[derive(Debug, Clone, Default)]
pub struct EntryIndex {
    entries: Vec<EventEntry>,
    max_depth: usize,
}

impl EntryIndex {
    pub fn build(registry: &Registry, max_depth: usize) -> Self {
        let mut expander = LoadTextExpander {
            registry,
            max_depth,
            memo: FxHashMap::default(),
            visited: FxHashSet::default(),
        };

        let mut names: Vec<&String> = registry.events().keys().collect();
        names.sort();

        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let Some(def) = registry.event(name) else { continue };
            let base = def.element.gather_text();
            let extra = expander.loads_in_tree(&def.element, 0);
            // Text-less events stay: they are still exact-id targets.
            let text = format!("{base} {extra}").trim().to_string();
            entries.push(EventEntry {
                name: name.clone(),
                file: def.file.clone(),
                text_compact: strip_whitespace(&text),
                text,
            });
        }

        // Events only the fallback scan could see, unless a parsed file
        // already defines the name.
        for file in registry.files() {
            let SourceContent::Fallback(scan) = &file.content else { continue };
            for (name, text) in &scan.events {
                if registry.event(name).is_some() {
                    continue;
                }
                entries.push(EventEntry {
                    name: name.clone(),
                    file: file.path.clone(),
                    text: text.clone(),
                    text_compact: strip_whitespace(text),
                });
            }
        }

        Self { entries, max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventEntry> {
        self.entries.iter()
    }

    pub fn get(&self, name: &str) -> Option<&EventEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Entry whose name equals `query`, falling back to a case-insensitive
    /// comparison.
    pub fn find_exact(&self, query: &str) -> Option<&EventEntry> {
        if let Some(entry) = self.get(query) {
            return Some(entry);
        }
        let lowered = query.to_lowercase();
        self.entries
            .iter()
            .find(|e| e.name.to_lowercase() == lowered)
    }

    /// Names of entries matching `query`, first occurrence order.
    pub fn search(&self, query: &str) -> Vec<String> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        let compact = strip_whitespace(query);
        let mut seen = FxHashSet::default();
        self.entries
            .iter()
            .filter(|e| {
                e.text.contains(query) || (!compact.is_empty() && e.text_compact.contains(&compact))
            })
            .filter(|e| seen.insert(e.name.as_str()))
            .map(|e| e.name.clone())
            .collect()
    }
}

/// Drop any name that is a named structural ancestor of another name in
/// the set.
pub fn minimal_events(names: Vec<String>, registry: &Registry) -> Vec<String> {
    let present: FxHashSet<&str> = names.iter().map(String::as_str).collect();
    let enclosing: FxHashSet<&str> = names
        .iter()
        .flat_map(|n| registry.ancestors(n).iter().map(String::as_str))
        .filter(|a| present.contains(a))
        .collect();
    let enclosing: FxHashSet<String> = enclosing.into_iter().map(str::to_string).collect();
    names
        .into_iter()
        .filter(|n| !enclosing.contains(n))
        .collect()
}

/// Gathers the text behind load references. `memo` spans one index build
/// and is keyed by reference alone, so text first gathered deep in a chain
/// (cut by the depth bound or a cycle) is reused as-is at shallower depths.
/// Entries are built in sorted name order, which keeps that deterministic.
/// `visited` holds the references open on the current path.
struct LoadTextExpander<'a> {
    registry: &'a Registry,
    max_depth: usize,
    memo: FxHashMap<String, String>,
    visited: FxHashSet<String>,
}

impl LoadTextExpander<'_> {
    fn event_text(&mut self, name: &str, depth: usize) -> String {
        let key = format!("E:{name}");
        if depth >= self.max_depth || self.visited.contains(&key) {
            return String::new();
        }
        if let Some(text) = self.memo.get(&key) {
            return text.clone();
        }
        let Some(def) = self.registry.event(name) else {
            return String::new();
        };
        let element = def.element.clone();
        self.visited.insert(key.clone());
        let more = self.loads_in_tree(&element, depth + 1);
        let text = format!("{} {more}", element.gather_text()).trim().to_string();
        self.visited.remove(&key);
        self.memo.insert(key, text.clone());
        text
    }

    fn list_text(&mut self, name: &str, depth: usize) -> String {
        let key = format!("L:{name}");
        if depth >= self.max_depth || self.visited.contains(&key) {
            return String::new();
        }
        if let Some(text) = self.memo.get(&key) {
            return text.clone();
        }
        let Some(items) = self.registry.event_list(name) else {
            return String::new();
        };
        let items = items.to_vec();
        self.visited.insert(key.clone());
        let mut parts = Vec::new();
        for item in &items {
            parts.push(item.gather_text());
            parts.push(self.loads_in_tree(item, depth + 1));
        }
        self.visited.remove(&key);
        let text = collapse_whitespace(&parts.join(" "));
        self.memo.insert(key, text.clone());
        text
    }

    fn text_list_text(&self, name: &str) -> String {
        self.registry
            .text_list(name)
            .map(|values| {
                values
                    .iter()
                    .filter(|v| !v.is_empty())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default()
    }

    /// Text reached from every reference inside `root`, each reference
    /// followed once.
    fn loads_in_tree(&mut self, root: &Element, depth: usize) -> String {
        if depth >= self.max_depth {
            return String::new();
        }
        let mut parts = Vec::new();
        let mut seen: FxHashSet<String> = FxHashSet::default();

        for node in root.iter() {
            if node.is(tags::TEXT) && node.has_attr("load") {
                if let Some(name) = node.load() {
                    if seen.insert(format!("T:{name}")) {
                        parts.push(self.text_list_text(name));
                    }
                }
                continue;
            }

            if let Some(target) = node.load() {
                if target == COMBAT_CHECK {
                    continue;
                }
                self.follow(target, depth, &mut seen, &mut parts);
                continue;
            }

            let target = node.text.trim();
            if target.is_empty() || target == COMBAT_CHECK {
                continue;
            }
            if node.is(tags::LOAD_EVENT) {
                self.follow(target, depth, &mut seen, &mut parts);
            } else if node.is(tags::LOAD_EVENT_LIST) && seen.insert(format!("L:{target}")) {
                let text = self.list_text(target, depth + 1);
                parts.push(text);
            }
        }

        let joined = parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        collapse_whitespace(&joined)
    }

    fn follow(&mut self, target: &str, depth: usize, seen: &mut FxHashSet<String>, parts: &mut Vec<String>) {
        if self.registry.event(target).is_some() {
            if seen.insert(format!("E:{target}")) {
                let text = self.event_text(target, depth + 1);
                parts.push(text);
            }
        } else if self.registry.event_list(target).is_some() && seen.insert(format!("L:{target}")) {
            let text = self.list_text(target, depth + 1);
            parts.push(text);
        }
    }
}
