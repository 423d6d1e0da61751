/// Query engine: resolves a query string against a corpus and returns either
/// one expanded event, a short list of candidate labels, or nothing.
use log::{debug, info};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::core::cache::IndexCache;
use crate::core::entries::minimal_events;
use crate::core::expand::{locate, Expander};
use crate::core::indexer::{minimal, NodeIndex};
use crate::core::registry::Registry;
use crate::core::text::clip_line;
use crate::schema::markup::{tags, Element};
use crate::schema::node::{EventEntry, EventNode, NodeUid};
use crate::schema::outcome::ShipOutcomeKind;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("corpus directory not found: {0}")]
    CorpusMissing(PathBuf),
    #[error("invalid search mode: {0} (expected auto, text or id)")]
    InvalidMode(String),
}

/// Most labels returned before the engine asks for a narrower query.
pub const MAX_LISTED: usize = 5;

const FEW_MATCHES_NOTE: &str = "a few events matched; their ids are:";
const NOT_PINPOINTED: &str =
    "located text: not pinpointed inside the event (match may come from a sub-event or list)";
const UNPARSED_WARNING: &str = "[warning] could not parse the event file, skipping detailed expansion.";
const MISSING_WARNING: &str = "[warning] the event was not found in its file.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Exact event id first, then text.
    #[default]
    Auto,
    Text,
    Id,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Text => "text",
            Self::Id => "id",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "text" => Ok(Self::Text),
            "id" => Ok(Self::Id),
            _ => Err(SearchError::InvalidMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub mode: SearchMode,
    pub max_depth: usize,
    /// Keep only the lines from the first combat outcome onward.
    pub only_outcomes: bool,
    /// Clip rendered lines to this many characters; zero disables.
    pub max_line_len: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            mode: SearchMode::Auto,
            max_depth: 16,
            only_outcomes: false,
            max_line_len: 100,
        }
    }
}

/// Result of one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchOutcome {
    /// A single event, fully rendered.
    Expand { name: String, text: String },
    /// Several candidates. `names` is empty when there were too many to
    /// list; `match_count` is always the number of matches.
    Names {
        names: Vec<String>,
        match_count: usize,
        note: Option<String>,
    },
    NotFound,
    EmptyQuery,
}

impl fmt::Display for SearchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expand { text, .. } => f.write_str(text),
            Self::Names { names, note, .. } => {
                let mut lines: Vec<&str> = note.iter().map(String::as_str).collect();
                lines.extend(names.iter().map(String::as_str));
                f.write_str(&lines.join("\n"))
            }
            Self::NotFound => f.write_str("no matching events."),
            Self::EmptyQuery => f.write_str("empty query."),
        }
    }
}

pub struct SearchEngine {
    cache: Arc<IndexCache>,
    timing: bool,
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new(Arc::new(IndexCache::new()))
    }
}

impl SearchEngine {
    pub fn new(cache: Arc<IndexCache>) -> Self {
        Self {
            cache,
            timing: false,
        }
    }

    /// Report stage timings at `info` instead of `debug`.
    pub fn with_timing(mut self, timing: bool) -> Self {
        self.timing = timing;
        self
    }

    pub fn cache(&self) -> &Arc<IndexCache> {
        &self.cache
    }

    pub fn search(&self, query: &str, root: &Path, options: &SearchOptions) -> Result<SearchOutcome, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchOutcome::EmptyQuery);
        }
        let started = Instant::now();
        debug!("search {query:?} in {} (mode {})", root.display(), options.mode);

        let registry = self.cache.get_or_build(root)?;
        self.report("build registry", registry.built, registry.elapsed, started);
        let registry = registry.value;

        let entries = self.cache.entries_for(root, &registry, options.max_depth);
        self.report("index entries", entries.built, entries.elapsed, started);
        let entries = entries.value;

        let render = Render {
            registry: &registry,
            options,
        };

        if options.mode != SearchMode::Text {
            if let Some(entry) = entries.find_exact(query) {
                return Ok(SearchOutcome::Expand {
                    name: entry.name.clone(),
                    text: render.entry(entry, None),
                });
            }
            if options.mode == SearchMode::Id {
                return Ok(SearchOutcome::NotFound);
            }
        }

        let nodes = self.cache.nodes_for(root, &registry);
        self.report("index nodes", nodes.built, nodes.elapsed, started);
        let nodes = nodes.value;

        let hits = minimal(nodes.search(query));
        match hits.len() {
            0 => {}
            1 => {
                let node = hits[0];
                return Ok(SearchOutcome::Expand {
                    name: node.name.clone().unwrap_or_else(|| "(anonymous)".to_string()),
                    text: render.node(node),
                });
            }
            count => {
                let labels = match_labels(&hits, &nodes, registry.corpus_root());
                return Ok(names_outcome(labels, count));
            }
        }

        // Nothing indexed matches directly; try text reached through loads.
        let names = minimal_events(entries.search(query), &registry);
        match names.as_slice() {
            [] => Ok(SearchOutcome::NotFound),
            [name] => match entries.get(name) {
                Some(entry) => Ok(SearchOutcome::Expand {
                    name: entry.name.clone(),
                    text: render.entry(entry, Some(query)),
                }),
                None => Ok(SearchOutcome::NotFound),
            },
            _ => {
                let count = names.len();
                Ok(names_outcome(names, count))
            }
        }
    }

    fn report(&self, stage: &str, built: bool, elapsed: Duration, started: Instant) {
        let cached = if built { "" } else { " (cached)" };
        let total = started.elapsed().as_secs_f64();
        let elapsed = elapsed.as_secs_f64();
        if self.timing {
            info!("[timing] {stage}{cached}: {elapsed:.3}s (total {total:.3}s)");
        } else {
            debug!("[timing] {stage}{cached}: {elapsed:.3}s (total {total:.3}s)");
        }
    }
}

fn names_outcome(labels: Vec<String>, match_count: usize) -> SearchOutcome {
    if match_count > MAX_LISTED {
        return SearchOutcome::Names {
            names: Vec::new(),
            match_count,
            note: Some(format!(
                "too many matching events: {match_count} (please narrow your query)"
            )),
        };
    }
    SearchOutcome::Names {
        names: labels,
        match_count,
        note: Some(FEW_MATCHES_NOTE.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LabelKey {
    Named(String),
    /// Anonymous, grouped under its closest named ancestor.
    Parent(String),
    Orphan(NodeUid),
}

/// User-facing labels for several hits. Anonymous nodes are shown through
/// their closest named ancestor; repeats collapse into a count.
pub fn match_labels(hits: &[&EventNode], index: &NodeIndex, corpus_root: &Path) -> Vec<String> {
    let mut order: Vec<(LabelKey, &EventNode)> = Vec::new();
    let mut counts: FxHashMap<LabelKey, usize> = FxHashMap::default();

    for &node in hits {
        let key = match (&node.name, index.nearest_named_ancestor(node)) {
            (Some(name), _) => LabelKey::Named(name.clone()),
            (None, Some(parent)) => LabelKey::Parent(parent.to_string()),
            (None, None) => LabelKey::Orphan(node.uid),
        };
        let count = counts.entry(key.clone()).or_insert(0);
        if *count == 0 {
            order.push((key, node));
        }
        *count += 1;
    }

    order
        .into_iter()
        .map(|(key, node)| {
            let count = counts.get(&key).copied().unwrap_or(1);
            match key {
                LabelKey::Named(name) if count > 1 => format!("{name} ×{count}"),
                LabelKey::Named(name) => name,
                LabelKey::Parent(name) if count > 1 => format!("{name} (anonymous sub-event ×{count})"),
                LabelKey::Parent(name) => format!("{name} (anonymous sub-event)"),
                LabelKey::Orphan(uid) => {
                    let rel = node.file.strip_prefix(corpus_root).unwrap_or(&node.file);
                    format!(
                        "anonymous event (no parent event, file {}, node {uid})",
                        rel.display()
                    )
                }
            }
        })
        .collect()
}

/// Keep lines from the first combat line or outcome label onward. Output
/// without combat is returned whole.
pub fn filter_outcomes(lines: Vec<String>) -> Vec<String> {
    let start = lines.iter().position(|line| {
        let line = line.trim_start();
        line.starts_with("combat: ")
            || ShipOutcomeKind::ALL
                .iter()
                .any(|k| line.strip_prefix(k.label()).map_or(false, |rest| rest == ":"))
    });
    match start {
        Some(i) => lines.into_iter().skip(i).collect(),
        None => lines,
    }
}

/// Shared rendering for one query.
struct Render<'a> {
    registry: &'a Registry,
    options: &'a SearchOptions,
}

impl Render<'_> {
    fn expand(&self, event: &Element) -> Vec<String> {
        let lines = Expander::new(self.registry, self.options.max_depth).expand(event);
        if self.options.only_outcomes {
            filter_outcomes(lines)
        } else {
            lines
        }
    }

    fn finish(&self, lines: Vec<String>) -> String {
        lines
            .iter()
            .map(|l| clip_line(l, self.options.max_line_len))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn node(&self, node: &EventNode) -> String {
        let mut lines = vec![match &node.name {
            Some(name) => format!("matched event: {name} ({})", node.file.display()),
            None => format!("matched anonymous event ({})", node.file.display()),
        }];
        lines.extend(self.expand(&node.element));
        self.finish(lines)
    }

    /// A named entry, re-read from the richest definition in its file. With
    /// a query, the matching text is pinpointed and only its enclosing
    /// choice is rendered.
    fn entry(&self, entry: &EventEntry, query: Option<&str>) -> String {
        let mut lines = vec![format!(
            "matched event: {} ({})",
            entry.name,
            entry.file.display()
        )];

        let parsed = self
            .registry
            .file(&entry.file)
            .map_or(false, |f| f.is_parsed());
        if !parsed {
            lines.push(UNPARSED_WARNING.to_string());
            return self.finish(lines);
        }
        let Some(target) = self.registry.richest_definition(&entry.file, &entry.name) else {
            lines.push(MISSING_WARNING.to_string());
            return self.finish(lines);
        };

        match query.and_then(|q| locate(&target, q)) {
            Some(found) => {
                lines.push(format!("located text: {}", found.snippet));
                let body = match found.choice {
                    Some(choice) => {
                        let mut shell = Element::new(tags::EVENT);
                        shell.children.push(choice);
                        self.expand(&shell)
                    }
                    None => self.expand(&target),
                };
                lines.extend(body);
            }
            None => {
                lines.push(NOT_PINPOINTED.to_string());
                lines.extend(self.expand(&target));
            }
        }
        self.finish(lines)
    }
}
