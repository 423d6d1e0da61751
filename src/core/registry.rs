/// Corpus-wide lookup tables: named events, event-lists, text-lists, ship
/// outcome branches, and the named-event ancestry map.
use log::info;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::loader::{self, SourceContent, SourceFile};
use crate::core::query::SearchError;
use crate::schema::markup::{tags, Element};
use crate::schema::outcome::{OutcomeRef, ShipOutcomeKind, ShipOutcomes};

/// Where a named event is defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDef {
    pub file: PathBuf,
    pub element: Arc<Element>,
}

/// Lookup tables built once per corpus. Immutable after [`Registry::build`].
#[derive(Debug, Clone, Default)]
pub struct Registry {
    corpus_root: PathBuf,
    files: Vec<SourceFile>,
    events: FxHashMap<String, EventDef>,
    event_lists: FxHashMap<String, Vec<Arc<Element>>>,
    text_lists: FxHashMap<String, Vec<String>>,
    ship_outcomes: FxHashMap<String, ShipOutcomes>,
    event_ancestors: FxHashMap<String, Vec<String>>,
}

impl Registry {
    /// Load and index every markup file under `root`.
    pub fn build(root: &Path) -> Result<Self, SearchError> {
        if !root.is_dir() {
            return Err(SearchError::CorpusMissing(root.to_path_buf()));
        }
        let files = loader::load_corpus(root);
        let registry = Self::from_sources(root, files);
        info!(
            "indexed {} files under {} ({} unparsed): {} events, {} event-lists, {} text-lists, {} ships",
            registry.files.len(),
            root.display(),
            registry.files.iter().filter(|f| !f.is_parsed()).count(),
            registry.events.len(),
            registry.event_lists.len(),
            registry.text_lists.len(),
            registry.ship_outcomes.len(),
        );
        Ok(registry)
    }

    /// Build the tables from already loaded files, processed in the given
    /// order. Later definitions of a name replace earlier ones.
    pub fn from_sources(root: &Path, files: Vec<SourceFile>) -> Self {
        let mut registry = Self {
            corpus_root: root.to_path_buf(),
            ..Self::default()
        };
        for file in &files {
            match &file.content {
                SourceContent::Parsed(tree) => registry.add_tree(&file.path, tree),
                SourceContent::Fallback(scan) => {
                    for (ship, kind, target) in &scan.ship_loads {
                        registry
                            .ship_outcomes
                            .entry(ship.clone())
                            .or_default()
                            .insert(*kind, OutcomeRef::Load(target.clone()));
                    }
                }
            }
        }
        registry.files = files;
        registry
    }

    fn add_tree(&mut self, path: &Path, tree: &Arc<Element>) {
        for el in tree.descendants() {
            if !el.is(tags::EVENT) {
                continue;
            }
            if let Some(name) = el.name() {
                self.events.insert(
                    name.to_string(),
                    EventDef {
                        file: path.to_path_buf(),
                        element: Arc::clone(el),
                    },
                );
            }
        }

        let mut stack = Vec::new();
        record_ancestors(tree, &mut stack, &mut self.event_ancestors);

        for el in tree.descendants() {
            match el.tag.as_str() {
                tags::EVENT_LIST => {
                    let Some(name) = el.name() else { continue };
                    let items: Vec<Arc<Element>> = el.children_tagged(tags::EVENT).cloned().collect();
                    if !items.is_empty() {
                        self.event_lists.insert(name.to_string(), items);
                    }
                }
                tags::TEXT_LIST => {
                    let Some(name) = el.name() else { continue };
                    let values: Vec<String> = el
                        .children_tagged(tags::TEXT)
                        .map(|t| t.text.trim().to_string())
                        .collect();
                    if !values.is_empty() {
                        self.text_lists.insert(name.to_string(), values);
                    }
                }
                tags::SHIP => {
                    let Some(name) = el.name() else { continue };
                    let outcomes = self.ship_outcomes.entry(name.to_string()).or_default();
                    for kind in ShipOutcomeKind::ALL {
                        if let Some(branch) = el.children_tagged(kind.tag()).last() {
                            outcomes.insert(kind, OutcomeRef::from_element(branch));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    pub fn corpus_root(&self) -> &Path {
        &self.corpus_root
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn file(&self, path: &Path) -> Option<&SourceFile> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn event(&self, name: &str) -> Option<&EventDef> {
        self.events.get(name)
    }

    pub fn event_list(&self, name: &str) -> Option<&[Arc<Element>]> {
        self.event_lists.get(name).map(Vec::as_slice)
    }

    pub fn text_list(&self, name: &str) -> Option<&[String]> {
        self.text_lists.get(name).map(Vec::as_slice)
    }

    pub fn ship(&self, name: &str) -> Option<&ShipOutcomes> {
        self.ship_outcomes.get(name)
    }

    /// Named enclosing events of `name`, outermost first.
    pub fn ancestors(&self, name: &str) -> &[String] {
        self.event_ancestors
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn events(&self) -> &FxHashMap<String, EventDef> {
        &self.events
    }

    pub fn event_lists(&self) -> &FxHashMap<String, Vec<Arc<Element>>> {
        &self.event_lists
    }

    pub fn text_lists(&self) -> &FxHashMap<String, Vec<String>> {
        &self.text_lists
    }

    pub fn ship_outcomes(&self) -> &FxHashMap<String, ShipOutcomes> {
        &self.ship_outcomes
    }

    pub fn event_ancestors(&self) -> &FxHashMap<String, Vec<String>> {
        &self.event_ancestors
    }

    /// The definition of `name` in `file` with the most children. A file
    /// may repeat a name as a bare placeholder inside a list; the full body
    /// is the one worth rendering.
    pub fn richest_definition(&self, file: &Path, name: &str) -> Option<Arc<Element>> {
        let tree = self.file(file)?.tree()?;
        let mut best: Option<&Arc<Element>> = None;
        for el in tree.descendants() {
            if !el.is(tags::EVENT) || el.name() != Some(name) {
                continue;
            }
            if best.map_or(true, |b| el.children.len() > b.children.len()) {
                best = Some(el);
            }
        }
        best.cloned()
    }
}

fn record_ancestors(
    node: &Element,
    stack: &mut Vec<String>,
    out: &mut FxHashMap<String, Vec<String>>,
) {
    let pushed = match node.name() {
        Some(name) if node.is(tags::EVENT) => {
            out.insert(name.to_string(), stack.clone());
            stack.push(name.to_string());
            true
        }
        _ => false,
    };
    for child in &node.children {
        record_ancestors(child, stack, out);
    }
    if pushed {
        stack.pop();
    }
}
