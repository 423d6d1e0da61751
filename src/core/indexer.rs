/// Node index: every `<event>` occurrence in the corpus, named or not, plus
/// one synthetic node per populated ship outcome branch.
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::Path;
use std::sync::Arc;

use crate::core::registry::Registry;
use crate::core::text::{collapse_whitespace, strip_whitespace};
use crate::schema::markup::{tags, Element};
use crate::schema::node::{EventNode, NodeUid};
use crate::schema::outcome::ShipOutcomeKind;

#[derive(Debug, Clone, Default)]
pub struct NodeIndex {
    nodes: Vec<EventNode>,
    by_uid: FxHashMap<NodeUid, usize>,
}

impl NodeIndex {
    /// Walk every parsed file of `registry`. Files recovered only by the
    /// fallback scan have no structure and contribute no nodes.
    pub fn build(registry: &Registry) -> Self {
        let mut index = Self::default();
        for file in registry.files() {
            let Some(tree) = file.tree() else { continue };
            let mut stack = Vec::new();
            index.visit(tree, &file.path, registry, &mut stack);
        }
        index.by_uid = index
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.uid, i))
            .collect();
        index
    }

    fn visit(&mut self, el: &Arc<Element>, file: &Path, registry: &Registry, stack: &mut Vec<NodeUid>) {
        let mut pushed = None;
        if el.is(tags::EVENT) {
            let text = node_text(el, registry);
            let uid = NodeUid::next();
            self.nodes.push(EventNode {
                uid,
                name: el.name().map(str::to_string),
                file: file.to_path_buf(),
                element: Arc::clone(el),
                text_compact: strip_whitespace(&text),
                text,
                ancestors: stack.clone(),
            });
            stack.push(uid);
            pushed = Some(uid);
        }

        if el.is(tags::SHIP) {
            let ship = el.load().or_else(|| el.name()).unwrap_or("(ship)");
            for branch in &el.children {
                if ShipOutcomeKind::from_tag(&branch.tag).is_none() {
                    continue;
                }
                let text = node_text(branch, registry);
                if text.is_empty() {
                    continue;
                }
                self.nodes.push(EventNode {
                    uid: NodeUid::next(),
                    name: Some(format!("{ship}:{}", branch.tag)),
                    file: file.to_path_buf(),
                    element: Arc::new(branch.deep_clone()),
                    text_compact: strip_whitespace(&text),
                    text,
                    ancestors: stack.clone(),
                });
            }
        }

        for child in &el.children {
            self.visit(child, file, registry, stack);
        }
        if pushed.is_some() {
            stack.pop();
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventNode> {
        self.nodes.iter()
    }

    pub fn get(&self, uid: NodeUid) -> Option<&EventNode> {
        self.by_uid.get(&uid).map(|&i| &self.nodes[i])
    }

    /// Nodes whose text contains `query`, or whose whitespace-free text
    /// contains the whitespace-free query.
    pub fn search(&self, query: &str) -> Vec<&EventNode> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        let compact = strip_whitespace(query);
        self.nodes
            .iter()
            .filter(|n| {
                n.text.contains(query) || (!compact.is_empty() && n.text_compact.contains(&compact))
            })
            .collect()
    }

    /// Closest enclosing named event of `node`.
    pub fn nearest_named_ancestor(&self, node: &EventNode) -> Option<&str> {
        node.ancestors
            .iter()
            .rev()
            .filter_map(|uid| self.get(*uid))
            .find_map(|anc| anc.name.as_deref())
    }
}

/// Drop every hit that structurally encloses another hit.
pub fn minimal<'a>(hits: Vec<&'a EventNode>) -> Vec<&'a EventNode> {
    let uids: FxHashSet<NodeUid> = hits.iter().map(|n| n.uid).collect();
    let enclosing: FxHashSet<NodeUid> = hits
        .iter()
        .flat_map(|n| n.ancestors.iter().copied())
        .filter(|a| uids.contains(a))
        .collect();
    hits.into_iter()
        .filter(|n| !enclosing.contains(&n.uid))
        .collect()
}

/// Visible text of a subtree plus the values of every text-list it loads.
fn node_text(el: &Element, registry: &Registry) -> String {
    let mut text = el.gather_text();
    for node in el.iter() {
        if !node.is(tags::TEXT) {
            continue;
        }
        let Some(values) = node.load().and_then(|name| registry.text_list(name)) else {
            continue;
        };
        for value in values.iter().filter(|v| !v.is_empty()) {
            text.push(' ');
            text.push_str(value);
        }
    }
    collapse_whitespace(&text)
}
