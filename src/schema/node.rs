use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::markup::Element;

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one indexed event occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeUid(pub u64);

impl NodeUid {
    /// Allocate the next identifier. Strictly increasing for the lifetime
    /// of the process, across every index built.
    pub fn next() -> Self {
        Self(NEXT_UID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EN{}", self.0)
    }
}

/// One occurrence of an event in the corpus, named or anonymous.
#[derive(Debug, Clone)]
pub struct EventNode {
    pub uid: NodeUid,
    /// `None` for anonymous events. Ship outcome nodes carry
    /// `"<ship>:<outcome-tag>"`.
    pub name: Option<String>,
    pub file: PathBuf,
    pub element: Arc<Element>,
    pub text: String,
    pub text_compact: String,
    /// Enclosing `<event>` nodes by lexical nesting, outermost first.
    pub ancestors: Vec<NodeUid>,
}

impl EventNode {
    pub fn is_anonymous(&self) -> bool {
        self.name.is_none()
    }
}

/// A named event with the text reachable from it through load references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEntry {
    pub name: String,
    pub file: PathBuf,
    pub text: String,
    pub text_compact: String,
}
