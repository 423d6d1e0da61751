use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::markup::Element;

/// How a ship combat encounter can end.
///
/// Declaration order is rendering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ShipOutcomeKind {
    Surrender,
    Destroyed,
    DeadCrew,
    Escape,
    GotAway,
}

impl ShipOutcomeKind {
    pub const ALL: [ShipOutcomeKind; 5] = [
        Self::Surrender,
        Self::Destroyed,
        Self::DeadCrew,
        Self::Escape,
        Self::GotAway,
    ];

    /// Markup tag of the branch inside a `<ship>` block (e.g., "deadCrew").
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Surrender => "surrender",
            Self::Destroyed => "destroyed",
            Self::DeadCrew => "deadCrew",
            Self::Escape => "escape",
            Self::GotAway => "gotaway",
        }
    }

    /// Label printed in front of the branch when rendering combat.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Surrender => "surrender",
            Self::Destroyed => "destroyed (victory)",
            Self::DeadCrew => "all crew dead (victory)",
            Self::Escape => "escape attempt",
            Self::GotAway => "enemy flees",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }
}

/// One resolved outcome branch of a ship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeRef {
    /// Branch content written directly inside the ship block.
    Inline(Arc<Element>),
    /// Branch that loads a named event or event-list.
    Load(String),
}

impl OutcomeRef {
    /// A branch element with a non-empty `load` attribute is a reference,
    /// anything else is kept inline.
    pub fn from_element(el: &Arc<Element>) -> Self {
        match el.load() {
            Some(target) => Self::Load(target.to_string()),
            None => Self::Inline(Arc::clone(el)),
        }
    }
}

pub type ShipOutcomes = BTreeMap<ShipOutcomeKind, OutcomeRef>;
