//! Side effects attached to an event: rewards, crew changes, reputation and
//! pursuit deltas, and so on.
//!
//! Every effect kind the renderer understands is a variant of [`Effect`]; the
//! `Display` impl is the one place that decides how a digest entry reads.

use std::fmt;

use super::markup::{tags, Element};

/// Equipment granted by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GainKind {
    Weapon,
    Drone,
    Augment,
}

impl GainKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Weapon => "weapon",
            Self::Drone => "drone",
            Self::Augment => "augment",
        }
    }
}

/// Crew skill attributes, in the order they are reported.
const CREW_SKILLS: [&str; 7] = [
    "pilot",
    "combat",
    "repair",
    "shields",
    "engines",
    "weapons",
    "all_skills",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    AutoReward {
        level: Option<String>,
        value: String,
    },
    ItemModify {
        item: Option<String>,
        min: Option<String>,
        max: Option<String>,
    },
    Gain {
        kind: GainKind,
        name: Option<String>,
    },
    Crew {
        amount: String,
        class: Option<String>,
        name: Option<String>,
        skills: Vec<(String, String)>,
    },
    Status {
        kind: Option<String>,
        target: Option<String>,
        amount: Option<String>,
    },
    Upgrade {
        system: String,
        amount: String,
    },
    Quest {
        event: String,
    },
    RemoveCrew {
        amount: String,
        clonable: bool,
    },
    /// `rep_*` variables are reputation with a faction.
    Variable {
        name: Option<String>,
        op: String,
        value: String,
    },
    Pursuit {
        amount: Option<String>,
    },
    Boarders {
        class: String,
        range: String,
    },
    System {
        name: Option<String>,
    },
    Damage {
        amount: Option<String>,
    },
    Repair {
        amount: Option<String>,
    },
    Store {
        id: Option<String>,
    },
    Unlock {
        ship: String,
    },
    RemoveItem {
        item: Option<String>,
    },
}

impl Effect {
    /// Effects declared directly by `el` (not its descendants). Most tags
    /// produce at most one; `item_modify` produces one per `<item>`.
    pub fn parse(el: &Element) -> Vec<Effect> {
        let effect = match el.tag.as_str() {
            "autoReward" => Effect::AutoReward {
                level: attr(el, "level"),
                value: el.text.trim().to_string(),
            },
            "item_modify" => {
                return el
                    .children_tagged("item")
                    .map(|item| Effect::ItemModify {
                        item: attr(item, "type"),
                        min: attr(item, "min"),
                        max: attr(item, "max"),
                    })
                    .collect();
            }
            "weapon" => gain(GainKind::Weapon, el),
            "drone" => gain(GainKind::Drone, el),
            "augment" => gain(GainKind::Augment, el),
            "crewMember" => Effect::Crew {
                amount: attr(el, "amount")
                    .or_else(|| attr(el, "count"))
                    .unwrap_or_else(|| "1".to_string()),
                class: attr(el, "class").or_else(|| attr(el, "type")),
                name: inner_text(el),
                skills: CREW_SKILLS
                    .iter()
                    .filter_map(|k| attr(el, k).map(|v| (k.to_string(), v)))
                    .collect(),
            },
            "status" => Effect::Status {
                kind: attr(el, "type"),
                target: attr(el, "target"),
                amount: attr(el, "amount"),
            },
            "upgrade" => Effect::Upgrade {
                system: attr(el, "system").unwrap_or_else(unknown),
                amount: attr(el, "amount").unwrap_or_else(unknown),
            },
            "quest" => Effect::Quest {
                event: attr(el, "event").unwrap_or_else(unknown),
            },
            "removeCrew" => Effect::RemoveCrew {
                amount: attr(el, "amount").unwrap_or_else(|| "1".to_string()),
                clonable: el.children_tagged("clone").any(|c| {
                    let flag = c.text.trim().to_lowercase();
                    flag == "true" || flag == "1"
                }),
            },
            "variable" => Effect::Variable {
                name: attr(el, "name"),
                op: attr(el, "op")
                    .map(|op| op.to_lowercase())
                    .unwrap_or_else(unknown),
                value: attr(el, "val")
                    .or_else(|| attr(el, "amount"))
                    .unwrap_or_else(unknown),
            },
            "modifyPursuit" => Effect::Pursuit {
                amount: attr(el, "amount"),
            },
            "boarders" => {
                let min = attr(el, "min");
                let max = attr(el, "max");
                let range = match (min, max) {
                    (Some(lo), Some(hi)) => format!("{lo}..{hi}"),
                    (Some(one), None) | (None, Some(one)) => one,
                    (None, None) => attr(el, "amount").unwrap_or_else(unknown),
                };
                Effect::Boarders {
                    class: attr(el, "class")
                        .or_else(|| attr(el, "race"))
                        .unwrap_or_else(unknown),
                    range,
                }
            }
            "system" => Effect::System {
                name: attr(el, "name"),
            },
            "damage" => Effect::Damage {
                amount: attr(el, "amount"),
            },
            "repair" => Effect::Repair {
                amount: attr(el, "amount"),
            },
            "store" => Effect::Store { id: inner_text(el) },
            "unlockCustomShip" => Effect::Unlock {
                ship: inner_text(el)
                    .or_else(|| attr(el, "id"))
                    .unwrap_or_else(unknown),
            },
            "removeItem" => Effect::RemoveItem { item: inner_text(el) },
            _ => return Vec::new(),
        };
        vec![effect]
    }
}

fn gain(kind: GainKind, el: &Element) -> Effect {
    Effect::Gain {
        kind,
        name: attr(el, "name"),
    }
}

fn attr(el: &Element, key: &str) -> Option<String> {
    el.attr(key).filter(|v| !v.is_empty()).map(str::to_string)
}

fn inner_text(el: &Element) -> Option<String> {
    let text = el.text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn unknown() -> String {
    "?".to_string()
}

fn or_unknown(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("?")
}

/// Prefix a `+` unless the value already carries a minus sign.
fn signed(value: &str) -> String {
    if value.starts_with('-') {
        value.to_string()
    } else {
        format!("+{value}")
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::AutoReward { level, value } => match level {
                Some(level) => write!(f, "autoReward({level}: {value})"),
                None => write!(f, "autoReward({value})"),
            },
            Effect::ItemModify { item, min, max } => {
                let range = match (min, max) {
                    (Some(lo), Some(hi)) if lo != hi => format!("{lo}..{hi}"),
                    (Some(one), _) | (None, Some(one)) => one.clone(),
                    (None, None) => unknown(),
                };
                write!(f, "{} {range}", or_unknown(item))
            }
            Effect::Gain { kind, name } => write!(f, "+{}:{}", kind.tag(), or_unknown(name)),
            Effect::Crew {
                amount,
                class,
                name,
                skills,
            } => {
                write!(f, "+crew x{amount}")?;
                if let Some(class) = class {
                    write!(f, " {class}")?;
                }
                if let Some(name) = name {
                    write!(f, " name={name}")?;
                }
                if !skills.is_empty() {
                    let parts: Vec<String> = skills
                        .iter()
                        .map(|(k, v)| {
                            if k == "all_skills" {
                                format!("{k}={v}")
                            } else {
                                format!("{k}+{v}")
                            }
                        })
                        .collect();
                    write!(f, " ({})", parts.join(", "))?;
                }
                Ok(())
            }
            Effect::Status {
                kind,
                target,
                amount,
            } => write!(
                f,
                "status({}:{} {})",
                or_unknown(kind),
                or_unknown(target),
                or_unknown(amount)
            ),
            Effect::Upgrade { system, amount } => write!(f, "upgrade {system} {}", signed(amount)),
            Effect::Quest { event } => write!(f, "quest: {event}"),
            Effect::RemoveCrew { amount, clonable } => {
                write!(f, "crew -{amount}")?;
                if *clonable {
                    write!(f, " (clonable)")?;
                }
                Ok(())
            }
            Effect::Variable { name, op, value } => {
                let name = or_unknown(name);
                match name.strip_prefix("rep_") {
                    Some(faction) => match op.as_str() {
                        "add" => write!(f, "rep_{faction} {}", signed(value)),
                        "sub" => write!(f, "rep_{faction} -{value}"),
                        _ => write!(f, "rep_{faction} {op} {value}"),
                    },
                    None => match op.as_str() {
                        "add" => write!(f, "var {name} {}", signed(value)),
                        _ => write!(f, "var {name} {op} {value}"),
                    },
                }
            }
            Effect::Pursuit { amount } => match amount {
                Some(amount) => write!(f, "pursuit {}", signed(amount)),
                None => write!(f, "pursuit ?"),
            },
            Effect::Boarders { class, range } => write!(f, "boarders {class} {range}"),
            Effect::System { name } => write!(f, "system:{}", or_unknown(name)),
            Effect::Damage { amount } => write!(f, "damage:{}", or_unknown(amount)),
            Effect::Repair { amount } => write!(f, "repair:{}", or_unknown(amount)),
            Effect::Store { id } => match id {
                Some(id) => write!(f, "store: {id}"),
                None => write!(f, "store"),
            },
            Effect::Unlock { ship } => write!(f, "unlock: {ship}"),
            Effect::RemoveItem { item } => match item {
                Some(item) => write!(f, "-item: {item}"),
                None => write!(f, "-item"),
            },
        }
    }
}

/// All effects below `event`, in document order, skipping `choice`
/// subtrees (those belong to the option, not to the event itself).
pub fn collect_effects(event: &Element) -> Vec<Effect> {
    let mut out = Vec::new();
    walk(event, &mut out);
    out
}

fn walk(node: &Element, out: &mut Vec<Effect>) {
    for child in &node.children {
        if child.is(tags::CHOICE) {
            continue;
        }
        out.extend(Effect::parse(child));
        walk(child, out);
    }
}

/// Rendered effect digest for `event`, de-duplicated by rendered text with
/// first occurrence kept.
pub fn extract_effects(event: &Element) -> Vec<String> {
    let mut seen = rustc_hash::FxHashSet::default();
    collect_effects(event)
        .into_iter()
        .map(|e| e.to_string())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}
