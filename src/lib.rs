//! Event search: indexing and branch expansion for narrative event markup.
//!
//! Loads a directory of event markup files, builds lookup tables for named
//! events, event-lists, text-lists and ship combat outcomes, answers substring
//! queries over event text, and renders a matched event as an indented tree
//! that follows load references, detects cycles and weighs random branches.

pub mod core;
pub mod schema;
