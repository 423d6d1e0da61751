pub mod cache;
pub mod config;
pub mod entries;
pub mod expand;
pub mod indexer;
pub mod loader;
pub mod query;
pub mod registry;
pub mod text;
