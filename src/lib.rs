//! freifahren-sync: conditional fetching, report merging and line risk
//! aggregation for ticket-inspector sightings.

pub mod config;
pub mod engine;
pub mod fetch;
pub mod reports;
pub mod risk;
pub mod scheduler;
pub mod store;
pub mod web;

pub use config::EngineConfig;
pub use engine::Engine;
