pub mod cases;
pub mod command;
pub mod config;
pub mod console;
pub mod error;
pub mod event;
pub mod narrative;
pub mod nodes;
pub mod pagination;
pub mod profile;
pub mod query;
pub mod risk_band;
pub mod rng;
pub mod rollout;
pub mod rules;
pub mod source;
pub mod store;
pub mod types;
