pub mod catalog;
pub mod config;
pub mod engine;
pub mod flatten;
pub mod http;
pub mod metrics;
pub mod orchestrator;
pub mod params;
pub mod source;
