pub mod config;
pub mod embedding;
pub mod entities;
pub mod errors;
pub mod filters;
pub mod logging;
pub mod query;
pub mod relevance;
pub mod search;
pub mod server;
pub mod store;
