pub mod broker;
pub mod cache;
pub mod config;
pub mod config_parser;
pub mod domain;
pub mod error;
pub mod kafka;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod repository;
pub mod retry;
pub mod search;
pub mod shutdown;
pub mod state;

pub use config::*;
pub use config_parser::*;
pub use domain::*;
pub use error::*;
pub use metrics::Metrics;
pub use state::StateStore;
