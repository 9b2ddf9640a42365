pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod observability;
pub mod orchestrator;
pub mod scrapers;
pub mod storage;
pub mod types;
pub mod utils;

pub use context::AppContext;
pub use error::{Error, Result};
