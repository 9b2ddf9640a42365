pub mod manager;
pub mod reader;
pub mod registry;

pub use manager::ScrapingManager;
pub use reader::RefreshingReader;
pub use registry::{SourceRef, SourceRegistry};
