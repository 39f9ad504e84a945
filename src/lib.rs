pub mod config;
pub mod error;
pub mod ingest;
pub mod output;
pub mod process;
pub mod staging;

pub use config::EngineConfig;
pub use error::EngineError;
pub use process::{merge_named_tables, regularize_table, Merged, RawTable, Regularized};
