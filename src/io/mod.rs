//! Input/output helpers.
//!
//! - delimited-text ingest into a `DataSet` (`ingest`)
//! - JSON result export (`export`)
//! - LaTeX table file (`table`)

pub mod export;
pub mod ingest;
pub mod table;

pub use export::*;
pub use ingest::*;
pub use table::*;
