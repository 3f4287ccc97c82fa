//! CSV input and validation for the sylva command line.

mod error;
mod reader;

pub use error::IoError;
pub use reader::{FeatureReader, FeatureTable, TargetColumn, encode_labels};
