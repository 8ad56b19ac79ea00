//! Logging setup for the dmatrix binary and embedding applications

pub mod logging;

pub use logging::{init_production_logging, init_simple_logging};
