//! Foundational types shared by every other module: errors, configuration,
//! and the data model from §3.

pub mod config;
pub mod errors;
pub mod types;
