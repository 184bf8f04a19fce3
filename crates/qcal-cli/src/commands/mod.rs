//! CLI command implementations.

pub mod common;
pub mod node;
pub mod ramsey;
pub mod state;
pub mod version;
