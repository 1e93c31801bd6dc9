//! Common test utilities for ota-dl HTTP tests

#[allow(dead_code)]
pub mod config;
#[allow(dead_code)]
pub mod events;
#[allow(dead_code)]
pub mod fetchers;

pub use config::*;
#[allow(unused_imports)]
pub use events::*;
#[allow(unused_imports)]
pub use fetchers::*;
