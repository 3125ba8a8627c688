// Library root: configuration, catalog import and the allocation scheduler,
// exposed so integration tests can drive them directly.

pub mod catalog;
pub mod config;
pub mod scheduler;
