// Library root: the draft ranking core (ranked lists, reordering, window
// gating, snake allocation) plus its SQLite store and service facade.

pub mod db;
pub mod draft;
pub mod service;
