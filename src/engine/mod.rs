//! Core engine: rate → ladder → orders → sweep.

pub mod ladder;
pub mod lifecycle;
pub mod oracle;
pub mod program;
pub mod tracker;
