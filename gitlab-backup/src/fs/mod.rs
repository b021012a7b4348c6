//! File system helpers: archive files, staging permissions, repository discovery.

pub mod archives;
pub mod permissions;
pub mod walker;
