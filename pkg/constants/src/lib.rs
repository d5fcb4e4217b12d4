//! Centralized constants for the poolrs project.
//!
//! All project-wide constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod conditions;
pub mod namespaces;
pub mod network;
pub mod paths;
pub mod pool;
pub mod state;
