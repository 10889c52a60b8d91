//! Core application wiring: configuration and the dependency container.

pub mod config;
pub mod container;
pub mod timefmt;
