//! Skill CLI library - command implementations and app wiring.
//!
//! This crate provides the core functionality for the `skill` binary: the
//! binary itself (`main.rs`) is a thin `clap` dispatch shim over the
//! command handlers declared here.

pub mod app;
pub mod commands;
