//! Screener Engine Library
//!
//! This library provides the core functionality of the abstract screener.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Database persistence module
pub mod db;

/// Catalog import module
pub mod catalog;

/// Document assignment and progress module
pub mod assignment;

/// Review session state machine
pub mod workflow;

/// Shared-secret access gate
pub mod access;

/// Interactive review console
pub mod console;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
