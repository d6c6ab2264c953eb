//! # dlpgate
//!
//! **Data loss prevention gateway built around an external scanning API.**
//!
//! dlpgate submits newly stored objects and changed host files to the
//! Nightfall scanning service, receives the signed scan results over
//! webhooks, tags sensitive objects, and gates later reads of those objects
//! by denying access or returning a redacted copy.
//!
//! ## Architecture
//!
//! - **[`handlers`]**: the five event handlers behind one [`handlers::Pipeline`]
//! - **[`scan`]**: chunked file upload and text scanning against the Nightfall API
//! - **[`webhook`]**: callback signature verification over canonical JSON
//! - **[`objects`]**: object store and tag sets (local filesystem + SQLite)
//! - **[`store`]**: SQLite pool and the upload correlation table
//! - **[`metrics`]**: counter metrics with JSON/CSV export
//! - **[`watcher`]**: recursive file-system watcher for host files
//! - **[`web`]**: axum routes for every trigger
//! - **[`config`]**: TOML configuration with environment fallback
//! - **[`cli`]**: command-line interface (clap)
//! - **[`error`]**: unified error type using `thiserror`
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a starter config
//! dlpgate init
//!
//! # Serve storage events, webhooks and object transforms
//! dlpgate serve
//!
//! # Scan changed files under /home
//! dlpgate watch /home
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod objects;
pub mod scan;
pub mod store;
pub mod watcher;
pub mod web;
pub mod webhook;
