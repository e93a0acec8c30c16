//! Menucache library
//!
//! Dining court menus and nutrition facts behind a two-tier TTL cache, plus a
//! day-scoped client cache and food rankings. The binary in `main.rs` is a thin
//! command-line front end over these modules.

pub mod cache;
pub mod cli;
pub mod config;
pub mod daily;
pub mod data;
pub mod ranking;
pub mod report;
pub mod service;
pub mod sweep;
