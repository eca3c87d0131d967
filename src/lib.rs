//! # LLM Admin Control Plane
//!
//! Administrative control plane for LLM backends served through an external
//! model-serving proxy: model catalog synchronization, subscription
//! governance, and multi-model API key lifecycle management.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod proxy;
pub mod repositories;
pub mod server;
pub mod services;
pub mod telemetry;
pub use migration;
