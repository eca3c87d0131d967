//! External model-serving proxy client
//!
//! All network interaction with the model-serving proxy lives here: a
//! resilient HTTP client (circuit breaker, retry, TTL cache, mock mode) plus
//! the wire types and response normalizers for the proxy's admin API.

pub mod client;
pub mod types;

pub use client::{ProxyClient, ProxyError};
pub use types::{
    DailyActivityDay, DailyActivityReport, GenerateKeyRequest, GeneratedKey, KeyInfo, ProxyModel,
    ProxyUserInfo,
};
