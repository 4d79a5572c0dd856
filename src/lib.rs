//! Tollgate - Per-Client HTTP Admission Control
//!
//! This crate implements a per-client admission-control layer for HTTP APIs.
//! Every inbound request is attributed to a client key (derived from proxy
//! headers or the transport address) and charged against a set of token
//! buckets held in a bounded, idle-expiring in-process store. Requests that
//! exhaust their quota receive a structured 429 response without reaching
//! the downstream handler.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
