//! Brume: a server-rendered micro-publishing service.
//!
//! Readers browse paginated feeds of short posts, optionally scoped to a
//! topic group or a single author; authors post, comment, and follow each
//! other. Identity is vouched for by a fronting auth proxy via a request
//! header.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
