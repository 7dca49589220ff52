//! Runnable ride coordination server.
//!
//! Wires the in-process services from `rideshare-runtime` behind the
//! `rideshare-web` router:
//!
//! - [`config`]: environment-driven settings
//! - [`identity`]: static token table standing in for an identity provider
//! - [`app`]: state construction, the idle reaper and shutdown signals

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]

pub mod app;
pub mod config;
pub mod identity;

pub use config::Config;
pub use identity::{TokenEntry, TokenTable};
