#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod error;
pub mod telemetry;
pub mod ws;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Endpoint used when none is configured
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/ws";

/// Environment variable overriding [`DEFAULT_ENDPOINT`]
pub const ENDPOINT_VAR: &str = "TELEMETRY_WS_URL";
