#![deny(clippy::all)]

pub mod commands;
pub mod error;
pub mod handlers;
pub mod telemetry;
