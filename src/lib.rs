//! SafeguardMedia Job Tracker
//!
//! This library provides the client side of the SafeguardMedia verification
//! pipelines: submitting long-running jobs to the verification backend,
//! polling or streaming their status to a terminal state, and mapping the
//! final snapshot onto a result view.

pub mod config;
pub mod error;
pub mod flows;
pub mod models;
pub mod sandbox;
pub mod services;
pub mod telemetry;
pub mod tracking;
