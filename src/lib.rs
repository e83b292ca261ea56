//! Deterministic DAG-execution engine for API-call workflows: validates a
//! workflow graph, orders it topologically, resolves per-step data flow
//! against user inputs and prior step outputs, dispatches the resulting HTTP
//! calls, and records per-step outcomes.
//!
//! The binary in `main.rs` is a thin CLI wrapper over this library; the
//! crate's surface is meant to be driven directly by integration tests and
//! by embedders that don't want a subprocess.

pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod executor;
pub mod loader;
pub mod path;
pub mod protocol;
pub mod scheduler;
pub mod state;
pub mod telemetry;
pub mod template;
pub mod validation;
