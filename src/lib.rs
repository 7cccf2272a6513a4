//! stackcheck: staged readiness verification for multi-service container deployments
//!
//! Confirms the expected containers are running, waits for warmup, probes service health,
//! API endpoints and one functional request, then persists a single verdict.

pub mod console;
pub mod core;
pub mod logging;
pub mod utils;
