#![deny(warnings)]

//! LLM-backed deliberation for one business cycle.
//!
//! Three components, consumed in sequence by the orchestrator:
//! - [`executive`]: the CEO-plus-officers decision workflow.
//! - [`impact`]: the critique + outcome narrative pipeline.
//! - [`kpi`]: the per-KPI impact calculator.

pub mod executive;
pub mod impact;
pub mod kpi;
