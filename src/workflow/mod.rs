//! The fixed multi-party signing workflow.
//!
//! `Step` enumerates the twelve ordered steps and knows how each maps onto
//! its demo script; `StepOrchestrator` is the façade that gates, executes,
//! extracts and records.

pub mod orchestrator;
pub mod step;
pub mod template;

pub use orchestrator::{StepOrchestrator, StepReport, WorkflowError};
pub use step::Step;
pub use template::{TemplateInstaller, TemplateReport};
