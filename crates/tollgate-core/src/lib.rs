//! Core types, configuration, and error handling for tollgate.
//!
//! This crate provides the shared foundation used by the other tollgate crates:
//! - [`TollgateError`]: unified error type using `thiserror`
//! - [`TollgateConfig`]: configuration loaded from `.tollgate.toml`
//! - Flat response records for each build-service endpoint: [`Application`],
//!   [`RunSummary`], [`RunDetail`], [`TriggerResponse`]
//! - Request bodies: [`TriggerRequest`], [`ApprovalRequest`]

mod config;
mod error;
mod types;

pub use config::{ServiceConfig, TollgateConfig};
pub use error::TollgateError;
pub use types::{
    Application, ApprovalRequest, OutputFormat, PipelineRef, RunDetail, RunSummary, SourceRunRef,
    TriggerRequest, TriggerResponse, WorkflowItem, PENDING_APPROVAL, RESULT_PASSED,
};

/// A convenience `Result` type for tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
