//! Approval orchestration against the Wercker v3 REST API.
//!
//! Provides the authenticated API client, the response decoder, the
//! orchestrator that walks a commit's runs to a pending manual gate, and the
//! outcome report.

pub mod client;
pub mod decode;
pub mod orchestrator;
pub mod report;
