//! Decoding of raw response bodies into typed records.

use serde::de::DeserializeOwned;
use tollgate_core::{Application, RunDetail, RunSummary, TollgateError, TriggerResponse};

/// Decode `body` as JSON into `T`, naming the record as `what` on failure.
///
/// # Errors
///
/// Returns [`TollgateError::Decode`] if the body is not valid JSON for `T`.
///
/// # Examples
///
/// ```
/// use tollgate_approve::decode::decode;
/// use tollgate_core::Application;
///
/// let app: Application = decode("application", br#"{"id": "a1"}"#).unwrap();
/// assert_eq!(app.id, "a1");
/// assert!(decode::<Application>("application", b"<html>").is_err());
/// ```
pub fn decode<T: DeserializeOwned>(what: &str, body: &[u8]) -> Result<T, TollgateError> {
    serde_json::from_slice(body).map_err(|e| TollgateError::decode(what, e))
}

/// Decode an application record.
pub fn application(body: &[u8]) -> Result<Application, TollgateError> {
    decode("application", body)
}

/// Decode a run list.
pub fn runs(body: &[u8]) -> Result<Vec<RunSummary>, TollgateError> {
    decode("run list", body)
}

/// Decode a full run record.
pub fn run(body: &[u8]) -> Result<RunDetail, TollgateError> {
    decode("run", body)
}

/// Decode a trigger response.
pub fn trigger(body: &[u8]) -> Result<TriggerResponse, TollgateError> {
    decode("trigger response", body)
}
