use std::fmt;

use serde::Serialize;

/// How a successful invocation ended.
///
/// # Examples
///
/// ```
/// use tollgate_approve::report::Outcome;
///
/// let outcome = Outcome::Approved {
///     run_id: "r1".into(),
///     pipeline_id: "p1".into(),
/// };
/// assert_eq!(outcome.run_id(), "r1");
/// let json = serde_json::to_value(&outcome).unwrap();
/// assert_eq!(json["outcome"], "approved");
/// assert_eq!(json["runId"], "r1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome")]
pub enum Outcome {
    /// A run already waiting at the gate was approved.
    #[serde(rename = "approved", rename_all = "camelCase")]
    Approved {
        /// Approved run.
        run_id: String,
        /// Pipeline of the approved run.
        pipeline_id: String,
    },
    /// No run was waiting, so a new one was triggered and approved.
    #[serde(rename = "triggeredAndApproved", rename_all = "camelCase")]
    TriggeredAndApproved {
        /// Newly triggered and approved run.
        run_id: String,
        /// Pipeline that was triggered.
        pipeline_id: String,
        /// Upstream run the new run was chained from.
        source_run_id: String,
    },
}

impl Outcome {
    /// The run that ended up approved.
    pub fn run_id(&self) -> &str {
        match self {
            Outcome::Approved { run_id, .. } | Outcome::TriggeredAndApproved { run_id, .. } => {
                run_id
            }
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Approved { run_id, .. } => {
                write!(f, "Successfully approved the pending pipeline (runID={run_id}).")
            }
            Outcome::TriggeredAndApproved { run_id, .. } => {
                write!(
                    f,
                    "Successfully triggered and approved the pipeline (runID={run_id})."
                )
            }
        }
    }
}

/// Render a response body as a `Request:`/`Response:` block with pretty JSON.
///
/// Returns `None` when the body is not a JSON object.
///
/// # Examples
///
/// ```
/// use tollgate_approve::report::render_response;
///
/// let text = render_response("http://x/approve", br#"{"ok":true}"#).unwrap();
/// assert!(text.starts_with("Request: URL is http://x/approve"));
/// assert!(text.contains("\"ok\": true"));
/// assert!(render_response("http://x/approve", b"[]").is_none());
/// ```
pub fn render_response(url: &str, body: &[u8]) -> Option<String> {
    let data: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(body).ok()?;
    let pretty = serde_json::to_string_pretty(&data).ok()?;
    Some(format!("Request: URL is {url}\nResponse: {pretty}"))
}
