use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Run status reported while a manual pipeline waits for sign-off.
pub const PENDING_APPROVAL: &str = "pendingapproval";

/// Run result that allows a downstream manual pipeline to proceed.
pub const RESULT_PASSED: &str = "passed";

/// Treat an explicit JSON `null` the same as a missing field.
///
/// Applied to every non-`Option` field of the response records, so one null
/// on an unrelated run cannot fail the whole list.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// An application owned by a user or organization.
///
/// Response of `GET /api/v3/applications/{username}/{application}`.
///
/// # Examples
///
/// ```
/// use tollgate_core::Application;
///
/// let app: Application = serde_json::from_str(r#"{"id": "5a1", "name": "demo"}"#).unwrap();
/// assert_eq!(app.id, "5a1");
/// assert!(app.created_at.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Application {
    /// Application ID used to filter runs.
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    /// Application name.
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    /// Web URL of the application.
    pub url: Option<String>,
    /// When the application was created.
    pub created_at: Option<DateTime<Utc>>,
}

/// The pipeline a run belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineRef {
    /// Pipeline ID, required to trigger a new run.
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    /// Display name of the pipeline.
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    /// Name of the pipeline as declared in the workflow.
    #[serde(deserialize_with = "nullable")]
    pub pipeline_name: String,
    /// Whether runs of this pipeline wait for manual approval.
    #[serde(deserialize_with = "nullable")]
    pub manual_approval: bool,
}

/// One entry of `GET /api/v3/runs?applicationId=..&commitHash=..`.
///
/// List entries are not fully populated; fetch [`RunDetail`] before deciding
/// anything about approval.
///
/// # Examples
///
/// ```
/// use tollgate_core::RunSummary;
///
/// let run: RunSummary = serde_json::from_str(r#"{
///     "id": "r1",
///     "commitHash": "abc123",
///     "pipeline": {"id": "p1", "name": "deploy", "pipelineName": "deploy"}
/// }"#).unwrap();
/// assert!(run.matches("abc123", "deploy"));
/// assert!(!run.matches("abc123", "build"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunSummary {
    /// Run ID.
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    /// Commit the run was started for.
    #[serde(deserialize_with = "nullable")]
    pub commit_hash: String,
    /// Branch the run was started for.
    #[serde(deserialize_with = "nullable")]
    pub branch: String,
    /// Current status, e.g. `running` or `pendingapproval`.
    #[serde(deserialize_with = "nullable")]
    pub status: String,
    /// Final result, e.g. `passed` or `failed`.
    #[serde(deserialize_with = "nullable")]
    pub result: String,
    /// Pipeline this run belongs to.
    #[serde(deserialize_with = "nullable")]
    pub pipeline: PipelineRef,
}

impl RunSummary {
    /// Whether this run was started for `commit_hash` by the pipeline named `pipeline_name`.
    pub fn matches(&self, commit_hash: &str, pipeline_name: &str) -> bool {
        self.commit_hash == commit_hash && self.pipeline.pipeline_name == pipeline_name
    }
}

/// The upstream run a run was chained from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceRunRef {
    /// Source run ID.
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    /// Source run status.
    #[serde(deserialize_with = "nullable")]
    pub status: String,
    /// Source run result; only `passed` lets approval go ahead.
    #[serde(deserialize_with = "nullable")]
    pub result: String,
}

/// Full run record from `GET /api/v3/runs/{id}`.
///
/// # Examples
///
/// ```
/// use tollgate_core::RunDetail;
///
/// let run: RunDetail = serde_json::from_str(r#"{
///     "id": "r2",
///     "status": "pendingapproval",
///     "pipeline": {"id": "p1", "name": "deploy", "pipelineName": "deploy", "manualApproval": true},
///     "sourceRun": {"id": "r1", "result": "passed"}
/// }"#).unwrap();
/// assert!(run.is_manual_for("deploy"));
/// assert!(run.is_pending_approval());
/// assert!(run.source_passed());
/// assert_eq!(run.source_id(), "r1");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunDetail {
    /// Run ID.
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    /// Commit the run was started for.
    #[serde(deserialize_with = "nullable")]
    pub commit_hash: String,
    /// Branch the run was started for.
    #[serde(deserialize_with = "nullable")]
    pub branch: String,
    /// Current status.
    #[serde(deserialize_with = "nullable")]
    pub status: String,
    /// Final result.
    #[serde(deserialize_with = "nullable")]
    pub result: String,
    /// Pipeline this run belongs to.
    #[serde(deserialize_with = "nullable")]
    pub pipeline: PipelineRef,
    /// Upstream run, absent for runs started directly.
    pub source_run: Option<SourceRunRef>,
    /// When the run was created.
    pub created_at: Option<DateTime<Utc>>,
    /// Web URL of the run.
    pub url: Option<String>,
}

impl RunDetail {
    /// Whether this run belongs to the manual-approval pipeline named `pipeline_name`.
    pub fn is_manual_for(&self, pipeline_name: &str) -> bool {
        self.pipeline.name == pipeline_name && self.pipeline.manual_approval
    }

    /// Whether the run is waiting for approval.
    pub fn is_pending_approval(&self) -> bool {
        self.status == PENDING_APPROVAL
    }

    /// Upstream run ID, or `""` when there is none.
    pub fn source_id(&self) -> &str {
        self.source_run.as_ref().map_or("", |s| s.id.as_str())
    }

    /// Upstream run result, or `""` when there is none.
    pub fn source_result(&self) -> &str {
        self.source_run.as_ref().map_or("", |s| s.result.as_str())
    }

    /// Whether the upstream run passed.
    pub fn source_passed(&self) -> bool {
        self.source_result() == RESULT_PASSED
    }
}

/// Body of `POST /api/v3/runs`.
///
/// # Examples
///
/// ```
/// use tollgate_core::TriggerRequest;
///
/// let req = TriggerRequest {
///     pipeline_id: "p1".into(),
///     message: "auto".into(),
///     branch: "master".into(),
///     commit_hash: "abc".into(),
///     source_run_id: "r1".into(),
/// };
/// let json = serde_json::to_value(&req).unwrap();
/// assert_eq!(json["pipelineId"], "p1");
/// assert_eq!(json["sourceRunId"], "r1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    /// Pipeline to start.
    pub pipeline_id: String,
    /// Message shown on the new run.
    pub message: String,
    /// Branch to run on.
    pub branch: String,
    /// Commit to run.
    pub commit_hash: String,
    /// Upstream run the new run is chained from.
    pub source_run_id: String,
}

/// Body of `POST /api/v3/trigger/runs/approve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    /// Run to approve.
    pub run_id: String,
}

/// One step of the workflow started by a trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowItem {
    /// Run created for this step.
    pub run_id: String,
    /// Pipeline the step runs.
    pub pipeline_id: String,
    /// Step status.
    pub status: String,
}

/// Response of `POST /api/v3/runs`, flattened from the workflow envelope.
///
/// # Examples
///
/// ```
/// use tollgate_core::TriggerResponse;
///
/// let resp: TriggerResponse = serde_json::from_str(r#"{
///     "id": "t1",
///     "workflow": {"items": [{"data": {"runId": "r9", "pipelineId": "p1"}, "status": "new"}]}
/// }"#).unwrap();
/// assert_eq!(resp.run_id(), Some("r9"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "TriggerWire")]
pub struct TriggerResponse {
    /// ID of the triggered run record.
    pub id: String,
    /// Workflow steps, in the order the service listed them.
    pub workflow_items: Vec<WorkflowItem>,
}

impl TriggerResponse {
    /// Run ID of the first workflow step; that is the run to approve.
    pub fn run_id(&self) -> Option<&str> {
        self.workflow_items
            .first()
            .map(|item| item.run_id.as_str())
            .filter(|id| !id.is_empty())
    }
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct TriggerWire {
    #[serde(deserialize_with = "nullable")]
    id: String,
    #[serde(deserialize_with = "nullable")]
    workflow: WorkflowWire,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct WorkflowWire {
    #[serde(deserialize_with = "nullable")]
    items: Vec<WorkflowItemWire>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct WorkflowItemWire {
    #[serde(deserialize_with = "nullable")]
    data: WorkflowItemData,
    #[serde(deserialize_with = "nullable")]
    status: String,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WorkflowItemData {
    #[serde(deserialize_with = "nullable")]
    run_id: String,
    #[serde(deserialize_with = "nullable")]
    pipeline_id: String,
}

impl From<TriggerWire> for TriggerResponse {
    fn from(wire: TriggerWire) -> Self {
        Self {
            id: wire.id,
            workflow_items: wire
                .workflow
                .items
                .into_iter()
                .map(|item| WorkflowItem {
                    run_id: item.data.run_id,
                    pipeline_id: item.data.pipeline_id,
                    status: item.status,
                })
                .collect(),
        }
    }
}

/// Output format for the final outcome.
///
/// # Examples
///
/// ```
/// use tollgate_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable status lines.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
