use std::io::Write;

use tollgate_core::{RunSummary, TollgateError, TriggerRequest};
use tracing::{debug, info};

use crate::client::BuildService;
use crate::report::{render_response, Outcome};

/// The run to look for and how to trigger a replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalTarget {
    /// User or organization owning the application.
    pub username: String,
    /// Application name.
    pub application: String,
    /// Name of the manually-gated pipeline.
    pub pipeline: String,
    /// Commit whose run should be approved.
    pub commit_hash: String,
    /// Branch for a triggered run.
    pub branch: String,
    /// Message for a triggered run.
    pub trigger_message: String,
}

/// Facts gathered so far in one invocation.
///
/// Each step takes the session and hands back an extended copy; fields are
/// only ever filled in, never cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Resolved application ID.
    pub app_id: String,
    /// Manual-approval pipeline seen during the scan.
    pub pipeline_id: String,
    /// Upstream run of the last matching run scanned.
    pub source_id: String,
    /// Run being approved.
    pub run_id: String,
    /// Whether any matching run belonged to a manual-approval pipeline.
    pub has_manual: bool,
}

enum Scan {
    Approved(Outcome),
    NoPending(Session),
}

/// Drives lookup, scan, and trigger/approve for one commit.
///
/// Progress lines are written to `out` as each step completes.
pub struct Orchestrator<S, W> {
    service: S,
    target: ApprovalTarget,
    out: W,
}

impl<S: BuildService, W: Write> Orchestrator<S, W> {
    /// Create an orchestrator over `service`, reporting progress to `out`.
    pub fn new(service: S, target: ApprovalTarget, out: W) -> Self {
        Self {
            service,
            target,
            out,
        }
    }

    /// The build service in use.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Consume the orchestrator and return its progress writer.
    pub fn into_output(self) -> W {
        self.out
    }

    /// Find the gated run for the target commit and approve it, triggering a
    /// new run first if none is waiting.
    ///
    /// When several runs match, the first in list order decides.
    ///
    /// # Errors
    ///
    /// - [`TollgateError::Lookup`] if the application or run list cannot be fetched.
    /// - [`TollgateError::Gate`] if the pending run's upstream run did not pass.
    /// - [`TollgateError::NotFound`] if no matching run has manual approval.
    /// - [`TollgateError::MissingRunId`] if a trigger returns no run.
    /// - Any transport or decode error from fetching, triggering, or approving.
    pub async fn run(&mut self) -> Result<Outcome, TollgateError> {
        let session = self.resolve_application(Session::default()).await?;
        let runs = self.list_runs(&session).await?;
        match self.scan(session, &runs).await? {
            Scan::Approved(outcome) => Ok(outcome),
            Scan::NoPending(session) => self.trigger_and_approve(session).await,
        }
    }

    async fn resolve_application(&mut self, session: Session) -> Result<Session, TollgateError> {
        let target = &self.target;
        let app = self
            .service
            .application(&target.username, &target.application)
            .await
            .map_err(|e| {
                TollgateError::lookup(
                    format!("application {}/{}", target.username, target.application),
                    e,
                )
            })?;
        debug!(app_id = %app.id, "resolved application");
        writeln!(
            self.out,
            "{} ({}) pipeline={} commitHash={}",
            target.application, app.id, target.pipeline, target.commit_hash
        )?;
        Ok(Session {
            app_id: app.id,
            ..session
        })
    }

    async fn list_runs(&self, session: &Session) -> Result<Vec<RunSummary>, TollgateError> {
        let commit_hash = &self.target.commit_hash;
        let runs = self
            .service
            .runs(&session.app_id, commit_hash)
            .await
            .map_err(|e| TollgateError::lookup(format!("runs for commit {commit_hash}"), e))?;
        debug!(count = runs.len(), "listed runs");
        Ok(runs)
    }

    async fn scan(
        &mut self,
        mut session: Session,
        runs: &[RunSummary],
    ) -> Result<Scan, TollgateError> {
        let commit_hash = self.target.commit_hash.clone();
        let pipeline = self.target.pipeline.clone();

        for summary in runs.iter().filter(|r| r.matches(&commit_hash, &pipeline)) {
            // List entries lack the manual flag and source run.
            let run = self.service.run(&summary.id).await?;
            session.source_id = run.source_id().to_string();

            writeln!(
                self.out,
                "runId={} pipeline={} ({}) status={}",
                run.id, run.pipeline.pipeline_name, run.pipeline.id, run.status
            )?;

            if !run.is_manual_for(&pipeline) {
                continue;
            }
            session.has_manual = true;
            session.pipeline_id = run.pipeline.id.clone();

            if !run.is_pending_approval() {
                debug!(run_id = %run.id, status = %run.status, "run is not pending approval");
                continue;
            }
            if !run.source_passed() {
                return Err(TollgateError::Gate(
                    "previous pipeline didn't pass so approval is not done".into(),
                ));
            }

            session.run_id = run.id;
            self.approve(&session).await?;
            return Ok(Scan::Approved(Outcome::Approved {
                run_id: session.run_id,
                pipeline_id: session.pipeline_id,
            }));
        }

        if !session.has_manual {
            return Err(TollgateError::NotFound(
                "approval pipeline does not exist for this run".into(),
            ));
        }
        Ok(Scan::NoPending(session))
    }

    async fn trigger_and_approve(&mut self, mut session: Session) -> Result<Outcome, TollgateError> {
        writeln!(
            self.out,
            "There is no pending approval: so trigger the pipeline again"
        )?;

        let request = TriggerRequest {
            pipeline_id: session.pipeline_id.clone(),
            message: self.target.trigger_message.clone(),
            branch: self.target.branch.clone(),
            commit_hash: self.target.commit_hash.clone(),
            source_run_id: session.source_id.clone(),
        };
        info!(pipeline_id = %request.pipeline_id, branch = %request.branch, "triggering new run");
        let response = self.service.trigger(&request).await?;
        session.run_id = response
            .run_id()
            .ok_or(TollgateError::MissingRunId)?
            .to_string();

        writeln!(
            self.out,
            "Triggered pipeline={} ({}), runID={}",
            self.target.pipeline, session.pipeline_id, session.run_id
        )?;
        self.approve(&session).await?;

        Ok(Outcome::TriggeredAndApproved {
            run_id: session.run_id,
            pipeline_id: session.pipeline_id,
            source_run_id: session.source_id,
        })
    }

    async fn approve(&mut self, session: &Session) -> Result<(), TollgateError> {
        info!(run_id = %session.run_id, "approving run");
        let receipt = self.service.approve(&session.run_id).await?;
        writeln!(
            self.out,
            "Approved pipeline={} ({}), runID={}",
            self.target.pipeline, session.pipeline_id, session.run_id
        )?;
        if let Some(text) = render_response(&receipt.url, &receipt.body) {
            writeln!(self.out, "{text}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use tollgate_core::{
        Application, PipelineRef, RunDetail, SourceRunRef, TriggerResponse, WorkflowItem,
    };

    use super::*;
    use crate::client::ApprovalReceipt;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Application(String, String),
        Runs(String, String),
        Run(String),
        Trigger(TriggerRequest),
        Approve(String),
    }

    #[derive(Default)]
    struct FakeService {
        application: Option<Application>,
        fail_runs: bool,
        runs: Vec<RunSummary>,
        details: HashMap<String, RunDetail>,
        trigger_run_id: Option<String>,
        calls: Mutex<Vec<Call>>,
    }

    impl FakeService {
        fn new() -> Self {
            Self {
                application: Some(Application {
                    id: "app1".into(),
                    name: "demo".into(),
                    ..Application::default()
                }),
                trigger_run_id: Some("r-new".into()),
                ..Self::default()
            }
        }

        fn with_run(mut self, summary: RunSummary, detail: RunDetail) -> Self {
            self.details.insert(summary.id.clone(), detail);
            self.runs.push(summary);
            self
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn approvals(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Approve(id) => Some(id),
                    _ => None,
                })
                .collect()
        }

        fn triggers(&self) -> Vec<TriggerRequest> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Trigger(req) => Some(req),
                    _ => None,
                })
                .collect()
        }
    }

    impl BuildService for FakeService {
        async fn application(
            &self,
            username: &str,
            application: &str,
        ) -> Result<Application, TollgateError> {
            self.record(Call::Application(username.into(), application.into()));
            self.application
                .clone()
                .ok_or_else(|| TollgateError::Transport("connection refused".into()))
        }

        async fn runs(
            &self,
            application_id: &str,
            commit_hash: &str,
        ) -> Result<Vec<RunSummary>, TollgateError> {
            self.record(Call::Runs(application_id.into(), commit_hash.into()));
            if self.fail_runs {
                return Err(TollgateError::Http {
                    status: 500,
                    body: "boom".into(),
                });
            }
            Ok(self.runs.clone())
        }

        async fn run(&self, run_id: &str) -> Result<RunDetail, TollgateError> {
            self.record(Call::Run(run_id.into()));
            self.details.get(run_id).cloned().ok_or(TollgateError::Http {
                status: 404,
                body: "no such run".into(),
            })
        }

        async fn trigger(
            &self,
            request: &TriggerRequest,
        ) -> Result<TriggerResponse, TollgateError> {
            self.record(Call::Trigger(request.clone()));
            let workflow_items = self
                .trigger_run_id
                .iter()
                .map(|id| WorkflowItem {
                    run_id: id.clone(),
                    pipeline_id: request.pipeline_id.clone(),
                    status: "new".into(),
                })
                .collect();
            Ok(TriggerResponse {
                id: "t1".into(),
                workflow_items,
            })
        }

        async fn approve(&self, run_id: &str) -> Result<ApprovalReceipt, TollgateError> {
            self.record(Call::Approve(run_id.into()));
            Ok(ApprovalReceipt {
                url: "https://app.wercker.com/api/v3/trigger/runs/approve".into(),
                body: br#"{"success":true}"#.to_vec(),
            })
        }
    }

    fn target() -> ApprovalTarget {
        ApprovalTarget {
            username: "alice".into(),
            application: "demo".into(),
            pipeline: "deploy".into(),
            commit_hash: "abc123".into(),
            branch: "master".into(),
            trigger_message: "auto-triggered-002".into(),
        }
    }

    fn summary(id: &str, commit_hash: &str, pipeline_name: &str) -> RunSummary {
        RunSummary {
            id: id.into(),
            commit_hash: commit_hash.into(),
            pipeline: PipelineRef {
                pipeline_name: pipeline_name.into(),
                ..PipelineRef::default()
            },
            ..RunSummary::default()
        }
    }

    fn detail(id: &str, manual: bool, status: &str, source_result: &str) -> RunDetail {
        RunDetail {
            id: id.into(),
            commit_hash: "abc123".into(),
            status: status.into(),
            pipeline: PipelineRef {
                id: "p1".into(),
                name: "deploy".into(),
                pipeline_name: "deploy".into(),
                manual_approval: manual,
            },
            source_run: Some(SourceRunRef {
                id: format!("src-{id}"),
                status: "finished".into(),
                result: source_result.into(),
            }),
            ..RunDetail::default()
        }
    }

    fn output(orchestrator: Orchestrator<FakeService, Vec<u8>>) -> String {
        String::from_utf8(orchestrator.into_output()).unwrap()
    }

    #[tokio::test]
    async fn approves_pending_run_exactly_once() {
        let service = FakeService::new().with_run(
            summary("r1", "abc123", "deploy"),
            detail("r1", true, "pendingapproval", "passed"),
        );
        let mut orchestrator = Orchestrator::new(service, target(), Vec::<u8>::new());

        let outcome = orchestrator.run().await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Approved {
                run_id: "r1".into(),
                pipeline_id: "p1".into(),
            }
        );
        assert_eq!(orchestrator.service().approvals(), vec!["r1".to_string()]);
        assert!(orchestrator.service().triggers().is_empty());

        let out = output(orchestrator);
        assert!(out.contains("demo (app1) pipeline=deploy commitHash=abc123"));
        assert!(out.contains("runId=r1 pipeline=deploy (p1) status=pendingapproval"));
        assert!(out.contains("Approved pipeline=deploy (p1), runID=r1"));
        assert!(out.contains("Request: URL is https://app.wercker.com/api/v3/trigger/runs/approve"));
        assert!(out.contains("\"success\": true"));
    }

    #[tokio::test]
    async fn failed_source_run_blocks_approval() {
        let service = FakeService::new().with_run(
            summary("r1", "abc123", "deploy"),
            detail("r1", true, "pendingapproval", "failed"),
        );
        let mut orchestrator = Orchestrator::new(service, target(), Vec::<u8>::new());

        let err = orchestrator.run().await.unwrap_err();

        assert!(matches!(err, TollgateError::Gate(_)));
        assert!(err.to_string().contains("previous pipeline didn't pass"));
        assert!(orchestrator.service().approvals().is_empty());
        assert!(orchestrator.service().triggers().is_empty());
    }

    #[tokio::test]
    async fn no_manual_pipeline_is_not_found_without_writes() {
        let service = FakeService::new()
            .with_run(
                summary("r1", "abc123", "deploy"),
                detail("r1", false, "finished", "passed"),
            )
            .with_run(
                summary("r2", "abc123", "deploy"),
                detail("r2", false, "pendingapproval", "passed"),
            );
        let mut orchestrator = Orchestrator::new(service, target(), Vec::<u8>::new());

        let err = orchestrator.run().await.unwrap_err();

        assert!(matches!(err, TollgateError::NotFound(_)));
        assert_eq!(
            err.to_string(),
            "approval pipeline does not exist for this run"
        );
        assert!(orchestrator.service().approvals().is_empty());
        assert!(orchestrator.service().triggers().is_empty());
    }

    #[tokio::test]
    async fn empty_run_list_is_not_found() {
        let mut orchestrator = Orchestrator::new(FakeService::new(), target(), Vec::<u8>::new());

        let err = orchestrator.run().await.unwrap_err();

        assert!(matches!(err, TollgateError::NotFound(_)));
    }

    #[tokio::test]
    async fn triggers_then_approves_when_nothing_pending() {
        let service = FakeService::new()
            .with_run(
                summary("r1", "abc123", "deploy"),
                detail("r1", true, "finished", "passed"),
            )
            .with_run(
                summary("r2", "abc123", "deploy"),
                detail("r2", true, "running", "passed"),
            );
        let mut orchestrator = Orchestrator::new(service, target(), Vec::<u8>::new());

        let outcome = orchestrator.run().await.unwrap();

        assert_eq!(
            outcome,
            Outcome::TriggeredAndApproved {
                run_id: "r-new".into(),
                pipeline_id: "p1".into(),
                source_run_id: "src-r2".into(),
            }
        );
        assert_eq!(
            orchestrator.service().triggers(),
            vec![TriggerRequest {
                pipeline_id: "p1".into(),
                message: "auto-triggered-002".into(),
                branch: "master".into(),
                commit_hash: "abc123".into(),
                source_run_id: "src-r2".into(),
            }]
        );
        assert_eq!(
            orchestrator.service().approvals(),
            vec!["r-new".to_string()]
        );

        let calls = orchestrator.service().calls();
        let trigger_at = calls
            .iter()
            .position(|c| matches!(c, Call::Trigger(_)))
            .unwrap();
        let approve_at = calls
            .iter()
            .position(|c| matches!(c, Call::Approve(_)))
            .unwrap();
        assert!(trigger_at < approve_at);

        let out = output(orchestrator);
        assert!(out.contains("There is no pending approval: so trigger the pipeline again"));
        assert!(out.contains("Triggered pipeline=deploy (p1), runID=r-new"));
    }

    #[tokio::test]
    async fn application_failure_short_circuits() {
        let service = FakeService {
            application: None,
            ..FakeService::new()
        };
        let mut orchestrator = Orchestrator::new(service, target(), Vec::<u8>::new());

        let err = orchestrator.run().await.unwrap_err();

        match &err {
            TollgateError::Lookup { target, source } => {
                assert_eq!(target, "application alice/demo");
                assert!(matches!(**source, TollgateError::Transport(_)));
            }
            other => panic!("expected lookup error, got {other:?}"),
        }
        assert_eq!(
            orchestrator.service().calls(),
            vec![Call::Application("alice".into(), "demo".into())]
        );
    }

    #[tokio::test]
    async fn run_list_failure_is_lookup_error() {
        let service = FakeService {
            fail_runs: true,
            ..FakeService::new()
        };
        let mut orchestrator = Orchestrator::new(service, target(), Vec::<u8>::new());

        let err = orchestrator.run().await.unwrap_err();

        match err {
            TollgateError::Lookup { target, .. } => {
                assert_eq!(target, "runs for commit abc123")
            }
            other => panic!("expected lookup error, got {other:?}"),
        }
        assert_eq!(
            orchestrator.service().calls(),
            vec![
                Call::Application("alice".into(), "demo".into()),
                Call::Runs("app1".into(), "abc123".into()),
            ]
        );
    }

    #[tokio::test]
    async fn runs_for_other_commits_or_pipelines_are_not_fetched() {
        let service = FakeService::new()
            .with_run(
                summary("r1", "fff000", "deploy"),
                detail("r1", true, "pendingapproval", "passed"),
            )
            .with_run(
                summary("r2", "abc123", "build"),
                detail("r2", true, "pendingapproval", "passed"),
            );
        let mut orchestrator = Orchestrator::new(service, target(), Vec::<u8>::new());

        let err = orchestrator.run().await.unwrap_err();

        assert!(matches!(err, TollgateError::NotFound(_)));
        assert!(!orchestrator
            .service()
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Run(_))));
    }

    #[tokio::test]
    async fn first_pending_run_in_list_order_wins() {
        let service = FakeService::new()
            .with_run(
                summary("r1", "abc123", "deploy"),
                detail("r1", true, "pendingapproval", "passed"),
            )
            .with_run(
                summary("r2", "abc123", "deploy"),
                detail("r2", true, "pendingapproval", "passed"),
            );
        let mut orchestrator = Orchestrator::new(service, target(), Vec::<u8>::new());

        let outcome = orchestrator.run().await.unwrap();

        assert_eq!(outcome.run_id(), "r1");
        assert_eq!(orchestrator.service().approvals(), vec!["r1".to_string()]);
        assert!(!orchestrator
            .service()
            .calls()
            .contains(&Call::Run("r2".into())));
    }

    #[tokio::test]
    async fn trigger_without_run_id_does_not_approve() {
        let service = FakeService {
            trigger_run_id: None,
            ..FakeService::new()
        }
        .with_run(
            summary("r1", "abc123", "deploy"),
            detail("r1", true, "finished", "passed"),
        );
        let mut orchestrator = Orchestrator::new(service, target(), Vec::<u8>::new());

        let err = orchestrator.run().await.unwrap_err();

        assert!(matches!(err, TollgateError::MissingRunId));
        assert_eq!(orchestrator.service().triggers().len(), 1);
        assert!(orchestrator.service().approvals().is_empty());
    }

    #[tokio::test]
    async fn detail_fetch_failure_propagates() {
        let mut service = FakeService::new().with_run(
            summary("r1", "abc123", "deploy"),
            detail("r1", true, "pendingapproval", "passed"),
        );
        service.details.clear();
        let mut orchestrator = Orchestrator::new(service, target(), Vec::<u8>::new());

        let err = orchestrator.run().await.unwrap_err();

        assert!(matches!(err, TollgateError::Http { status: 404, .. }));
        assert!(orchestrator.service().approvals().is_empty());
    }
}
