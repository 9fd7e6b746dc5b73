//! Job execution service
//!
//! Handles one job end to end:
//! - Validating the request and acquiring a private workspace
//! - Decrypting the credential and cloning the repository
//! - Writing the pipeline and running the container under its deadline
//! - Building the result and releasing the workspace
//!
//! Execution never fails from the caller's point of view: every fault is
//! reported inside the returned [`JobResult`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kiln_core::credential::CredentialCipher;
use kiln_core::domain::job::{JobErrorKind, JobRequest, JobResult};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{AgentConfig, ConfigError};
use crate::error::JobError;
use crate::git::{RepositoryCloner, redact_url};
use crate::runner::{ContainerRunner, RunError, RunOutcome, RunSpec};
use crate::runtime::ContainerRuntime;
use crate::service::plan::JobPlan;
use crate::workspace::{Workspace, WorkspaceManager};

/// Lifecycle of one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Init,
    WorkspaceReady,
    Cloning,
    Cloned,
    CloneFailed,
    ContainerRunning,
    Completed,
    TimedOut,
    RuntimeError,
    WorkspaceReleased,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobPhase::Init => "INIT",
            JobPhase::WorkspaceReady => "WORKSPACE_READY",
            JobPhase::Cloning => "CLONING",
            JobPhase::Cloned => "CLONED",
            JobPhase::CloneFailed => "CLONE_FAILED",
            JobPhase::ContainerRunning => "CONTAINER_RUNNING",
            JobPhase::Completed => "COMPLETED",
            JobPhase::TimedOut => "TIMED_OUT",
            JobPhase::RuntimeError => "RUNTIME_ERROR",
            JobPhase::WorkspaceReleased => "WORKSPACE_RELEASED",
        };
        f.write_str(name)
    }
}

/// Phases one job went through, in order
#[derive(Debug)]
struct PhaseTrace {
    job_id: i64,
    phases: Vec<JobPhase>,
}

impl PhaseTrace {
    fn new(job_id: i64) -> Self {
        let mut trace = Self {
            job_id,
            phases: Vec::new(),
        };
        trace.enter(JobPhase::Init);
        trace
    }

    fn enter(&mut self, phase: JobPhase) {
        debug!(job_id = self.job_id, phase = %phase, "Job phase changed");
        self.phases.push(phase);
    }
}

/// Service trait for executing jobs
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Executes one job to completion
    ///
    /// Never fails: faults are reported in the result.
    async fn execute(&self, request: JobRequest) -> JobResult;

    /// Runtime the executor drives containers with
    fn runtime(&self) -> Arc<dyn ContainerRuntime>;
}

/// Standard job executor
///
/// Holds no per-job state, so any number of jobs may run through one engine
/// concurrently.
pub struct JobEngine {
    config: Arc<AgentConfig>,
    cipher: CredentialCipher,
    workspaces: WorkspaceManager,
    cloner: RepositoryCloner,
    runner: ContainerRunner,
}

impl JobEngine {
    /// Creates an engine from validated configuration
    ///
    /// Fails when the configuration is invalid or the workspace root cannot
    /// be created.
    pub fn new(
        config: Arc<AgentConfig>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let cipher = config.credential_cipher()?;
        let workspaces = WorkspaceManager::new(&config.workspace_root).map_err(|source| {
            ConfigError::WorkspaceRoot {
                path: config.workspace_root.clone(),
                source,
            }
        })?;
        let cloner = RepositoryCloner::new(config.git_username.clone());
        let runner = ContainerRunner::new(runtime, config.max_output_bytes);

        Ok(Self {
            config,
            cipher,
            workspaces,
            cloner,
            runner,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn execute_traced(&self, request: JobRequest) -> (JobResult, Vec<JobPhase>) {
        let started_at = Utc::now();
        let job_id = request.job_id;
        let mut trace = PhaseTrace::new(job_id);

        info!(
            "Starting job {} (repository: {})",
            job_id,
            request
                .git_url
                .as_deref()
                .map(redact_url)
                .unwrap_or_else(|| "none".to_string())
        );

        let plan = match JobPlan::from_request(&request, &self.config) {
            Ok(plan) => plan,
            Err(e) => return (self.fault(job_id, e, started_at), trace.phases),
        };

        let workspace = match self.workspaces.acquire(job_id).await {
            Ok(workspace) => workspace,
            Err(e) => return (self.fault(job_id, e.into(), started_at), trace.phases),
        };
        trace.enter(JobPhase::WorkspaceReady);

        let outcome = self
            .run_in_workspace(&request, &plan, &workspace, &mut trace)
            .await;

        if let Err(e) = workspace.release().await {
            warn!("Job {}: {}", job_id, e);
        }
        trace.enter(JobPhase::WorkspaceReleased);

        let result = match outcome {
            Ok(outcome) => completed(job_id, outcome, started_at, Utc::now()),
            Err(e) => self.fault(job_id, e, started_at),
        };
        (result, trace.phases)
    }

    async fn run_in_workspace(
        &self,
        request: &JobRequest,
        plan: &JobPlan,
        workspace: &Workspace,
        trace: &mut PhaseTrace,
    ) -> Result<RunOutcome, JobError> {
        if let Some(url) = request.git_url.as_deref() {
            trace.enter(JobPhase::Cloning);
            if let Err(e) = self.clone_repository(request, url, workspace).await {
                trace.enter(JobPhase::CloneFailed);
                return Err(e);
            }
            trace.enter(JobPhase::Cloned);
        } else if request.encrypted_credential.is_some() {
            debug!("Job {} has a credential but no repository, ignoring it", request.job_id);
        }

        let pipeline_path = workspace
            .write_file(&self.config.pipeline_file, plan.pipeline.as_bytes())
            .await?;
        debug!("Wrote pipeline to {}", pipeline_path.display());

        let spec = RunSpec {
            job_id: request.job_id,
            image: plan.image.clone(),
            workspace: workspace.work_dir(),
            command: self.config.runner_command.clone(),
            env: plan.env.clone(),
            cpu_limit: plan.cpu_limit.clone(),
            memory_limit: plan.memory_limit.clone(),
            deadline: plan.deadline,
        };

        trace.enter(JobPhase::ContainerRunning);
        match self.runner.run(spec).await {
            Ok(outcome) => {
                trace.enter(JobPhase::Completed);
                Ok(outcome)
            }
            Err(e @ RunError::Timeout { .. }) => {
                trace.enter(JobPhase::TimedOut);
                Err(e.into())
            }
            Err(e) => {
                trace.enter(JobPhase::RuntimeError);
                Err(e.into())
            }
        }
    }

    /// Decrypts the credential, if any, and clones into the workspace
    ///
    /// A credential that cannot be decrypted aborts the job before any
    /// network access.
    async fn clone_repository(
        &self,
        request: &JobRequest,
        url: &str,
        workspace: &Workspace,
    ) -> Result<(), JobError> {
        let credential = match request.encrypted_credential.as_deref() {
            Some(token) if !token.trim().is_empty() => Some(self.cipher.decrypt(token)?),
            _ => None,
        };

        self.cloner
            .clone_into(url, request.branch(), credential, &workspace.repo_dir())
            .await?;
        Ok(())
    }

    fn fault(&self, job_id: i64, err: JobError, started_at: DateTime<Utc>) -> JobResult {
        let kind = err.kind();
        match kind {
            JobErrorKind::InvalidRequest | JobErrorKind::Pipeline => {
                warn!("Job {} rejected: {}", job_id, err)
            }
            _ => error!("Job {} failed ({}): {}", job_id, kind, err),
        }

        let partial = err.partial_output().cloned().unwrap_or_default();
        JobResult::faulted(
            job_id,
            kind,
            err.to_string(),
            partial.stdout,
            partial.stderr,
            started_at,
            Utc::now(),
        )
        .with_truncation(partial.truncated)
    }
}

fn completed(
    job_id: i64,
    outcome: RunOutcome,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
) -> JobResult {
    let result = JobResult::completed(
        job_id,
        outcome.exit_code,
        outcome.output.stdout,
        outcome.output.stderr,
        outcome.output.truncated,
        started_at,
        completed_at,
    );
    info!(
        "Job {} completed with exit code {} in {:.2}s",
        job_id, outcome.exit_code, result.duration_seconds
    );
    result
}

#[async_trait]
impl JobExecutor for JobEngine {
    async fn execute(&self, request: JobRequest) -> JobResult {
        self.execute_traced(request).await.0
    }

    fn runtime(&self) -> Arc<dyn ContainerRuntime> {
        Arc::clone(self.runner.runtime())
    }
}

/// Runs a job on its own task
///
/// A panic inside the job is reported as an internal fault rather than
/// tearing down the caller.
pub async fn spawn_job(executor: Arc<dyn JobExecutor>, request: JobRequest) -> JobResult {
    let job_id = request.job_id;
    let started_at = Utc::now();

    match tokio::spawn(async move { executor.execute(request).await }).await {
        Ok(result) => result,
        Err(e) => {
            error!("Job {} task failed: {}", job_id, e);
            JobResult::faulted(
                job_id,
                JobErrorKind::Internal,
                format!("Job task failed: {}", e),
                String::new(),
                String::new(),
                started_at,
                Utc::now(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::tests::init_repo;
    use crate::testing::{FakeRun, FakeRuntime};
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use std::path::Path;

    const IMAGE: &str = "alpine:3";

    struct Harness {
        _root: tempfile::TempDir,
        root_path: std::path::PathBuf,
        key: String,
        engine: Arc<JobEngine>,
        fake: Arc<FakeRuntime>,
    }

    impl Harness {
        fn new(fake: FakeRuntime) -> Self {
            let root = tempfile::tempdir().unwrap();
            let key = CredentialCipher::generate_key();
            let mut config = AgentConfig::new(key.clone(), "api-key");
            config.workspace_root = root.path().join("jobs");
            config.default_image = IMAGE.to_string();

            let fake = Arc::new(fake.with_image(IMAGE));
            let engine = JobEngine::new(Arc::new(config), fake.clone()).unwrap();
            Self {
                root_path: root.path().join("jobs"),
                _root: root,
                key,
                engine: Arc::new(engine),
                fake,
            }
        }

        fn encrypt(&self, plaintext: &str) -> String {
            CredentialCipher::new(&self.key).unwrap().encrypt(plaintext)
        }

        fn leftover_workspaces(&self) -> usize {
            std::fs::read_dir(&self.root_path).unwrap().count()
        }
    }

    fn request(job_id: i64, pipeline: &str) -> JobRequest {
        JobRequest::new(job_id, STANDARD.encode(pipeline))
    }

    fn listing(path: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(path)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    /// Script that reports what the container would see in its workspace
    fn echo_workspace(spec: &crate::runtime::ContainerSpec) -> FakeRun {
        let pipeline = std::fs::read_to_string(spec.workspace.join("pipeline.yaml"))
            .unwrap_or_default();
        FakeRun::exit(0)
            .stdout(&listing(&spec.workspace).join(","))
            .stderr(&pipeline)
    }

    #[tokio::test]
    async fn test_job_without_repository_sees_only_pipeline() {
        let h = Harness::new(FakeRuntime::new(echo_workspace));

        let (result, phases) = h.engine.execute_traced(request(1, "steps: []")).await;

        assert!(result.success, "{:?}", result);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout, "pipeline.yaml");
        assert_eq!(result.stderr, "steps: []");
        assert_eq!(
            phases,
            vec![
                JobPhase::Init,
                JobPhase::WorkspaceReady,
                JobPhase::ContainerRunning,
                JobPhase::Completed,
                JobPhase::WorkspaceReleased,
            ]
        );
        assert_eq!(h.leftover_workspaces(), 0);
        assert_eq!(h.fake.live_containers(), 0);
    }

    #[tokio::test]
    async fn test_container_receives_environment_and_command() {
        let h = Harness::new(FakeRuntime::new(|_| FakeRun::exit(0)));
        let mut req = request(2, "x");
        req.env_vars.insert("DEPLOY_ENV".into(), "staging".into());
        req.memory_limit = Some("64m".into());

        h.engine.execute(req).await;

        let spec = &h.fake.started()[0];
        assert_eq!(spec.env.get("DEPLOY_ENV").map(String::as_str), Some("staging"));
        assert_eq!(spec.env.get("KILN_WORKSPACE").map(String::as_str), Some("/workspace"));
        assert_eq!(spec.memory_limit.as_deref(), Some("64m"));
        assert_eq!(spec.command, vec!["kiln-runner", "run", "pipeline.yaml"]);
        assert_eq!(spec.image, IMAGE);
    }

    #[tokio::test]
    async fn test_success_tracks_exit_code() {
        let h = Harness::new(FakeRuntime::new(|_| FakeRun::exit(3).stderr("step failed\n")));

        let result = h.engine.execute(request(3, "x")).await;

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stderr, "step failed\n");
        assert!(result.error_kind.is_none());
    }

    #[tokio::test]
    async fn test_clone_places_pipeline_in_working_copy() {
        let origin = tempfile::tempdir().unwrap();
        init_repo(origin.path());
        let h = Harness::new(FakeRuntime::new(echo_workspace));

        let mut req = request(4, "steps: [build]");
        req.git_url = Some(origin.path().to_string_lossy().to_string());

        let (result, phases) = h.engine.execute_traced(req).await;

        assert!(result.success, "{:?}", result);
        assert_eq!(result.stdout, ".git,README.md,pipeline.yaml");
        assert!(phases.contains(&JobPhase::Cloned));
        assert_eq!(h.leftover_workspaces(), 0);
    }

    /// Commits `name` as a symlink to `target` on top of the fixture history
    #[cfg(unix)]
    fn commit_symlink(repo_dir: &Path, name: &str, target: &Path) {
        let repo = git2::Repository::open(repo_dir).unwrap();
        std::os::unix::fs::symlink(target, repo_dir.join(name)).unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let parent = repo.head().unwrap().peel_to_commit().unwrap();
        let sig = git2::Signature::now("Kiln Test", "test@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "add link", &tree, &[&parent])
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_committed_symlink_cannot_redirect_pipeline_write() {
        let outside = tempfile::tempdir().unwrap();
        let host_file = outside.path().join("host.txt");
        std::fs::write(&host_file, "original host content").unwrap();

        let origin = tempfile::tempdir().unwrap();
        init_repo(origin.path());
        commit_symlink(origin.path(), "pipeline.yaml", &host_file);
        let h = Harness::new(FakeRuntime::new(echo_workspace));

        let mut req = request(15, "steps: [deploy]");
        req.git_url = Some(origin.path().to_string_lossy().to_string());
        let result = h.engine.execute(req).await;

        assert!(result.success, "{:?}", result);
        assert_eq!(result.stderr, "steps: [deploy]");
        assert_eq!(
            std::fs::read_to_string(&host_file).unwrap(),
            "original host content"
        );
        assert_eq!(h.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_missing_repository_is_clone_fault() {
        let h = Harness::new(FakeRuntime::new(|_| FakeRun::exit(0)));
        let mut req = request(5, "x");
        req.git_url = Some("/nonexistent/kiln/repo".into());

        let (result, phases) = h.engine.execute_traced(req).await;

        assert!(!result.success);
        assert!(result.exit_code.is_none());
        assert_eq!(result.error_kind, Some(JobErrorKind::Clone));
        assert!(result.stderr.contains("Failed to clone repository"));
        assert!(phases.contains(&JobPhase::CloneFailed));
        assert_eq!(phases.last(), Some(&JobPhase::WorkspaceReleased));
        assert!(h.fake.started().is_empty());
        assert_eq!(h.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_undecryptable_credential_aborts_before_clone() {
        let origin = tempfile::tempdir().unwrap();
        init_repo(origin.path());
        let h = Harness::new(FakeRuntime::new(|_| FakeRun::exit(0)));

        let foreign = CredentialCipher::new(&CredentialCipher::generate_key()).unwrap();
        let mut req = request(6, "x");
        req.git_url = Some(origin.path().to_string_lossy().to_string());
        req.encrypted_credential = Some(foreign.encrypt("ghp_other"));

        let result = h.engine.execute(req).await;

        assert_eq!(result.error_kind, Some(JobErrorKind::Decryption));
        assert!(result.exit_code.is_none());
        assert!(!result.stderr.contains("ghp_other"));
        assert!(h.fake.started().is_empty());
        assert_eq!(h.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_credential_never_reaches_result_or_container() {
        let origin = tempfile::tempdir().unwrap();
        init_repo(origin.path());
        let h = Harness::new(FakeRuntime::new(|spec| {
            let config =
                std::fs::read_to_string(spec.workspace.join(".git").join("config")).unwrap();
            FakeRun::exit(0).stdout(&config)
        }));

        let mut req = request(7, "x");
        req.git_url = Some(origin.path().to_string_lossy().to_string());
        req.encrypted_credential = Some(h.encrypt("ghp_supersecret"));

        let result = h.engine.execute(req).await;

        assert!(result.success, "{:?}", result);
        assert!(!result.stdout.contains("ghp_supersecret"));
        assert!(!result.stderr.contains("ghp_supersecret"));
        let spec = &h.fake.started()[0];
        assert!(!spec.env.values().any(|v| v.contains("ghp_supersecret")));
    }

    #[tokio::test]
    async fn test_timeout_reports_fault_and_cleans_up() {
        let h = Harness::new(FakeRuntime::new(|_| FakeRun::hang().stdout("started\n")));
        let mut req = request(8, "x");
        req.timeout_seconds = Some(1);

        let (result, phases) = h.engine.execute_traced(req).await;

        assert!(!result.success);
        assert!(result.exit_code.is_none());
        assert_eq!(result.error_kind, Some(JobErrorKind::Timeout));
        assert_eq!(result.stdout, "started\n");
        assert!(result.stderr.contains("timed out after 1s"));
        assert!(result.duration_seconds >= 1.0);
        assert!(phases.contains(&JobPhase::TimedOut));
        assert_eq!(h.fake.live_containers(), 0);
        assert_eq!(h.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_deadline_covers_image_pull() {
        let h = Harness::new(FakeRuntime::new(|_| FakeRun::exit(0)).hanging_pull());
        let mut req = request(16, "x");
        req.image = Some("registry.example.com/slow:1".into());
        req.timeout_seconds = Some(1);

        let (result, phases) = h.engine.execute_traced(req).await;

        assert_eq!(result.error_kind, Some(JobErrorKind::Timeout));
        assert!(result.exit_code.is_none());
        assert!(phases.contains(&JobPhase::TimedOut));
        assert!(h.fake.started().is_empty());
        assert_eq!(h.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_image_pull_failure_is_distinct() {
        let h = Harness::new(FakeRuntime::new(|_| FakeRun::exit(0)).failing_pull("manifest unknown"));
        let mut req = request(9, "x");
        req.image = Some("registry.invalid/nope:1".into());

        let (result, phases) = h.engine.execute_traced(req).await;

        assert_eq!(result.error_kind, Some(JobErrorKind::ImagePull));
        assert!(result.stderr.contains("registry.invalid/nope:1"));
        assert!(phases.contains(&JobPhase::RuntimeError));
        assert_eq!(h.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_runtime_failure_is_reported() {
        let h = Harness::new(FakeRuntime::new(|_| FakeRun::exit(0)).failing_run("OCI error"));

        let result = h.engine.execute(request(10, "x")).await;

        assert_eq!(result.error_kind, Some(JobErrorKind::ContainerRuntime));
        assert!(result.stderr.contains("OCI error"));
        assert_eq!(h.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_invalid_requests_fail_before_workspace() {
        let h = Harness::new(FakeRuntime::new(|_| FakeRun::exit(0)));

        let mut bad_cpu = request(11, "x");
        bad_cpu.cpu_limit = Some("lots".into());
        let bad_pipeline = JobRequest::new(12, "not base64!");

        for req in [bad_cpu, bad_pipeline] {
            let (result, phases) = h.engine.execute_traced(req).await;
            assert!(result.is_fault());
            assert_eq!(phases, vec![JobPhase::Init]);
        }
        assert!(h.fake.started().is_empty());
        assert_eq!(h.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_output_truncation_flagged() {
        let h = Harness::new(FakeRuntime::new(|_| FakeRun::exit(0).stdout(&"z".repeat(64))));
        let mut config = AgentConfig::new(h.key.clone(), "api-key");
        config.workspace_root = h.root_path.clone();
        config.max_output_bytes = 16;
        let engine = JobEngine::new(Arc::new(config), h.fake.clone()).unwrap();

        let result = engine.execute(request(13, "x")).await;
        assert!(result.success);
        assert_eq!(result.stdout.len(), 16);
        assert!(result.output_truncated);
    }

    #[tokio::test]
    async fn test_duration_matches_timestamps() {
        let h = Harness::new(FakeRuntime::new(|_| FakeRun::exit(0)));
        let result = h.engine.execute(request(14, "x")).await;

        let delta = (result.completed_at - result.started_at).num_microseconds().unwrap();
        assert!((result.duration_seconds - delta as f64 / 1e6).abs() < 1e-6);
        assert!(result.completed_at >= result.started_at);
    }

    #[tokio::test]
    async fn test_concurrent_jobs_are_isolated() {
        let h = Harness::new(FakeRuntime::new(|spec| {
            let entries = listing(&spec.workspace);
            let pipeline =
                std::fs::read_to_string(spec.workspace.join("pipeline.yaml")).unwrap();
            FakeRun::exit(0).stdout(&format!("{}|{}", entries.join(","), pipeline))
        }));

        let mut handles = Vec::new();
        for job_id in 0..8i64 {
            let executor: Arc<dyn JobExecutor> = h.engine.clone();
            let req = request(job_id, &format!("job {}", job_id));
            handles.push(tokio::spawn(spawn_job(executor, req)));
        }

        for (job_id, handle) in handles.into_iter().enumerate() {
            let result = handle.await.unwrap();
            assert_eq!(result.job_id, job_id as i64);
            assert!(result.success);
            assert_eq!(result.stdout, format!("pipeline.yaml|job {}", job_id));
        }

        let started = h.fake.started();
        let mut workspaces: Vec<_> = started.iter().map(|s| s.workspace.clone()).collect();
        workspaces.sort();
        workspaces.dedup();
        assert_eq!(workspaces.len(), 8);
        assert_eq!(h.leftover_workspaces(), 0);
        assert_eq!(h.fake.live_containers(), 0);
    }

    struct PanickingExecutor(Arc<FakeRuntime>);

    #[async_trait]
    impl JobExecutor for PanickingExecutor {
        async fn execute(&self, _request: JobRequest) -> JobResult {
            panic!("executor blew up");
        }

        fn runtime(&self) -> Arc<dyn ContainerRuntime> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn test_spawn_reports_panics_as_internal_faults() {
        let executor = Arc::new(PanickingExecutor(Arc::new(FakeRuntime::new(|_| {
            FakeRun::exit(0)
        }))));

        let result = spawn_job(executor, request(15, "x")).await;

        assert_eq!(result.job_id, 15);
        assert_eq!(result.error_kind, Some(JobErrorKind::Internal));
        assert!(result.exit_code.is_none());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(JobPhase::WorkspaceReleased.to_string(), "WORKSPACE_RELEASED");
        assert_eq!(JobPhase::TimedOut.to_string(), "TIMED_OUT");
    }

    #[tokio::test]
    async fn test_engine_rejects_invalid_config() {
        let mut config = AgentConfig::new("not-a-key", "api-key");
        config.workspace_root = tempfile::tempdir().unwrap().path().join("jobs");
        let fake = Arc::new(FakeRuntime::new(|_| FakeRun::exit(0)));

        assert!(JobEngine::new(Arc::new(config), fake).is_err());
    }
}
