use std::sync::Arc;

use uuid::Uuid;

use crate::{
    archive,
    catalog::TaskCatalog,
    error::{GradeError, SandboxError},
    models::{ExecutionRequest, NewSubmission, SubmitResult},
    parser::parse_test_output,
    sandbox::SandboxRunner,
    store::SubmissionStore,
};

/// Upper bound on submitted source size. Enforced again here even though
/// the transport layer validates first; nothing past this point should
/// ever frame an oversized payload.
pub const MAX_SOLUTION_BYTES: usize = 10_240;

const INTERNAL_ERROR: &str = "internal error";
const EXECUTION_TIMEOUT: &str = "execution timeout";

/// Drives one grading run end to end: hidden-test lookup, archive framing,
/// sandboxed execution, verdict aggregation, attempt persistence.
pub struct SubmissionService {
    catalog: Arc<dyn TaskCatalog>,
    sandbox: Arc<dyn SandboxRunner>,
    store: Arc<dyn SubmissionStore>,
}

impl SubmissionService {
    pub fn new(
        catalog: Arc<dyn TaskCatalog>,
        sandbox: Arc<dyn SandboxRunner>,
        store: Arc<dyn SubmissionStore>,
    ) -> Self {
        Self {
            catalog,
            sandbox,
            store,
        }
    }

    pub async fn submit(
        &self,
        user_id: Uuid,
        chapter_slug: &str,
        task_slug: &str,
        code: &str,
    ) -> Result<SubmitResult, GradeError> {
        if code.is_empty() {
            return Err(GradeError::InvalidCode("code is required".to_string()));
        }
        if code.len() > MAX_SOLUTION_BYTES {
            return Err(GradeError::InvalidCode("code too large".to_string()));
        }

        let test_source = self.catalog.test_source(chapter_slug, task_slug).await?;
        let request = ExecutionRequest {
            code: code.to_string(),
            test_source,
        };

        let result = self.grade(&request).await;

        let record = NewSubmission {
            user_id,
            chapter_slug: chapter_slug.to_string(),
            task_slug: task_slug.to_string(),
            code: request.code,
            passed: result.passed,
            result: result.clone(),
        };
        match self.store.create(record).await {
            Ok(stored) => {
                tracing::info!(
                    submission = %stored.id,
                    chapter = chapter_slug,
                    task = task_slug,
                    passed = result.passed,
                    "submission recorded"
                );
            }
            Err(err) => {
                // The verdict is already computed; losing the attempt
                // record must not lose the verdict too.
                tracing::error!(
                    error = %err,
                    chapter = chapter_slug,
                    task = task_slug,
                    "failed to persist submission"
                );
            }
        }

        Ok(result)
    }

    async fn grade(&self, request: &ExecutionRequest) -> SubmitResult {
        let archive = match archive::build(request) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!(error = %err, "failed to frame solution archive");
                return SubmitResult::failed(INTERNAL_ERROR);
            }
        };

        match self.sandbox.run(archive).await {
            Ok(raw) => parse_test_output(&raw.stdout, &raw.stderr),
            Err(SandboxError::Timeout) => SubmitResult::failed(EXECUTION_TIMEOUT),
            Err(SandboxError::Internal(err)) => {
                tracing::error!(error = ?err, "sandbox run failed");
                SubmitResult::failed(INTERNAL_ERROR)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::Arc;

    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use super::{EXECUTION_TIMEOUT, INTERNAL_ERROR, SubmissionService};
    use crate::{
        archive::SOLUTION_FILE,
        catalog::TaskCatalog,
        error::{GradeError, SandboxError, StoreError},
        models::{NewSubmission, Submission},
        sandbox::{RawOutput, SandboxRunner},
        store::SubmissionStore,
    };

    struct StaticCatalog;

    #[async_trait]
    impl TaskCatalog for StaticCatalog {
        async fn test_source(
            &self,
            chapter_slug: &str,
            task_slug: &str,
        ) -> Result<String, GradeError> {
            match (chapter_slug, task_slug) {
                ("01-basics", "01-hello") => Ok("package solution\n".to_string()),
                ("01-basics", _) => Err(GradeError::TaskNotFound),
                _ => Err(GradeError::ChapterNotFound),
            }
        }
    }

    /// Unpacks the injected archive and reports one passing test whose
    /// output echoes the submitted source, so tests can check that each
    /// run only ever sees its own payload.
    struct EchoSandbox;

    #[async_trait]
    impl SandboxRunner for EchoSandbox {
        async fn run(&self, archive: Bytes) -> Result<RawOutput, SandboxError> {
            let mut solution = String::new();
            let mut tar = tar::Archive::new(archive.as_ref());
            for entry in tar.entries().unwrap() {
                let mut entry = entry.unwrap();
                if entry.path().unwrap().to_string_lossy() == SOLUTION_FILE {
                    entry.read_to_string(&mut solution).unwrap();
                }
            }

            let events = [
                serde_json::json!({"Action": "output", "Test": "TestEcho", "Output": solution}),
                serde_json::json!({"Action": "pass", "Test": "TestEcho"}),
            ];
            let stdout = events.map(|e| e.to_string()).join("\n");
            Ok(RawOutput {
                stdout,
                stderr: String::new(),
            })
        }
    }

    struct ScriptedSandbox(Result<RawOutput, fn() -> SandboxError>);

    #[async_trait]
    impl SandboxRunner for ScriptedSandbox {
        async fn run(&self, _archive: Bytes) -> Result<RawOutput, SandboxError> {
            match &self.0 {
                Ok(raw) => Ok(raw.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        created: Mutex<Vec<Submission>>,
    }

    #[async_trait]
    impl SubmissionStore for RecordingStore {
        async fn create(&self, submission: NewSubmission) -> Result<Submission, StoreError> {
            let record = Submission {
                id: Uuid::new_v4(),
                user_id: submission.user_id,
                chapter_slug: submission.chapter_slug,
                task_slug: submission.task_slug,
                code: submission.code,
                passed: submission.passed,
                result: submission.result,
                created_at: chrono::Utc::now(),
            };
            self.created.lock().await.push(record.clone());
            Ok(record)
        }
    }

    struct FailingStore;

    #[async_trait]
    impl SubmissionStore for FailingStore {
        async fn create(&self, _submission: NewSubmission) -> Result<Submission, StoreError> {
            Err(StoreError("connection refused".to_string()))
        }
    }

    fn service(
        sandbox: Arc<dyn SandboxRunner>,
        store: Arc<dyn SubmissionStore>,
    ) -> SubmissionService {
        SubmissionService::new(Arc::new(StaticCatalog), sandbox, store)
    }

    #[tokio::test]
    async fn passing_run_returns_verdict_and_persists_one_record() {
        let store = Arc::new(RecordingStore::default());
        let svc = service(Arc::new(EchoSandbox), store.clone());

        let result = svc
            .submit(Uuid::new_v4(), "01-basics", "01-hello", "package solution\n")
            .await
            .unwrap();

        assert!(result.passed);
        assert_eq!(result.tests.len(), 1);

        let created = store.created.lock().await;
        assert_eq!(created.len(), 1);
        assert!(created[0].passed);
        assert_eq!(created[0].code, "package solution\n");
    }

    #[tokio::test]
    async fn lookup_errors_propagate_unchanged() {
        let svc = service(Arc::new(EchoSandbox), Arc::new(RecordingStore::default()));
        let user = Uuid::new_v4();

        assert!(matches!(
            svc.submit(user, "99-missing", "01-hello", "x").await,
            Err(GradeError::ChapterNotFound)
        ));
        assert!(matches!(
            svc.submit(user, "01-basics", "99-missing", "x").await,
            Err(GradeError::TaskNotFound)
        ));
    }

    #[tokio::test]
    async fn empty_and_oversized_code_are_rejected_before_execution() {
        let store = Arc::new(RecordingStore::default());
        let svc = service(Arc::new(EchoSandbox), store.clone());
        let user = Uuid::new_v4();

        assert!(matches!(
            svc.submit(user, "01-basics", "01-hello", "").await,
            Err(GradeError::InvalidCode(_))
        ));

        let oversized = "x".repeat(super::MAX_SOLUTION_BYTES + 1);
        assert!(matches!(
            svc.submit(user, "01-basics", "01-hello", &oversized).await,
            Err(GradeError::InvalidCode(_))
        ));

        assert!(store.created.lock().await.is_empty());
    }

    #[tokio::test]
    async fn timeout_becomes_failed_verdict_with_sentinel_error() {
        let sandbox = Arc::new(ScriptedSandbox(Err(|| SandboxError::Timeout)));
        let store = Arc::new(RecordingStore::default());
        let svc = service(sandbox, store.clone());

        let result = svc
            .submit(Uuid::new_v4(), "01-basics", "01-hello", "code")
            .await
            .unwrap();

        assert!(!result.passed);
        assert_eq!(result.error.as_deref(), Some(EXECUTION_TIMEOUT));
        // a timed-out run is still a completed attempt
        assert_eq!(store.created.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn infrastructure_failure_is_opaque_to_the_caller() {
        let sandbox = Arc::new(ScriptedSandbox(Err(|| {
            SandboxError::Internal(anyhow::anyhow!("daemon unreachable at /var/run/docker.sock"))
        })));
        let svc = service(sandbox, Arc::new(RecordingStore::default()));

        let result = svc
            .submit(Uuid::new_v4(), "01-basics", "01-hello", "code")
            .await
            .unwrap();

        assert_eq!(result.error.as_deref(), Some(INTERNAL_ERROR));
        assert!(!result.error.unwrap().contains("docker.sock"));
    }

    #[tokio::test]
    async fn storage_failure_does_not_discard_the_verdict() {
        let svc = service(Arc::new(EchoSandbox), Arc::new(FailingStore));

        let result = svc
            .submit(Uuid::new_v4(), "01-basics", "01-hello", "package solution\n")
            .await
            .unwrap();

        assert!(result.passed);
    }

    #[tokio::test]
    async fn concurrent_runs_do_not_share_captured_output() {
        let store = Arc::new(RecordingStore::default());
        let svc = Arc::new(service(Arc::new(EchoSandbox), store.clone()));

        let codes = ["// alpha\n", "// beta\n", "// gamma\n"];
        let handles: Vec<_> = codes
            .iter()
            .map(|code| {
                let svc = svc.clone();
                let code = code.to_string();
                tokio::spawn(async move {
                    let result = svc
                        .submit(Uuid::new_v4(), "01-basics", "01-hello", &code)
                        .await
                        .unwrap();
                    (code, result)
                })
            })
            .collect();

        for handle in handles {
            let (code, result) = handle.await.unwrap();
            assert_eq!(result.tests[0].output, code);
        }
        assert_eq!(store.created.lock().await.len(), codes.len());
    }

    #[tokio::test]
    async fn grading_the_same_submission_twice_is_deterministic() {
        let svc = service(Arc::new(EchoSandbox), Arc::new(RecordingStore::default()));
        let user = Uuid::new_v4();

        let first = svc
            .submit(user, "01-basics", "01-hello", "package solution\n")
            .await
            .unwrap();
        let second = svc
            .submit(user, "01-basics", "01-hello", "package solution\n")
            .await
            .unwrap();

        assert_eq!(first.passed, second.passed);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn compile_failure_surfaces_raw_diagnostics() {
        let raw = RawOutput {
            stdout: String::new(),
            stderr: "./solution.go:2:1: undefined: fmt\n".to_string(),
        };
        let svc = service(
            Arc::new(ScriptedSandbox(Ok(raw))),
            Arc::new(RecordingStore::default()),
        );

        let result = svc
            .submit(Uuid::new_v4(), "01-basics", "01-hello", "code")
            .await
            .unwrap();

        assert!(!result.passed);
        assert!(result.error.unwrap().contains("undefined: fmt"));
    }
}
