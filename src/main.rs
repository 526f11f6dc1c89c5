use std::{process::ExitCode, sync::Arc};

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use sandbox_grader::{
    catalog::FsTaskCatalog, config::GraderConfig, sandbox::DockerSandbox,
    store::MemorySubmissionStore, submit::SubmissionService,
};

/// Grades one solution file against a catalog task and prints the verdict.
///
/// Usage: sandbox-grader <chapter-slug> <task-slug> <solution.go>
#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let config = GraderConfig::from_env();
    init_tracing(&config);

    let mut args = std::env::args().skip(1);
    let (Some(chapter_slug), Some(task_slug), Some(solution_path)) =
        (args.next(), args.next(), args.next())
    else {
        eprintln!("usage: sandbox-grader <chapter-slug> <task-slug> <solution.go>");
        return Ok(ExitCode::from(2));
    };

    let code = tokio::fs::read_to_string(&solution_path)
        .await
        .with_context(|| format!("reading solution file {solution_path}"))?;

    let catalog = FsTaskCatalog::load(&config.content_dir)
        .with_context(|| format!("loading task catalog from {}", config.content_dir.display()))?;
    let sandbox = DockerSandbox::new(&config).await?;
    let store = MemorySubmissionStore::new(config.persist_path.clone());

    let service = SubmissionService::new(Arc::new(catalog), Arc::new(sandbox), Arc::new(store));

    let result = service
        .submit(Uuid::new_v4(), &chapter_slug, &task_slug, &code)
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(if result.passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn init_tracing(config: &GraderConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .init();
}
