mod docker;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::SandboxError;

pub use docker::DockerSandbox;

/// Demultiplexed output of one sandbox run.
#[derive(Debug, Clone, Default)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
}

/// One isolated, resource-capped execution of a solution archive. Runs are
/// independent: implementations hold only static configuration and must
/// tear down whatever runtime state they create on every exit path.
#[async_trait]
pub trait SandboxRunner: Send + Sync {
    async fn run(&self, archive: Bytes) -> Result<RawOutput, SandboxError>;
}
