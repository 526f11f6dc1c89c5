use std::{env, path::PathBuf, str::FromStr, time::Duration};

/// Static configuration shared read-only by every grading run.
#[derive(Debug, Clone)]
pub struct GraderConfig {
    pub sandbox_image: String,
    pub sandbox_timeout_ms: u64,
    pub sandbox_memory_bytes: i64,
    pub sandbox_cpu_cores: f64,
    pub content_dir: PathBuf,
    pub persist_path: Option<PathBuf>,
    pub log_level: String,
}

impl GraderConfig {
    pub fn from_env() -> Self {
        Self {
            sandbox_image: env::var("SANDBOX_IMAGE")
                .unwrap_or_else(|_| "golang:1.25-alpine".to_string()),
            sandbox_timeout_ms: env_parse("SANDBOX_TIMEOUT_MS", 10_000u64),
            sandbox_memory_bytes: env_parse("SANDBOX_MEMORY_BYTES", 256 * 1024 * 1024i64),
            sandbox_cpu_cores: env_parse("SANDBOX_CPU_CORES", 0.5f64),
            content_dir: env::var("CONTENT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("content/tasks")),
            persist_path: env::var("PERSIST_SUBMISSIONS_PATH").ok().map(PathBuf::from),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    pub fn sandbox_timeout(&self) -> Duration {
        Duration::from_millis(self.sandbox_timeout_ms)
    }

    /// Docker expresses CPU quotas in billionths of a core.
    pub fn sandbox_nano_cpus(&self) -> i64 {
        (self.sandbox_cpu_cores * 1_000_000_000.0) as i64
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
