use serde::{Deserialize, Serialize};
use sowcrew_core::{AgentRole, RoleSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::prompts::RolePrompts;
use crate::task_parser::ParserConfig;

pub const CONFIG_DIR: &str = ".sowcrew";
pub const CONFIG_FILE: &str = "config.toml";
pub const ENDPOINT_ENV: &str = "SOWCREW_AGENT_ENDPOINT";

const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 30_000;
const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 120;

/// What happens to the remaining tasks once one task has failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    Continue,
    /// Every still pending task is skipped.
    SkipRemaining,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Retries after the first attempt for transient and timeout failures.
    pub max_retries: u32,
    /// Tasks in flight at once. 1 is strictly sequential.
    pub max_concurrency: usize,
    pub agent_timeout: Duration,
    /// Delay before the first retry, doubled for each further one.
    pub retry_backoff: Duration,
    pub max_backoff: Duration,
    pub failure_policy: FailurePolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            max_concurrency: 1,
            agent_timeout: Duration::from_secs(DEFAULT_AGENT_TIMEOUT_SECS),
            retry_backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
            failure_policy: FailurePolicy::Continue,
        }
    }
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before the given 1-based retry.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.retry_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the bearer token.
    pub token_env: String,
    pub timeout_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            token_env: "SOWCREW_AGENT_TOKEN".to_string(),
            timeout_secs: DEFAULT_AGENT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    pub max_retries: u32,
    pub max_concurrency: usize,
    pub retry_backoff_ms: u64,
    pub failure_policy: FailurePolicy,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            max_concurrency: 1,
            retry_backoff_ms: DEFAULT_BACKOFF_MS,
            failure_policy: FailurePolicy::Continue,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Root of the per-run directories, relative to the project.
    pub dir: PathBuf,
    /// Lines kept by the live monitor.
    pub recent_lines: usize,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(CONFIG_DIR).join("runs"),
            recent_lines: 50,
        }
    }
}

/// Project configuration stored in `.sowcrew/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// TOML or JSON role set, relative to the project.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles_file: Option<PathBuf>,
    pub agent: AgentSection,
    pub execution: ExecutionSection,
    pub parser: ParserConfig,
    pub logging: LoggingSection,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<AgentRole>,
}

impl ProjectConfig {
    pub fn path(project_path: &Path) -> PathBuf {
        project_path.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Read config from the project directory. A missing or broken file
    /// yields the defaults.
    pub async fn read(project_path: &Path) -> Self {
        let config_path = Self::path(project_path);

        if !config_path.exists() {
            debug!(path = %config_path.display(), "Config file does not exist, using defaults");
            return Self::default();
        }

        match fs::read_to_string(&config_path).await {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    debug!(path = %config_path.display(), "Config loaded successfully");
                    config
                }
                Err(e) => {
                    warn!(path = %config_path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %config_path.display(), error = %e, "Failed to read config file, using defaults");
                Self::default()
            }
        }
    }

    pub async fn write(&self, project_path: &Path) -> std::io::Result<()> {
        let config_path = Self::path(project_path);
        if let Some(dir) = config_path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        fs::write(&config_path, content).await?;
        debug!(path = %config_path.display(), "Config saved successfully");

        Ok(())
    }

    /// Starter config with an Architect/Developer/PM/QA team.
    pub fn with_default_roles() -> Self {
        Self {
            roles: default_roles(),
            ..Default::default()
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::new()
            .with_max_retries(self.execution.max_retries)
            .with_max_concurrency(self.execution.max_concurrency)
            .with_agent_timeout(Duration::from_secs(self.agent.timeout_secs.max(1)))
            .with_retry_backoff(Duration::from_millis(self.execution.retry_backoff_ms))
            .with_failure_policy(self.execution.failure_policy)
    }

    /// `SOWCREW_AGENT_ENDPOINT` wins over the file.
    pub fn agent_endpoint(&self) -> Option<String> {
        std::env::var(ENDPOINT_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.agent.endpoint.clone())
    }

    pub fn agent_token(&self) -> Option<String> {
        std::env::var(&self.agent.token_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
    }

    pub fn logs_dir(&self, project_path: &Path) -> PathBuf {
        project_path.join(&self.logging.dir)
    }

    /// Roles from `roles_file` followed by the inline ones, validated as one
    /// set. Templates are checked here so bad placeholders stop the run
    /// before any task is dispatched.
    pub async fn load_roles(&self, project_path: &Path) -> Result<RoleSet, ConfigError> {
        let mut roles = Vec::new();

        if let Some(ref file) = self.roles_file {
            let path = project_path.join(file);
            let display = path.display().to_string();
            let content = fs::read_to_string(&path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: display.clone(),
                    source,
                })?;

            let is_json = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("json"));
            let from_file = if is_json {
                RoleSet::from_json_str(&content)
            } else {
                RoleSet::from_toml_str(&content)
            }
            .map_err(|source| ConfigError::Roles {
                path: display,
                source,
            })?;

            roles.extend(from_file.iter().cloned());
        }

        roles.extend(self.roles.iter().cloned());
        if roles.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "no roles configured; add [[roles]] to {} or set roles_file",
                Self::path(project_path).display()
            )));
        }

        let roles = RoleSet::new(roles)?;
        RolePrompts::validate_all(&roles)?;
        debug!(roles = ?roles.names(), "Loaded role set");
        Ok(roles)
    }
}

pub fn default_roles() -> Vec<AgentRole> {
    vec![
        AgentRole::new("Architect")
            .with_description("Designs the system structure, data model and interfaces")
            .with_tags(["design", "architecture", "schema", "model", "interface"]),
        AgentRole::new("Developer")
            .with_description("Implements features and integrations")
            .with_tags(["implement", "build", "develop", "code", "integrate", "endpoint"]),
        AgentRole::new("PM")
            .with_description("Plans, coordinates and reviews the delivery")
            .with_tags(["review", "plan", "coordinate", "schedule", "report", "document"]),
        AgentRole::new("QA")
            .with_description("Verifies the delivered work")
            .with_tags(["test", "verify", "validate", "qa"]),
    ]
}
