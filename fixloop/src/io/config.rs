//! Repair configuration loaded from `fixloop.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "fixloop.toml";

/// Top-level repair configuration (TOML).
///
/// Missing fields default to values that reproduce a plain vitest + OpenAI
/// setup, bounded to ten iterations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepairConfig {
    /// Maximum number of test runs before giving up.
    pub max_iterations: u32,

    /// Wall-clock budget for the whole run, in seconds. Unbounded when unset.
    pub timeout_secs: Option<u64>,

    /// Prompt re-sends per iteration when a candidate is rejected.
    pub max_generation_attempts: u32,

    /// Directory for per-iteration records. Nothing is written when unset.
    pub log_dir: Option<PathBuf>,

    pub test: TestConfig,
    pub generator: GeneratorConfig,
    pub validate: ValidateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestConfig {
    /// Test engine argv. `{test}` and `{report}` are substituted per run.
    pub command: Vec<String>,
    /// Where the engine writes its JSON report, relative to the working directory.
    pub report_path: PathBuf,
    pub timeout_secs: u64,
    /// Keep at most this many bytes of engine stdout/stderr.
    pub output_limit_bytes: usize,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            command: [
                "npx",
                "vitest",
                "run",
                "{test}",
                "--reporter=json",
                "--outputFile={report}",
            ]
            .iter()
            .map(|arg| arg.to_string())
            .collect(),
            report_path: PathBuf::from("test-results.json"),
            timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub model: String,
    /// Base URL of an OpenAI-compatible API (`/chat/completions` is appended).
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub request_timeout_secs: u64,
    /// Code-fence tag override. Derived from the source extension when unset.
    pub fence_tag: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            request_timeout_secs: 5 * 60,
            fence_tag: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidateConfig {
    /// Checker argv run against each candidate; `{file}` is substituted.
    /// Empty disables the command check (empty candidates are still rejected).
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for ValidateConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 2 * 60,
            output_limit_bytes: 20_000,
        }
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            timeout_secs: None,
            max_generation_attempts: 3,
            log_dir: None,
            test: TestConfig::default(),
            generator: GeneratorConfig::default(),
            validate: ValidateConfig::default(),
        }
    }
}

impl RepairConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if let Some(secs) = self.timeout_secs {
            check_timeout("timeout_secs", secs)?;
        }
        if self.max_generation_attempts == 0 {
            return Err(anyhow!("max_generation_attempts must be > 0"));
        }
        if self.test.command.is_empty() || self.test.command[0].trim().is_empty() {
            return Err(anyhow!("test.command must be a non-empty array"));
        }
        if self.test.report_path.as_os_str().is_empty() {
            return Err(anyhow!("test.report_path must not be empty"));
        }
        check_timeout("test.timeout_secs", self.test.timeout_secs)?;
        if self.test.output_limit_bytes == 0 {
            return Err(anyhow!("test.output_limit_bytes must be > 0"));
        }
        if self.generator.model.trim().is_empty() {
            return Err(anyhow!("generator.model must not be empty"));
        }
        if self.generator.base_url.trim().is_empty() {
            return Err(anyhow!("generator.base_url must not be empty"));
        }
        check_timeout(
            "generator.request_timeout_secs",
            self.generator.request_timeout_secs,
        )?;
        if let Some(tag) = &self.generator.fence_tag
            && tag.trim().is_empty()
        {
            return Err(anyhow!("generator.fence_tag must not be empty when set"));
        }
        if self
            .validate
            .command
            .first()
            .is_some_and(|program| program.trim().is_empty())
        {
            return Err(anyhow!("validate.command must start with a program name"));
        }
        check_timeout("validate.timeout_secs", self.validate.timeout_secs)?;
        if self.validate.output_limit_bytes == 0 {
            return Err(anyhow!("validate.output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Upper bound for any timeout setting (one year). Larger values overflow
/// deadline arithmetic in the process and HTTP layers.
pub const MAX_TIMEOUT_SECS: u64 = 365 * 24 * 60 * 60;

fn check_timeout(name: &str, secs: u64) -> Result<()> {
    if secs == 0 {
        return Err(anyhow!("{name} must be > 0"));
    }
    if secs > MAX_TIMEOUT_SECS {
        return Err(anyhow!("{name} must be at most {MAX_TIMEOUT_SECS}"));
    }
    Ok(())
}

/// Command-line overrides applied on top of the file config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub max_iterations: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub model: Option<String>,
}

/// Apply overrides and re-validate the merged config.
pub fn apply_overrides(mut base: RepairConfig, overrides: &ConfigOverrides) -> Result<RepairConfig> {
    if let Some(max_iterations) = overrides.max_iterations {
        base.max_iterations = max_iterations;
    }
    if let Some(timeout_secs) = overrides.timeout_secs {
        base.timeout_secs = Some(timeout_secs);
    }
    if let Some(model) = &overrides.model {
        base.generator.model = model.clone();
    }
    base.validate()?;
    Ok(base)
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RepairConfig::default()`.
pub fn load_config(path: &Path) -> Result<RepairConfig> {
    if !path.exists() {
        let cfg = RepairConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RepairConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
