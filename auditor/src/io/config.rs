//! Auditor configuration stored under `.audit/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::enumerate::{DEFAULT_MAX_PATHS, EnumerationLimits};
use crate::walk::WalkConfig;

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".audit/config.toml";

/// Auditor configuration (TOML).
///
/// Edited by humans; missing fields fall back to the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuditConfig {
    pub enumeration: EnumerationConfig,
    pub walk: WalkSettings,
    pub selection: SelectionConfig,
    pub webdriver: WebDriverConfig,
    pub extractor: ExtractorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnumerationConfig {
    /// Stop enumeration once this many paths are complete.
    pub max_paths: usize,
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            max_paths: DEFAULT_MAX_PATHS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WalkSettings {
    pub settle_delay_ms: u64,
    pub transition_delay_ms: u64,
    pub navigation_timeout_secs: u64,
    pub settle_timeout_secs: u64,
}

impl Default for WalkSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: 800,
            transition_delay_ms: 1500,
            navigation_timeout_secs: 60,
            settle_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SelectionConfig {
    /// Paths picked by `audit --sample` when no count is given.
    pub sample_size: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self { sample_size: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WebDriverConfig {
    /// Base URL of a running WebDriver server (chromedriver, geckodriver).
    pub url: String,
    /// `browserName` capability: `chrome` or `firefox`.
    pub browser: String,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Extra browser command-line arguments.
    pub args: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9515".to_string(),
            browser: "chrome".to_string(),
            headless: true,
            window_width: 1280,
            window_height: 800,
            args: vec![
                "--disable-dev-shm-usage".to_string(),
                "--no-sandbox".to_string(),
            ],
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Command that reads a prompt on stdin and prints the logic JSON
    /// (e.g. `["claude","-p"]`). Empty until configured.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Truncate extractor stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 600,
            output_limit_bytes: 2_000_000,
        }
    }
}

impl AuditConfig {
    pub fn validate(&self) -> Result<()> {
        if self.enumeration.max_paths == 0 {
            return Err(anyhow!("enumeration.max_paths must be > 0"));
        }
        if self.walk.navigation_timeout_secs == 0 {
            return Err(anyhow!("walk.navigation_timeout_secs must be > 0"));
        }
        if self.walk.settle_timeout_secs == 0 {
            return Err(anyhow!("walk.settle_timeout_secs must be > 0"));
        }
        if self.webdriver.url.trim().is_empty() {
            return Err(anyhow!("webdriver.url must not be empty"));
        }
        if !matches!(self.webdriver.browser.as_str(), "chrome" | "firefox") {
            return Err(anyhow!(
                "webdriver.browser must be \"chrome\" or \"firefox\", got {:?}",
                self.webdriver.browser
            ));
        }
        if self.webdriver.window_width == 0 || self.webdriver.window_height == 0 {
            return Err(anyhow!("webdriver window size must be > 0"));
        }
        if self.webdriver.request_timeout_secs == 0 {
            return Err(anyhow!("webdriver.request_timeout_secs must be > 0"));
        }
        if self.extractor.timeout_secs == 0 {
            return Err(anyhow!("extractor.timeout_secs must be > 0"));
        }
        if self.extractor.output_limit_bytes == 0 {
            return Err(anyhow!("extractor.output_limit_bytes must be > 0"));
        }
        if let Some(program) = self.extractor.command.first()
            && program.trim().is_empty()
        {
            return Err(anyhow!("extractor.command program must not be blank"));
        }
        Ok(())
    }

    pub fn walk_config(&self) -> WalkConfig {
        WalkConfig {
            settle_delay: Duration::from_millis(self.walk.settle_delay_ms),
            transition_delay: Duration::from_millis(self.walk.transition_delay_ms),
            navigation_timeout: Duration::from_secs(self.walk.navigation_timeout_secs),
            settle_timeout: Duration::from_secs(self.walk.settle_timeout_secs),
        }
    }

    pub fn enumeration_limits(&self) -> EnumerationLimits {
        EnumerationLimits {
            max_paths: self.enumeration.max_paths,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AuditConfig::default()`.
pub fn load_config(path: &Path) -> Result<AuditConfig> {
    if !path.exists() {
        let cfg = AuditConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AuditConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AuditConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
