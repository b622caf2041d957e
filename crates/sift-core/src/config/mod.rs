mod env;
mod types;


pub use types::*;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if
    /// the resulting configuration fails [`Config::validate`].
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns the first out-of-range setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.aggregation
            .validate()
            .context("invalid [aggregation] section")?;

        if self.agent.max_iterations == 0 {
            bail!("agent.max_iterations must be > 0");
        }
        if self.agent.context_budget_tokens == 0 {
            bail!("agent.context_budget_tokens must be > 0");
        }
        if self.planner.max_rounds == 0 {
            bail!("planner.max_rounds must be > 0");
        }
        if self.index.k1.is_nan() || self.index.k1 < 0.0 {
            bail!("index.k1 must be >= 0, got {}", self.index.k1);
        }
        if !(0.0..=1.0).contains(&self.index.b) {
            bail!("index.b must be within 0..=1, got {}", self.index.b);
        }
        if self.index.phrase_boost.is_nan() || self.index.phrase_boost < 1.0 {
            bail!(
                "index.phrase_boost must be >= 1, got {}",
                self.index.phrase_boost
            );
        }
        if self.timeouts.llm_seconds == 0
            || self.timeouts.tool_seconds == 0
            || self.timeouts.vector_seconds == 0
        {
            bail!("timeouts must be > 0 seconds");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be > 0");
        }
        Ok(())
    }
}

impl TimeoutConfig {
    #[must_use]
    pub fn llm(&self) -> Duration {
        Duration::from_secs(self.llm_seconds)
    }

    #[must_use]
    pub fn tool(&self) -> Duration {
        Duration::from_secs(self.tool_seconds)
    }

    #[must_use]
    pub fn vector(&self) -> Duration {
        Duration::from_secs(self.vector_seconds)
    }
}
