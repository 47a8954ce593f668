//! Config model and persistence helpers.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{credentials::DEFAULT_COOKIE_FILE, delay::DelayPolicy};

/// Environment variable naming a folder to enqueue at startup.
pub const SOURCE_DIR_ENV: &str = "UPLOAD_SOURCE_DIR";

/// Top-level configuration stored in `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Where the session cookies come from.
    pub session: SessionCfg,
    /// Pacing between consecutive uploads.
    pub delay: DelayCfg,
    /// Last bulk description values, used to prefill the input boxes.
    pub bulk: BulkCfg,
    /// Upload endpoint settings.
    pub publisher: PublisherCfg,
    /// Folder to auto-enqueue, taken from the environment only.
    #[serde(skip)]
    pub source_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCfg {
    /// Cookie export (Netscape `cookies.txt` or JSON).
    pub cookies_file: PathBuf,
}

/// Stored as signed values so hand-edited negatives load and get clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayCfg {
    pub enabled: bool,
    pub min_minutes: i64,
    pub max_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkCfg {
    pub fixed_text: String,
    pub start_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherCfg {
    /// Multipart upload URL.
    pub endpoint: String,
    /// Per-request timeout; large videos need a generous value.
    pub timeout_secs: u64,
}

impl Config {
    /// Load from disk or create defaults when missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let s = fs::read_to_string(path)?;
            Ok(toml::from_str(&s)?)
        } else {
            let cfg = Self::default();
            cfg.save(path)?;
            Ok(cfg)
        }
    }

    /// Persist the config as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let s = toml::to_string_pretty(self)?;
        fs::write(path, s)?;
        Ok(())
    }

    /// Pick up `UPLOAD_SOURCE_DIR` when set and non-empty.
    pub fn apply_env(&mut self) {
        self.apply_source_dir(std::env::var(SOURCE_DIR_ENV).ok());
    }

    fn apply_source_dir(&mut self, value: Option<String>) {
        if let Some(v) = value
            && !v.trim().is_empty()
        {
            self.source_dir = Some(PathBuf::from(v.trim()));
        }
    }

    /// Delay settings with the clamp rules applied.
    pub fn delay_policy(&self) -> DelayPolicy {
        DelayPolicy::new(
            self.delay.enabled,
            self.delay.min_minutes,
            self.delay.max_minutes,
        )
    }

    /// Write back a policy so the file always holds clamped values.
    pub fn set_delay_policy(&mut self, policy: DelayPolicy) {
        self.delay = DelayCfg {
            enabled: policy.enabled(),
            min_minutes: i64::from(policy.min_minutes()),
            max_minutes: i64::from(policy.max_minutes()),
        };
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publisher.timeout_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        let delay = DelayPolicy::default();
        Self {
            session: SessionCfg {
                cookies_file: PathBuf::from(DEFAULT_COOKIE_FILE),
            },
            delay: DelayCfg {
                enabled: delay.enabled(),
                min_minutes: i64::from(delay.min_minutes()),
                max_minutes: i64::from(delay.max_minutes()),
            },
            bulk: BulkCfg {
                fixed_text: String::new(),
                start_index: 1,
            },
            publisher: PublisherCfg {
                endpoint: "https://upload.example.invalid/api/v1/videos".into(),
                timeout_secs: 600,
            },
            source_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let cfg = Config::load_or_default(&path).expect("load");
        assert_eq!(cfg, Config::default());
        assert!(path.exists());

        let again = Config::load_or_default(&path).expect("reload");
        assert_eq!(again, cfg);
    }

    #[test]
    fn delay_bounds_are_clamped_on_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.delay = DelayCfg {
            enabled: true,
            min_minutes: 4,
            max_minutes: -2,
        };
        cfg.save(&path).expect("save");

        let loaded = Config::load_or_default(&path).expect("load");
        let p = loaded.delay_policy();
        assert!(p.enabled());
        assert_eq!((p.min_minutes(), p.max_minutes()), (4, 4));
    }

    #[test]
    fn set_delay_policy_stores_clamped_values() {
        let mut cfg = Config::default();
        cfg.set_delay_policy(DelayPolicy::new(true, -1, 2));
        assert_eq!(cfg.delay.min_minutes, 0);
        assert_eq!(cfg.delay.max_minutes, 2);
    }

    #[test]
    fn source_dir_is_not_persisted() {
        let mut cfg = Config::default();
        cfg.apply_source_dir(Some(" /videos ".into()));
        assert_eq!(cfg.source_dir, Some(PathBuf::from("/videos")));
        let s = toml::to_string_pretty(&cfg).expect("toml");
        assert!(!s.contains("source_dir"));

        let mut cfg = Config::default();
        cfg.apply_source_dir(Some("   ".into()));
        assert_eq!(cfg.source_dir, None);
    }
}
