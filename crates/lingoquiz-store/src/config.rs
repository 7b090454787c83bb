//! Engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use lingoquiz_core::grade::GradeScale;
use lingoquiz_core::session::SessionConfig;

/// Environment variable that overrides [`EngineConfig::data_dir`].
pub const DATA_DIR_ENV: &str = "LINGOQUIZ_DATA_DIR";

/// Top-level lingoquiz configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Countdown check period in milliseconds.
    #[serde(default = "default_countdown_tick")]
    pub countdown_tick_ms: u64,
    /// Autosave period in seconds. `0` disables autosave.
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval_secs: u64,
    /// Root of the JSON-file store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Percentage to letter table.
    #[serde(default)]
    pub grade_scale: GradeScale,
}

fn default_countdown_tick() -> u64 {
    1000
}
fn default_autosave_interval() -> u64 {
    30
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./lingoquiz-data")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            countdown_tick_ms: default_countdown_tick(),
            autosave_interval_secs: default_autosave_interval(),
            data_dir: default_data_dir(),
            grade_scale: GradeScale::default(),
        }
    }
}

impl EngineConfig {
    /// Session tunables for the core controller.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            tick_interval: Duration::from_millis(self.countdown_tick_ms.max(1)),
            autosave_interval: (self.autosave_interval_secs > 0)
                .then(|| Duration::from_secs(self.autosave_interval_secs)),
            grade_scale: self.grade_scale.clone(),
        }
    }

    /// Directory holding the quiz TOML files.
    pub fn quizzes_dir(&self) -> PathBuf {
        self.data_dir.join("quizzes")
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `lingoquiz.toml` in the current directory
/// 2. `~/.config/lingoquiz/config.toml`
///
/// Environment variable override: `LINGOQUIZ_DATA_DIR`.
pub fn load_config() -> Result<EngineConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<EngineConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("lingoquiz.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config_str(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        config.data_dir = PathBuf::from(dir);
    }
    config.data_dir = PathBuf::from(resolve_env_vars(&config.data_dir.to_string_lossy()));

    Ok(config)
}

/// Parse and validate a TOML configuration string.
pub fn parse_config_str(content: &str) -> Result<EngineConfig> {
    let config: EngineConfig = toml::from_str(content)?;
    config.grade_scale.validate()?;
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("lingoquiz"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_LINGOQUIZ_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_LINGOQUIZ_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("/srv/${_LINGOQUIZ_TEST_VAR}/data"),
            "/srv/hello/data"
        );
        assert_eq!(resolve_env_vars("no ${closing"), "no ${closing");
        std::env::remove_var("_LINGOQUIZ_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.countdown_tick_ms, 1000);
        assert_eq!(config.autosave_interval_secs, 30);
        assert_eq!(config.data_dir, PathBuf::from("./lingoquiz-data"));
        assert_eq!(config.grade_scale, GradeScale::default());
    }

    #[test]
    fn parse_partial_config() {
        let config = parse_config_str(
            r#"
autosave_interval_secs = 0
data_dir = "/var/lib/lingoquiz"
"#,
        )
        .unwrap();
        assert_eq!(config.countdown_tick_ms, 1000);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/lingoquiz"));

        let session = config.session_config();
        assert_eq!(session.tick_interval, Duration::from_secs(1));
        assert!(session.autosave_interval.is_none());
    }

    #[test]
    fn parse_custom_grade_scale() {
        let config = parse_config_str(
            r#"
countdown_tick_ms = 250

[grade_scale]
floor = "Insuficiente"
bands = [
    { min_percent = 90.0, letter = "Sobresaliente" },
    { min_percent = 70.0, letter = "Notable" },
    { min_percent = 50.0, letter = "Aprobado" },
]
"#,
        )
        .unwrap();
        assert_eq!(config.grade_scale.letter_for(75.0), "Notable");
        assert_eq!(config.grade_scale.letter_for(10.0), "Insuficiente");
        assert_eq!(config.session_config().tick_interval, Duration::from_millis(250));
    }

    #[test]
    fn unordered_grade_scale_is_rejected() {
        let err = parse_config_str(
            r#"
[grade_scale]
floor = "F"
bands = [
    { min_percent = 50.0, letter = "C" },
    { min_percent = 90.0, letter = "A" },
]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("grade_scale"), "{err:#}");
    }

    #[test]
    fn explicit_path_must_exist() {
        let err = load_config_from(Some(Path::new("/nonexistent/lingoquiz.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lingoquiz.toml");
        std::fs::write(&path, "countdown_tick_ms = 500\n").unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.countdown_tick_ms, 500);
    }
}
