//! Assistant configuration loading and validation.
//!
//! Reads `config/assistant.yaml` and resolves environment variables.
//! Config is the single source of truth for the completion endpoint, the
//! sampling parameters, and the orchestration bounds. Every field has a
//! default, so a missing file is not an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::errors::InferenceError;

/// Relative location of the config file under a project root.
const CONFIG_RELATIVE_PATH: &str = "config/assistant.yaml";

/// Env var that points directly at a config file.
const CONFIG_PATH_ENV: &str = "EXPENSE_ASSISTANT_CONFIG";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Runtime configuration for the assistant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssistantConfig {
    /// OpenAI-compatible base URL, without the `/chat/completions` suffix.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Maximum number of model↔tool round-trips per run.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    /// Wall-clock budget for one run, in seconds.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    /// SQLite database file. Defaults to `<data dir>/expenses.db`.
    #[serde(default)]
    pub database_path: Option<String>,
}

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_max_tool_rounds() -> u32 {
    5
}
fn default_run_timeout_secs() -> u64 {
    60
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_tool_rounds: default_max_tool_rounds(),
            run_timeout_secs: default_run_timeout_secs(),
            database_path: None,
        }
    }
}

impl AssistantConfig {
    /// The per-run wall-clock budget.
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    /// Read the API key from the configured environment variable.
    ///
    /// Absent and empty values are both `MissingCredential`.
    pub fn api_key(&self) -> Result<String, InferenceError> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(InferenceError::MissingCredential {
                env_var: self.api_key_env.clone(),
            }),
        }
    }

    /// Whether a usable credential is present.
    pub fn has_credential(&self) -> bool {
        self.api_key().is_ok()
    }

    /// Check the values that would otherwise fail at request time.
    pub fn validate(&self) -> Result<(), InferenceError> {
        if self.base_url.trim().is_empty() {
            return Err(InferenceError::ConfigError {
                reason: "base_url must not be empty".into(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(InferenceError::ConfigError {
                reason: "model must not be empty".into(),
            });
        }
        if self.max_tool_rounds == 0 {
            return Err(InferenceError::ConfigError {
                reason: "max_tool_rounds must be at least 1".into(),
            });
        }
        if self.run_timeout_secs == 0 {
            return Err(InferenceError::ConfigError {
                reason: "run_timeout_secs must be at least 1".into(),
            });
        }
        Ok(())
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// Checks `EXPENSE_ASSISTANT_CONFIG` first, then searches upward from
/// `start` for `config/assistant.yaml`. Returns `None` when nothing is found.
pub fn find_config_path(start: &Path) -> Option<PathBuf> {
    // 1. Check env var
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let candidate = PathBuf::from(expand_tilde(&path));
        if candidate.exists() {
            return Some(candidate);
        }
        tracing::warn!(path = %candidate.display(), "{CONFIG_PATH_ENV} points to a missing file");
    }

    // 2. Walk upward from `start`
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_RELATIVE_PATH);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Load and parse a config file.
///
/// Performs environment-variable interpolation on `${VAR_NAME}` and
/// `${VAR_NAME:-default}` before parsing.
pub fn load_config(path: &Path) -> Result<AssistantConfig, InferenceError> {
    let raw = std::fs::read_to_string(path).map_err(|e| InferenceError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let interpolated = interpolate_env_vars(&raw);

    let config: AssistantConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| InferenceError::ConfigError {
            reason: format!("failed to parse config: {e}"),
        })?;

    config.validate()?;
    Ok(config)
}

/// Resolve the effective config: the file if one is found, defaults otherwise.
pub fn resolve_config(start: &Path) -> Result<AssistantConfig, InferenceError> {
    match find_config_path(start) {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading assistant config");
            load_config(&path)
        }
        None => {
            tracing::info!("no config file found, using defaults");
            Ok(AssistantConfig::default())
        }
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Substitute `${VAR}` and `${VAR:-default}` references in `input`.
///
/// Like the shell, `:-` falls back to the default when the variable is unset
/// or empty. An unterminated `${` is copied through unchanged.
fn interpolate_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let body = &rest[open + 2..];
        let Some(close) = body.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        out.push_str(&lookup_var(&body[..close]));
        rest = &body[close + 1..];
    }

    out.push_str(rest);
    out
}

/// Value for one `NAME` or `NAME:-default` reference.
fn lookup_var(reference: &str) -> String {
    let (name, default) = match reference.split_once(":-") {
        Some((name, default)) => (name, Some(default)),
        None => (reference, None),
    };
    match (std::env::var(name.trim()), default) {
        (Ok(value), Some(_)) if !value.is_empty() => value,
        (Ok(value), None) => value,
        (_, Some(default)) => expand_tilde(default),
        (Err(_), None) => String::new(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_env_vars_with_default() {
        std::env::remove_var("__EA_TEST_NONEXISTENT_VAR__");
        let input = "${__EA_TEST_NONEXISTENT_VAR__:-/fallback/path}";
        assert_eq!(interpolate_env_vars(input), "/fallback/path");
    }

    #[test]
    fn test_interpolate_env_vars_with_value() {
        std::env::set_var("__EA_TEST_MODEL_VAR__", "mixtral");
        let input = "model: ${__EA_TEST_MODEL_VAR__:-llama}";
        assert_eq!(interpolate_env_vars(input), "model: mixtral");
        std::env::remove_var("__EA_TEST_MODEL_VAR__");
    }

    #[test]
    fn test_interpolate_empty_value_uses_default() {
        std::env::set_var("__EA_TEST_EMPTY_VAR__", "");
        let input = "key_env: ${__EA_TEST_EMPTY_VAR__:-GROQ_API_KEY}";
        assert_eq!(interpolate_env_vars(input), "key_env: GROQ_API_KEY");
        std::env::remove_var("__EA_TEST_EMPTY_VAR__");
    }

    #[test]
    fn test_interpolate_missing_var_without_default_is_empty() {
        std::env::remove_var("__EA_TEST_UNSET_VAR__");
        assert_eq!(interpolate_env_vars("a${__EA_TEST_UNSET_VAR__}b"), "ab");
    }

    #[test]
    fn test_interpolate_keeps_unterminated_reference() {
        std::env::set_var("__EA_TEST_TAIL_VAR__", "x");
        let input = "${__EA_TEST_TAIL_VAR__} then ${UNCLOSED and $plain";
        assert_eq!(
            interpolate_env_vars(input),
            "x then ${UNCLOSED and $plain"
        );
        std::env::remove_var("__EA_TEST_TAIL_VAR__");
    }

    #[test]
    fn test_interpolate_no_vars() {
        let input = "plain text with no variables";
        assert_eq!(interpolate_env_vars(input), input);
    }

    #[test]
    fn test_expand_tilde() {
        let result = expand_tilde("~/expenses.db");
        assert!(!result.starts_with('~'));
        assert!(result.ends_with("/expenses.db"));
    }

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config: AssistantConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, AssistantConfig::default());
        assert_eq!(config.max_tool_rounds, 5);
        assert_eq!(config.max_tokens, 2048);
        assert_eq!(config.api_key_env, "GROQ_API_KEY");
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assistant.yaml");
        std::fs::write(
            &path,
            "model: test-model\nmax_tool_rounds: 3\nrun_timeout_secs: 10\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.model, "test-model");
        assert_eq!(config.max_tool_rounds, 3);
        assert_eq!(config.run_timeout(), Duration::from_secs(10));
        assert_eq!(config.base_url, "https://api.groq.com/openai/v1");
    }

    #[test]
    fn test_load_config_rejects_zero_rounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assistant.yaml");
        std::fs::write(&path, "max_tool_rounds: 0\n").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(InferenceError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_find_config_path_walks_upward() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join(CONFIG_RELATIVE_PATH), "{}").unwrap();

        let found = find_config_path(&dir.path().join("a/b")).unwrap();
        assert!(found.ends_with(CONFIG_RELATIVE_PATH));
    }

    #[test]
    fn test_api_key_missing_and_empty() {
        let config = AssistantConfig {
            api_key_env: "__EA_TEST_API_KEY__".into(),
            ..AssistantConfig::default()
        };

        std::env::remove_var("__EA_TEST_API_KEY__");
        assert!(matches!(
            config.api_key(),
            Err(InferenceError::MissingCredential { .. })
        ));

        std::env::set_var("__EA_TEST_API_KEY__", "   ");
        assert!(!config.has_credential());

        std::env::set_var("__EA_TEST_API_KEY__", "gsk_test");
        assert_eq!(config.api_key().unwrap(), "gsk_test");
        std::env::remove_var("__EA_TEST_API_KEY__");
    }
}
