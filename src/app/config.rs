use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::constants::{
    DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_KEY_ENV, DEFAULT_OPENAI_BASE_URL,
    DEFAULT_OPENAI_KEY_ENV, DEMO_INITIAL_DELAY_MS, DEMO_SLICE_CHARS, DEMO_SLICE_DELAY_MS,
};
use crate::models::Settings;
use crate::stream::{LocalPacing, LocalResponder, ProviderConfig};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Settings every new session starts with
    #[serde(default)]
    pub defaults: Settings,

    /// OpenAI configuration
    #[serde(default = "ProviderEndpoint::openai")]
    pub openai: ProviderEndpoint,

    /// Gemini configuration
    #[serde(default = "ProviderEndpoint::gemini")]
    pub gemini: ProviderEndpoint,

    /// Where sessions are kept
    #[serde(default)]
    pub storage: StorageConfig,

    /// Offline responder pacing
    #[serde(default)]
    pub demo: DemoConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            defaults: Settings::default(),
            openai: ProviderEndpoint::openai(),
            gemini: ProviderEndpoint::gemini(),
            storage: StorageConfig::default(),
            demo: DemoConfig::default(),
        }
    }
}

/// Remote provider endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    /// Environment variable containing the API key
    pub api_key_env: String,
    /// Base URL, without the API path
    pub base_url: String,
}

impl ProviderEndpoint {
    fn openai() -> Self {
        Self {
            api_key_env: DEFAULT_OPENAI_KEY_ENV.to_string(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
        }
    }

    fn gemini() -> Self {
        Self {
            api_key_env: DEFAULT_GEMINI_KEY_ENV.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
        }
    }

    /// The API key, if its variable is set to something non-blank
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for persisted sessions (defaults to the platform data dir)
    pub data_dir: Option<PathBuf>,
    /// Keep sessions in memory only
    #[serde(default)]
    pub ephemeral: bool,
}

/// Pacing of the offline responder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    pub slice_chars: usize,
    pub slice_delay_ms: u64,
    pub initial_delay_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            slice_chars: DEMO_SLICE_CHARS,
            slice_delay_ms: DEMO_SLICE_DELAY_MS,
            initial_delay_ms: DEMO_INITIAL_DELAY_MS,
        }
    }
}

impl Config {
    /// Credentials (read from the environment) and endpoints for the providers
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            openai_api_key: self.openai.api_key(),
            openai_base_url: self.openai.base_url.clone(),
            gemini_api_key: self.gemini.api_key(),
            gemini_base_url: self.gemini.base_url.clone(),
        }
    }

    /// Default session settings, repaired if the configured model doesn't
    /// belong to the configured provider
    pub fn session_defaults(&self) -> Settings {
        let mut settings = self.defaults.clone();
        if let Err(e) = settings.validate() {
            warn!("Invalid default settings ({}), using provider defaults", e);
            let provider = settings.provider;
            settings = settings.with_provider(provider);
            settings.temperature = settings.temperature.clamp(0.0, 1.0);
        }
        settings
    }

    pub fn local_responder(&self) -> LocalResponder {
        LocalResponder::new(LocalPacing {
            initial_delay: Duration::from_millis(self.demo.initial_delay_ms),
            slice_delay: Duration::from_millis(self.demo.slice_delay_ms),
            slice_chars: self.demo.slice_chars,
        })
    }

    /// Directory sessions are stored in
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => get_data_dir(),
        }
    }
}

/// Load configuration from multiple sources
pub fn load_config() -> Result<Config> {
    // Get config directories
    let config_dir = get_config_dir()?;
    let global_config = config_dir.join("config.toml");
    let local_config = PathBuf::from(".parley/config.toml");

    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    if global_config.exists() {
        figment = figment.merge(Toml::file(&global_config));
    }

    if local_config.exists() {
        figment = figment.merge(Toml::file(&local_config));
    }

    // PARLEY_DEMO__SLICE_CHARS=5 -> demo.slice_chars
    figment = figment.merge(Env::prefixed("PARLEY_").split("__"));

    figment.extract().context("Failed to load configuration")
}

/// Load configuration from one explicit file on top of the defaults
pub fn load_config_file(path: &Path) -> Result<Config> {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .extract()
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "parley")
}

fn home_fallback(sub: &str) -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Could not determine home directory")?;
    Ok(PathBuf::from(home).join(sub).join("parley"))
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = match project_dirs() {
        Some(dirs) => dirs.config_dir().to_path_buf(),
        None => home_fallback(".config")?,
    };
    std::fs::create_dir_all(&config_dir)?;
    Ok(config_dir)
}

/// Get the data directory sessions live in by default
pub fn get_data_dir() -> Result<PathBuf> {
    match project_dirs() {
        Some(dirs) => Ok(dirs.data_dir().to_path_buf()),
        None => home_fallback(".local/share"),
    }
}

/// Save configuration to file
pub fn save_config(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let path = if let Some(p) = path {
        p
    } else {
        get_config_dir()?.join("config.toml")
    };

    let toml_string = toml::to_string_pretty(config)?;
    std::fs::write(&path, toml_string)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(())
}

/// Create a default configuration file if it doesn't exist
pub fn init_config() -> Result<PathBuf> {
    let config_file = get_config_dir()?.join("config.toml");

    if !config_file.exists() {
        save_config(&Config::default(), Some(config_file.clone()))?;
        println!("Created default configuration at: {}", config_file.display());
    }

    Ok(config_file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provider;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.openai.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.gemini.base_url, DEFAULT_GEMINI_BASE_URL);
        assert_eq!(config.session_defaults(), Settings::default());
        assert!(!config.storage.ephemeral);
    }

    #[test]
    fn test_file_overrides_merge_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[defaults]
provider = "OpenAI"
model = "gpt-3.5-turbo"
temperature = 0.3
systemPrompt = "Be brief."

[gemini]
api_key_env = "MY_GEMINI_KEY"
base_url = "http://localhost:9000"

[demo]
slice_chars = 3
slice_delay_ms = 0
initial_delay_ms = 0
"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.defaults.provider, Provider::OpenAi);
        assert_eq!(config.defaults.model, "gpt-3.5-turbo");
        assert_eq!(config.gemini.api_key_env, "MY_GEMINI_KEY");
        assert_eq!(config.openai.base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(config.local_responder().pacing.slice_chars, 3);
        assert_eq!(config.provider_config().gemini_base_url, "http://localhost:9000");
    }

    #[test]
    fn test_mismatched_default_model_is_repaired() {
        let mut config = Config::default();
        config.defaults.provider = Provider::OpenAi;
        config.defaults.model = "gemini-2.5-flash".to_string();
        let settings = config.session_defaults();
        assert_eq!(settings.model, "gpt-4");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        let endpoint = ProviderEndpoint {
            api_key_env: "PARLEY_TEST_SURELY_UNSET_KEY".to_string(),
            base_url: String::new(),
        };
        assert_eq!(endpoint.api_key(), None);
    }
}
