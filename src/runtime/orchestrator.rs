use anyhow::Result;
use colored::Colorize;
use std::sync::Arc;

use super::{NonInteractiveRunner, Repl};
use crate::{
    app::{load_config, load_config_file, Config},
    chat::ConversationController,
    cli::{handle_command, Cli},
    models::Provider,
    session::{FileStore, KeyValueStore, MemoryStore, SessionStore},
    stream::{HttpTransport, StreamOrchestrator},
    utils::{log_error, log_info, log_warn},
};

/// Main runtime orchestrator
pub struct Orchestrator {
    cli: Cli,
    config: Config,
}

impl Orchestrator {
    /// Create a new orchestrator from CLI args
    pub fn new(cli: Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => load_config_file(path)?,
            None => match load_config() {
                Ok(cfg) => cfg,
                Err(e) => {
                    eprintln!("Failed to load config: {}. Using defaults.", e);
                    Config::default()
                }
            },
        };
        apply_overrides(&mut config, &cli)?;

        Ok(Self { cli, config })
    }

    /// Run the orchestrator
    pub async fn run(self) -> Result<()> {
        if let Some(command) = &self.cli.command {
            if handle_command(command, &self.config).await? {
                return Ok(()); // Command handled, exit
            }
            // Continue to chat for Commands::Chat
        }

        if let Some(prompt) = &self.cli.prompt {
            let controller = build_controller(&self.config, Arc::new(MemoryStore::new()))?;
            let result = NonInteractiveRunner::new(controller).execute(prompt).await;
            result.print();
            if let Some(error) = &result.error {
                log_error(
                    "❌",
                    format!(
                        "Prompt failed after {} ms: {}",
                        result.metadata.duration_ms, error
                    ),
                );
                std::process::exit(1);
            }
            return Ok(());
        }

        let storage = self.open_storage();
        let controller = build_controller(&self.config, storage)?;
        if !self.config.provider_config().any_configured() {
            println!(
                "{}",
                "No API keys found; replies come from the offline demo responder.".yellow()
            );
        }
        Repl::new(controller).run().await
    }

    fn open_storage(&self) -> Arc<dyn KeyValueStore> {
        if self.config.storage.ephemeral {
            return Arc::new(MemoryStore::new());
        }
        match self.config.data_dir().and_then(|dir| Ok(FileStore::new(dir)?)) {
            Ok(store) => {
                log_info("💾", format!("Sessions stored in {}", store.dir().display()));
                Arc::new(store)
            }
            Err(e) => {
                log_warn("⚠️", format!("Session storage unavailable ({}), keeping chats in memory", e));
                eprintln!("Sessions won't be saved: {}", e);
                Arc::new(MemoryStore::new())
            }
        }
    }
}

/// Fold `--provider`, `--model` and `--ephemeral` into the loaded config
fn apply_overrides(config: &mut Config, cli: &Cli) -> Result<()> {
    if let Some(name) = &cli.provider {
        let provider: Provider = name.parse()?;
        config.defaults = config.defaults.clone().with_provider(provider);
    }
    if let Some(model) = &cli.model {
        let provider = config.defaults.provider;
        if !provider.supports_model(model) {
            anyhow::bail!(
                "Model '{}' is not available for {} (available: {})",
                model,
                provider,
                provider.models().join(", ")
            );
        }
        config.defaults.model = model.clone();
    }
    if cli.ephemeral {
        config.storage.ephemeral = true;
    }
    Ok(())
}

fn build_controller(
    config: &Config,
    storage: Arc<dyn KeyValueStore>,
) -> Result<Arc<ConversationController>> {
    let store = Arc::new(SessionStore::load(storage, config.session_defaults()));
    let orchestrator = StreamOrchestrator::new(
        config.provider_config(),
        Arc::new(HttpTransport::new()?),
    )
    .with_local_responder(config.local_responder());
    Ok(Arc::new(ConversationController::new(
        store,
        Arc::new(orchestrator),
    )))
}
