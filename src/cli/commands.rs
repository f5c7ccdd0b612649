use anyhow::Result;
use colored::Colorize;

use crate::{
    app::{get_config_dir, init_config, Config},
    models::Provider,
    session::{FileStore, SessionStore, StoreState},
};
use std::path::Path;

use super::Commands;

/// Handle CLI subcommands
pub async fn handle_command(command: &Commands, config: &Config) -> Result<bool> {
    match command {
        Commands::Init => {
            println!("Initializing Parley configuration...");
            let path = init_config()?;
            println!("Configuration ready at {}", path.display());
            Ok(true)
        }
        Commands::Models => {
            list_models();
            Ok(true)
        }
        Commands::Sessions => {
            list_sessions(config)?;
            Ok(true)
        }
        Commands::Status => {
            show_status(config)?;
            Ok(true)
        }
        Commands::Chat => Ok(false), // Continue to chat interface
    }
}

/// List the model catalogue
pub fn list_models() {
    println!("Available models:");
    for provider in Provider::ALL {
        println!("  {}", provider.to_string().bold());
        for (i, model) in provider.models().iter().enumerate() {
            if i == 0 {
                println!("    • {} {}", model.green(), "(default)".dimmed());
            } else {
                println!("    • {}", model.green());
            }
        }
    }
}

/// Saved state in `dir`, leaving the disk untouched when there is none
fn saved_sessions(dir: &Path) -> Result<Option<StoreState>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let storage = FileStore::new(dir)?;
    Ok(SessionStore::read_saved(&storage)?)
}

/// Print saved sessions, newest first
fn list_sessions(config: &Config) -> Result<()> {
    let Some(state) = saved_sessions(&config.data_dir()?)? else {
        println!("No saved sessions.");
        return Ok(());
    };

    println!("Saved sessions:");
    for session in &state.sessions {
        let marker = if state.active_session_id.as_deref() == Some(session.id.as_str()) {
            "*".green()
        } else {
            " ".normal()
        };
        println!(
            "  {} {} | {} messages | {}/{}",
            marker,
            session.title,
            session.messages.len(),
            session.settings.provider,
            session.settings.model
        );
    }
    Ok(())
}

/// Show credentials and storage status
fn show_status(config: &Config) -> Result<()> {
    println!("Parley Status:");
    println!();

    for (name, endpoint) in [("OpenAI", &config.openai), ("Gemini", &config.gemini)] {
        if endpoint.api_key().is_some() {
            println!(
                "  [OK] {}: {} set ({})",
                name, endpoint.api_key_env, endpoint.base_url
            );
        } else {
            println!("  [WARNING] {}: {} not set", name, endpoint.api_key_env);
        }
    }
    if !config.provider_config().any_configured() {
        println!("  [WARNING] No provider configured, replies come from the offline demo responder");
    }

    let config_path = get_config_dir()?.join("config.toml");
    if config_path.exists() {
        println!("  [OK] Configuration: {}", config_path.display());
    } else {
        println!("  [WARNING] Configuration: Not found (using defaults)");
    }

    if config.storage.ephemeral {
        println!("  [OK] Storage: in memory only");
    } else {
        println!("  [OK] Storage: {}", config.data_dir()?.display());
    }

    let defaults = config.session_defaults();
    println!(
        "\n  New chats use {} / {} (temperature {})",
        defaults.provider, defaults.model, defaults.temperature
    );
    println!();
    Ok(())
}
