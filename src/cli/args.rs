use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(version)]
#[command(about = "A multi-session, provider-agnostic streaming chat client", long_about = None)]
pub struct Cli {
    /// Provider for new chats (openai, gemini, dialogflow)
    #[arg(long)]
    pub provider: Option<String>,

    /// Model for new chats (must belong to the provider)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Keep sessions in memory only; nothing is written to disk
    #[arg(long)]
    pub ephemeral: bool,

    /// Send a single message, print the reply and exit
    #[arg(short, long)]
    pub prompt: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize configuration
    Init,
    /// List available providers and models
    Models,
    /// List saved chat sessions
    Sessions,
    /// Start a chat session (default)
    Chat,
    /// Check provider credentials and storage
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags_and_subcommand() {
        let cli = Cli::parse_from(["parley", "--provider", "openai", "-m", "gpt-4", "--ephemeral", "status"]);
        assert_eq!(cli.provider.as_deref(), Some("openai"));
        assert_eq!(cli.model.as_deref(), Some("gpt-4"));
        assert!(cli.ephemeral);
        assert!(matches!(cli.command, Some(Commands::Status)));
    }

    #[test]
    fn test_defaults_to_chat() {
        let cli = Cli::parse_from(["parley"]);
        assert!(cli.command.is_none());
        assert!(cli.prompt.is_none());
    }
}
