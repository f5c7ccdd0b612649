use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::printer::ReplyPrinter;
use crate::chat::ConversationController;
use crate::models::{Provider, SettingsPatch};

/// One line of user input
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Send(String),
    New,
    List,
    Switch(usize),
    Delete(usize),
    Clear,
    Retry,
    Provider(String),
    Model(String),
    Temperature(f32),
    System(String),
    Help,
    Quit,
    Invalid(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Some(ReplCommand::Send(line.to_string()));
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        let index = |arg: &str| arg.parse::<usize>().ok().filter(|n| *n > 0);

        let parsed = match (name, arg) {
            ("new", _) => ReplCommand::New,
            ("list", _) => ReplCommand::List,
            ("clear", _) => ReplCommand::Clear,
            ("retry", _) => ReplCommand::Retry,
            ("help", _) => ReplCommand::Help,
            ("quit" | "exit", _) => ReplCommand::Quit,
            ("switch", arg) => index(arg).map_or_else(|| usage("/switch N"), ReplCommand::Switch),
            ("delete", arg) => index(arg).map_or_else(|| usage("/delete N"), ReplCommand::Delete),
            ("provider", arg) if !arg.is_empty() => ReplCommand::Provider(arg.to_string()),
            ("model", arg) if !arg.is_empty() => ReplCommand::Model(arg.to_string()),
            ("temp", arg) => arg
                .parse::<f32>()
                .ok()
                .filter(|t| (0.0..=1.0).contains(t))
                .map_or_else(|| usage("/temp X (0.0 - 1.0)"), ReplCommand::Temperature),
            ("system", arg) if !arg.is_empty() => ReplCommand::System(arg.to_string()),
            ("provider", _) => usage("/provider NAME"),
            ("model", _) => usage("/model NAME"),
            ("system", _) => usage("/system TEXT"),
            (other, _) => ReplCommand::Invalid(format!("Unknown command /{}", other)),
        };
        Some(parsed)
    }
}

fn usage(form: &str) -> ReplCommand {
    ReplCommand::Invalid(format!("Usage: {}", form))
}

const HELP: &str = "\
Commands:
  /new              start a new chat
  /list             list chats
  /switch N         switch to chat N
  /delete N         delete chat N
  /clear            clear the current chat
  /retry            resend the last message
  /provider NAME    openai, gemini or dialogflow
  /model NAME       pick a model of the current provider
  /temp X           temperature between 0 and 1
  /system TEXT      set the system prompt
  /quit             exit";

/// Line-oriented chat prompt on stdin/stdout
pub struct Repl {
    controller: Arc<ConversationController>,
    printer: ReplyPrinter,
}

impl Repl {
    pub fn new(controller: Arc<ConversationController>) -> Self {
        Self {
            controller,
            printer: ReplyPrinter::default(),
        }
    }

    pub async fn run(mut self) -> Result<()> {
        println!("{}", "Type a message, or /help for commands.".dimmed());
        self.show_header();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("{} ", ">".cyan().bold());
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let Some(command) = ReplCommand::parse(&line) else {
                continue;
            };
            if command == ReplCommand::Quit {
                break;
            }
            self.execute(command).await;
        }
        Ok(())
    }

    async fn execute(&mut self, command: ReplCommand) {
        let controller = Arc::clone(&self.controller);
        match command {
            ReplCommand::Send(text) => {
                self.stream(async move { controller.send(&text).await }).await;
            }
            ReplCommand::Retry => {
                self.stream(async move { controller.retry().await }).await;
            }
            ReplCommand::New => {
                controller.start_new_chat();
                self.show_header();
            }
            ReplCommand::List => self.list_sessions(),
            ReplCommand::Switch(n) => match self.session_id_at(n) {
                Some(id) => {
                    controller.switch_chat(&id);
                    self.show_history();
                }
                None => println!("{}", format!("No chat #{}", n).yellow()),
            },
            ReplCommand::Delete(n) => match self.session_id_at(n) {
                Some(id) => {
                    controller.delete_chat(&id);
                    self.show_header();
                }
                None => println!("{}", format!("No chat #{}", n).yellow()),
            },
            ReplCommand::Clear => {
                controller.clear_chat();
                println!("{}", "Chat cleared.".dimmed());
            }
            ReplCommand::Provider(name) => match name.parse::<Provider>() {
                Ok(provider) => {
                    controller.update_settings(&SettingsPatch::switch_provider(provider));
                    self.show_header();
                }
                Err(e) => println!("{}", e.detail().yellow()),
            },
            ReplCommand::Model(model) => {
                let provider = controller.view().settings.provider;
                if provider.supports_model(&model) {
                    controller.update_settings(&SettingsPatch::model(model));
                    self.show_header();
                } else {
                    println!(
                        "{}",
                        format!("{} offers: {}", provider, provider.models().join(", ")).yellow()
                    );
                }
            }
            ReplCommand::Temperature(t) => {
                controller.update_settings(&SettingsPatch::temperature(t));
                self.show_header();
            }
            ReplCommand::System(prompt) => {
                controller.update_settings(&SettingsPatch::system_prompt(prompt));
                println!("{}", "System prompt updated.".dimmed());
            }
            ReplCommand::Help => println!("{}", HELP),
            ReplCommand::Invalid(message) => println!("{}", message.yellow()),
            ReplCommand::Quit => {}
        }
    }

    /// Run a send/retry while echoing the reply as it streams in
    async fn stream(&mut self, work: impl std::future::Future<Output = ()>) {
        let mut rx = self.controller.store().subscribe();
        self.printer.reset(&rx.borrow_and_update().state);

        tokio::pin!(work);
        loop {
            tokio::select! {
                _ = &mut work => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = rx.borrow_and_update().clone();
                    self.printer.print(&snapshot.state);
                }
            }
        }
        // pick up the final replace, which can race the completion
        self.printer.print(&self.controller.store().state());
        println!();
    }

    fn session_id_at(&self, n: usize) -> Option<String> {
        self.controller
            .view()
            .sessions
            .get(n - 1)
            .map(|s| s.id.clone())
    }

    fn list_sessions(&self) {
        let view = self.controller.view();
        for (i, session) in view.sessions.iter().enumerate() {
            let active = view.active_session_id.as_deref() == Some(session.id.as_str());
            let line = format!("{:>3}. {} ({} messages)", i + 1, session.title, session.messages.len());
            if active {
                println!("{}", line.green());
            } else {
                println!("{}", line);
            }
        }
    }

    fn show_header(&self) {
        let view = self.controller.view();
        let title = view
            .sessions
            .iter()
            .find(|s| Some(s.id.as_str()) == view.active_session_id.as_deref())
            .map(|s| s.title.clone())
            .unwrap_or_default();
        println!(
            "{} {}",
            format!("[{}]", title).bold(),
            format!(
                "{}/{} t={}",
                view.settings.provider, view.settings.model, view.settings.temperature
            )
            .dimmed()
        );
    }

    fn show_history(&self) {
        self.show_header();
        for message in self.controller.view().messages {
            let label = match message.sender {
                crate::models::Sender::User => "you".cyan(),
                crate::models::Sender::Bot => "bot".magenta(),
                crate::models::Sender::System => "sys".dimmed(),
            };
            if message.error {
                println!("{} {}", label, message.text.red());
            } else {
                println!("{} {}", label, message.text);
            }
        }
    }
}
