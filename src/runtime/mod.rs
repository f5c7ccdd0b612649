/// Runtime orchestrator module - Gateway

mod non_interactive;
mod orchestrator;
mod printer;
mod repl;

pub use non_interactive::{ExecutionMetadata, NonInteractiveResult, NonInteractiveRunner};
pub use orchestrator::Orchestrator;
pub use printer::ReplyPrinter;
pub use repl::{Repl, ReplCommand};
