// Gateway module for chat - follows the Train Station Pattern
// All external access must go through this gateway

mod controller;

pub use controller::{ChatView, ControllerStatus, ConversationController};
