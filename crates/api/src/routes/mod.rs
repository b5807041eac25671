pub mod admin;
pub mod completions;
pub mod health;
pub mod messages;

pub use admin::{list_responses, reload_responses};
pub use completions::chat_completions;
pub use health::health_check;
pub use messages::create_message;
