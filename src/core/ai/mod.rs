pub mod ai_service;
pub mod models;

pub use ai_service::{strip_code_fences, AiProvider, AiService};
pub use models::{AiConfig, AiMessage};
