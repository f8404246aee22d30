pub mod commands;
pub mod dispatcher;
pub mod natural_language;

pub use commands::{Domain, RawCommand};
pub use dispatcher::{Assistant, CommandResult};
pub use natural_language::NaturalLanguageAdapter;
