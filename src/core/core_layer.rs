// The core module contains all business logic.
// Each domain gets its own submodule; none of them know about HTTP.

#[path = "errors.rs"]
pub mod errors;

#[path = "credentials.rs"]
pub mod credentials;

#[path = "results.rs"]
pub mod results;

#[path = "ai/mod.rs"]
pub mod ai;

#[path = "accounting/mod.rs"]
pub mod accounting;

#[path = "calendar/mod.rs"]
pub mod calendar;

#[path = "weather/mod.rs"]
pub mod weather;

#[path = "assistant/mod.rs"]
pub mod assistant;
