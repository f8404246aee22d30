// The infra module contains implementations of core traits.
// Each remote service gets its own submodule.

#[path = "google/mod.rs"]
pub mod google;

#[path = "weather/mod.rs"]
pub mod weather;

#[path = "ai/mod.rs"]
pub mod ai;

#[path = "memory/mod.rs"]
pub mod memory;
