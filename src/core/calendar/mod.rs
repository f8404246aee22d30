pub mod calendar_models;
pub mod calendar_service;

pub use calendar_models::{CalendarEvent, EventLookup, EventPatch, NewEvent, TimeWindow, WindowRequest};
pub use calendar_service::{CalendarService, CalendarStore};
