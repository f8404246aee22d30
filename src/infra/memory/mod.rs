pub mod in_memory_calendar;
pub mod in_memory_sheet;

pub use in_memory_calendar::InMemoryCalendar;
pub use in_memory_sheet::InMemorySheet;
