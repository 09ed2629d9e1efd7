//! Row types and typed views over the `events` and `dead_letter_events`
//! tables.

pub mod dead_letter;
pub mod event;
pub mod status;

pub use dead_letter::{DeadLetterEvent, NewDeadLetter};
pub use event::{ClaimedEvent, Event, EventDefect, EventRow, MalformedEvent, StatusCounts};
pub use status::{EventStatus, StatusId};
