//! Repository layer: one struct per table, associated async functions taking
//! a `&PgPool`.

pub mod dead_letter_repo;
pub mod event_repo;

pub use dead_letter_repo::DeadLetterRepo;
pub use event_repo::EventRepo;
