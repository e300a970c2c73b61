//! Relational-store collaborators. Each trait is the slice of the store the
//! pipeline needs; the in-memory adapters keep the same atomicity guarantees.

pub mod event;
pub mod reminder_delay;
pub mod reservation;
pub mod waitlist;

pub use event::*;
pub use reminder_delay::*;
pub use reservation::*;
pub use waitlist::*;
