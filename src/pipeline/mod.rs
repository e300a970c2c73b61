pub mod dead_letter;
pub mod event_open;
pub mod index_sync;
pub mod reminder;
pub mod vacancy;

pub use dead_letter::*;
pub use event_open::*;
pub use index_sync::*;
pub use reminder::*;
pub use vacancy::*;
