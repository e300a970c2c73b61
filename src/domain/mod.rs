pub mod dead_letter;
pub mod event_open;
pub mod mutation;
pub mod reminder;
pub mod schemas;
pub mod vacancy;

pub use dead_letter::*;
pub use event_open::*;
pub use mutation::*;
pub use reminder::*;
pub use schemas::*;
pub use vacancy::*;
