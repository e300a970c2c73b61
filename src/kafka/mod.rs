pub mod broker;
pub mod consumer;
pub mod producer;

pub use broker::*;
pub use consumer::*;
pub use producer::*;
