//! Channel plumbing: the in-memory adapter and the receive loop.

pub mod memory;
pub mod receiver;

pub use memory::{EndpointHalf, Frame, MemoryChannel};
pub use receiver::ReceiveLoop;
