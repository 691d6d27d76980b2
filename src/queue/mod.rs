//! Queue backends for the event bus.
//!
//! Two storage disciplines live here: a binary min-heap keyed by
//! `(priority, sequence)` for priority dispatch, and a circular
//! bounded buffer with pluggable overflow policies for plain FIFO
//! dispatch.

pub mod bounded;
pub mod priority;

pub use bounded::{BoundedBuffer, BufferStats, OverflowCallback, OverflowPolicy};
pub use priority::PriorityQueue;
