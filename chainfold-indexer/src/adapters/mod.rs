//! Adapters (implementations of core ports)

pub mod publisher;
pub mod storage;

pub use publisher::{ChannelPublisher, FanoutPublisher, TracingPublisher};
