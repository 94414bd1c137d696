//! Infrastructure layer - wiring of adapters and services

pub mod service_container;

pub use service_container::{ChangeReceivers, Publishers, Repositories, ServiceContainer};
