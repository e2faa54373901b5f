//! Presentation events
//!
//! Lifecycle notifications for whatever surface renders lobbies and matches.

pub mod publisher;

pub use publisher::{
    deliver, EventEnvelope, EventPublisher, EventQueue, HttpEventPublisher, LoggingEventPublisher,
    MockEventPublisher, PublisherConfig, QueuedEventPublisher,
};
