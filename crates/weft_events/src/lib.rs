//! WEFT Event Feed
//!
//! Typed lifecycle and execution events, the `EventFeed` seam the registry
//! and engine publish through, an in-process bus and a recording double.

#![warn(clippy::all)]

pub mod bus;
pub mod event;
pub mod recording;

pub use bus::{EventBus, EventFeed, EventHandler, SubscriptionId};
pub use event::{
    EngineLifecycle, Event, EventKind, OperationCompleted, OperationFailed, OperationStarted,
    ProtocolRegistered, ProtocolUnregistered, ValidationFailed,
};
pub use recording::RecordingFeed;
