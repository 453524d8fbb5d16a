pub mod publisher;

// Re-export key types for convenience
pub use publisher::{handler_fn, Event, EventBus, EventHandler, SubscriptionHandle};
