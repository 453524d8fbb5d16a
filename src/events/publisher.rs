//! # Event Bus
//!
//! In-process publish/subscribe keyed by event name.
//!
//! ## Delivery Contract
//!
//! - `publish` awaits every current subscriber of the event name, in
//!   subscription order, before it returns
//! - Handlers may publish further events; the subscriber table is not locked
//!   while handlers run, so re-entrant publishing is safe
//! - Every subscriber sees the event even when an earlier one fails; the
//!   first failure is returned to the publisher and the rest are logged
//! - `subscribe` and `unsubscribe` are idempotent
//!
//! ## Usage
//!
//! ```rust
//! use casework::events::{handler_fn, EventBus};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let bus = EventBus::new();
//! let handle = bus.subscribe(
//!     "application_submitted",
//!     handler_fn(|event| async move {
//!         println!("received {}", event.name);
//!         Ok(())
//!     }),
//! );
//!
//! bus.publish("application_submitted", json!({"case_id": "0b6c..."}))
//!     .await
//!     .unwrap();
//!
//! assert!(bus.unsubscribe(&handle));
//! assert!(!bus.unsubscribe(&handle));
//! # });
//! ```

use crate::constants::payload;
use crate::error::{Result, WorkflowError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Event that has been published
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub payload: Value,
    pub published_at: DateTime<Utc>,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            published_at: Utc::now(),
        }
    }

    /// The `case_id` payload key parsed as a UUID.
    pub fn case_id(&self) -> Result<Uuid> {
        let raw = self
            .payload
            .get(payload::CASE_ID)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                WorkflowError::invalid_argument(format!(
                    "event '{}' has no '{}' in its payload",
                    self.name,
                    payload::CASE_ID
                ))
            })?;

        Uuid::parse_str(raw).map_err(|e| {
            WorkflowError::invalid_argument(format!(
                "event '{}' has malformed case_id '{raw}': {e}",
                self.name
            ))
        })
    }
}

/// Trait for event subscribers
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> Result<()>;
}

type HandlerFn = dyn Fn(Event) -> BoxFuture<'static, Result<()>> + Send + Sync;

struct FnHandler(Box<HandlerFn>);

#[async_trait]
impl EventHandler for FnHandler {
    async fn handle(&self, event: &Event) -> Result<()> {
        (self.0)(event.clone()).await
    }
}

/// Wrap an async closure as a subscriber.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(Box::new(
        move |event| -> BoxFuture<'static, Result<()>> { Box::pin(f(event)) },
    )))
}

/// Opaque token returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

struct Subscription {
    event_name: String,
    handler: Arc<dyn EventHandler>,
}

#[derive(Default)]
struct BusInner {
    subscriptions: RwLock<BTreeMap<SubscriptionHandle, Subscription>>,
    next_id: AtomicU64,
}

/// Shared in-process event bus. Clones share the same subscriber table.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.inner.subscriptions.read().len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to `event_name`.
    ///
    /// Subscribing the same handler (by pointer) to the same name again
    /// returns the original handle instead of registering twice.
    pub fn subscribe(
        &self,
        event_name: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionHandle {
        let event_name = event_name.into();
        let mut subscriptions = self.inner.subscriptions.write();

        if let Some((handle, _)) = subscriptions.iter().find(|(_, sub)| {
            sub.event_name == event_name && Arc::ptr_eq(&sub.handler, &handler)
        }) {
            return *handle;
        }

        let handle = SubscriptionHandle(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(event = %event_name, handle = handle.0, "Subscribed handler");
        subscriptions.insert(
            handle,
            Subscription {
                event_name,
                handler,
            },
        );
        handle
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.inner.subscriptions.write().remove(handle).is_some()
    }

    /// Publish an event with the given name and payload
    pub async fn publish(&self, event_name: impl Into<String>, payload: Value) -> Result<()> {
        self.publish_event(Event::new(event_name, payload)).await
    }

    pub async fn publish_event(&self, event: Event) -> Result<()> {
        let handlers: Vec<Arc<dyn EventHandler>> = {
            let subscriptions = self.inner.subscriptions.read();
            subscriptions
                .values()
                .filter(|sub| sub.event_name == event.name)
                .map(|sub| Arc::clone(&sub.handler))
                .collect()
        };

        debug!(event = %event.name, subscribers = handlers.len(), "Publishing event");

        let mut first_failure = None;
        for handler in handlers {
            if let Err(error) = handler.handle(&event).await {
                if first_failure.is_none() {
                    first_failure = Some(error);
                } else {
                    warn!(event = %event.name, error = %error, "Additional subscriber failed");
                }
            }
        }

        match first_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Get the number of active subscribers for an event name
    pub fn subscriber_count(&self, event_name: &str) -> usize {
        self.inner
            .subscriptions
            .read()
            .values()
            .filter(|sub| sub.event_name == event_name)
            .count()
    }
}
