//! Event system connecting features.
//!
//! ## Learning: Observer Pattern in Rust
//!
//! Rust's ownership model makes traditional observer patterns tricky.
//! Here the bus owns every callback as an `Rc<dyn Fn(&Event)>` and hands
//! subscribers back a [`Subscription`] that only holds a `Weak` pointer
//! into the registry.
//!
//! Key properties:
//! - Delivery is synchronous: `publish` returns after every callback ran
//! - Delivery order for one kind is subscription order
//! - The subscriber list is snapshotted before delivery, so callbacks may
//!   subscribe or unsubscribe freely; only later publishes see the change
//! - A panicking callback is not caught and aborts the rest of that delivery

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::str::FromStr;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::api::Severity;
use crate::document::{Document, FileHandle};
use crate::{CoreError, CoreResult};

/// The name an event is published and subscribed under.
///
/// Built-in kinds render to the names features have always used
/// (`document:uploaded`, `settings:changed`, ...). Anything else is a
/// [`EventKind::Custom`] kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `document:upload:requested`
    UploadRequested,
    /// `document:uploaded`
    DocumentUploaded,
    /// `document:text:updated`
    TextUpdated,
    /// `document:clear`
    DocumentClear,
    /// `document:processing:start`
    ProcessingStart,
    /// `document:processing:end`
    ProcessingEnd,
    /// `settings:changed`
    SettingsChanged,
    /// `ui:notification`
    Notification,
    /// A feature-defined event
    Custom(EventName),
}

impl EventKind {
    /// Parses an event name.
    ///
    /// Known names map to their built-in kind. Empty names are rejected.
    pub fn parse(name: &str) -> CoreResult<Self> {
        let kind = match name {
            "" => return Err(CoreError::EmptyEventName),
            "document:upload:requested" => Self::UploadRequested,
            "document:uploaded" => Self::DocumentUploaded,
            "document:text:updated" => Self::TextUpdated,
            "document:clear" => Self::DocumentClear,
            "document:processing:start" => Self::ProcessingStart,
            "document:processing:end" => Self::ProcessingEnd,
            "settings:changed" => Self::SettingsChanged,
            "ui:notification" => Self::Notification,
            other => Self::Custom(EventName(other.to_string())),
        };
        Ok(kind)
    }

    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::UploadRequested => "document:upload:requested",
            Self::DocumentUploaded => "document:uploaded",
            Self::TextUpdated => "document:text:updated",
            Self::DocumentClear => "document:clear",
            Self::ProcessingStart => "document:processing:start",
            Self::ProcessingEnd => "document:processing:end",
            Self::SettingsChanged => "settings:changed",
            Self::Notification => "ui:notification",
            Self::Custom(name) => name.as_str(),
        }
    }
}

impl FromStr for EventKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of a feature-defined event.
///
/// Only obtainable through [`EventKind::parse`], so it is never empty and
/// never shadows a built-in name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventName(String);

impl EventName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Events exchanged between the core and features.
///
/// ## Learning: Enum Variants
///
/// Each variant fixes its payload shape, so a publisher and a subscriber
/// can't disagree about what `settings:changed` carries.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A raw file was handed off for ingestion
    UploadRequested { file: FileHandle },
    /// A document was fully constructed and stored
    DocumentUploaded { document: Document, file: FileHandle },
    /// The current document's text changed
    TextUpdated { text: String },
    /// Request to reset upload/input state
    DocumentClear,
    /// Some feature became busy
    ProcessingStart,
    /// Some feature is no longer busy
    ProcessingEnd,
    /// A setting was persisted
    SettingsChanged { key: String, value: Value },
    /// Request to surface a user-facing message
    Notification { message: String, severity: Severity },
    /// Feature-defined event with an open payload
    Custom { name: EventName, payload: Value },
}

impl Event {
    /// Builds a feature-defined event.
    ///
    /// Fails if `name` is empty or names a built-in event.
    pub fn custom(name: &str, payload: Value) -> CoreResult<Self> {
        match EventKind::parse(name)? {
            EventKind::Custom(name) => Ok(Self::Custom { name, payload }),
            _ => Err(CoreError::ReservedEventName(name.to_string())),
        }
    }

    /// Returns the kind this event is delivered under.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::UploadRequested { .. } => EventKind::UploadRequested,
            Self::DocumentUploaded { .. } => EventKind::DocumentUploaded,
            Self::TextUpdated { .. } => EventKind::TextUpdated,
            Self::DocumentClear => EventKind::DocumentClear,
            Self::ProcessingStart => EventKind::ProcessingStart,
            Self::ProcessingEnd => EventKind::ProcessingEnd,
            Self::SettingsChanged { .. } => EventKind::SettingsChanged,
            Self::Notification { .. } => EventKind::Notification,
            Self::Custom { name, .. } => EventKind::Custom(name.clone()),
        }
    }
}

/// A subscriber callback.
///
/// Two handlers are the same subscriber when they point at the same
/// allocation, which is what [`EventBus::off`] compares.
pub type Handler = Rc<dyn Fn(&Event)>;

struct Registration {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<EventKind, Vec<Registration>>,
}

impl Registry {
    fn remove_where(&mut self, kind: &EventKind, mut pred: impl FnMut(&Registration) -> bool) {
        if let Some(list) = self.listeners.get_mut(kind) {
            list.retain(|r| !pred(r));
            if list.is_empty() {
                self.listeners.remove(kind);
            }
        }
    }
}

/// Publish/subscribe registry shared by the core and every feature.
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Rc<RefCell<Registry>>,
}

impl EventBus {
    /// Creates a new event bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `callback` to events of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&Event) + 'static,
    {
        self.subscribe_handler(kind, Rc::new(callback))
    }

    /// Subscribes a caller-held handler, which can later be passed to
    /// [`EventBus::off`].
    pub fn subscribe_handler(&self, kind: EventKind, handler: Handler) -> Subscription {
        let mut registry = self.registry.borrow_mut();
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .listeners
            .entry(kind.clone())
            .or_default()
            .push(Registration { id, handler });

        tracing::trace!(event = %kind, id, "subscribed");

        Subscription {
            registry: Rc::downgrade(&self.registry),
            kind,
            id,
            disposed: Cell::new(false),
        }
    }

    /// Subscribes `method` with `context` bound as its receiver.
    pub fn subscribe_with<C: 'static>(
        &self,
        kind: EventKind,
        context: Rc<C>,
        method: fn(&C, &Event),
    ) -> Subscription {
        self.subscribe(kind, move |event| method(&context, event))
    }

    /// Delivers `event` to every subscriber of its kind, in subscription order.
    ///
    /// Publishing with no subscribers is a no-op.
    pub fn publish(&self, event: Event) {
        let kind = event.kind();
        let snapshot: Vec<Handler> = {
            let registry = self.registry.borrow();
            match registry.listeners.get(&kind) {
                Some(list) => list.iter().map(|r| Rc::clone(&r.handler)).collect(),
                None => return,
            }
        };

        tracing::debug!(event = %kind, subscribers = snapshot.len(), "publishing");

        for handler in snapshot {
            handler(&event);
        }
    }

    /// Alias for [`EventBus::publish`].
    pub fn emit(&self, event: Event) {
        self.publish(event);
    }

    /// Removes every subscription of `kind` registered with `handler`.
    pub fn off(&self, kind: &EventKind, handler: &Handler) {
        self.registry
            .borrow_mut()
            .remove_where(kind, |r| std::ptr::addr_eq(Rc::as_ptr(&r.handler), Rc::as_ptr(handler)));
    }

    /// Returns how many subscriptions exist for `kind`.
    pub fn subscriber_count(&self, kind: &EventKind) -> usize {
        self.registry
            .borrow()
            .listeners
            .get(kind)
            .map_or(0, Vec::len)
    }

    /// Forwards events of `kind` into an async stream.
    pub fn stream(&self, kind: EventKind) -> EventStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscription = self.subscribe(kind, move |event| {
            // Ignore error if the stream was dropped mid-delivery
            let _ = sender.send(event.clone());
        });
        EventStream {
            receiver,
            subscription,
        }
    }
}

/// Disposer for one subscription.
///
/// Dropping it does not unsubscribe; call [`Subscription::dispose`].
pub struct Subscription {
    registry: Weak<RefCell<Registry>>,
    kind: EventKind,
    id: u64,
    disposed: Cell<bool>,
}

impl Subscription {
    /// Removes exactly this subscription. Later calls do nothing.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.borrow_mut().remove_where(&self.kind, |r| r.id == self.id);
            tracing::trace!(event = %self.kind, id = self.id, "unsubscribed");
        }
    }

    /// Returns the kind this subscription listens to.
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Returns true while the subscription is still registered.
    pub fn is_active(&self) -> bool {
        if self.disposed.get() {
            return false;
        }
        self.registry.upgrade().is_some_and(|registry| {
            registry
                .borrow()
                .listeners
                .get(&self.kind)
                .is_some_and(|list| list.iter().any(|r| r.id == self.id))
        })
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("disposed", &self.disposed.get())
            .finish()
    }
}

/// Async view over one event kind.
///
/// ## Example
///
/// ```ignore
/// let mut uploads = api.events().stream(EventKind::DocumentUploaded);
/// while let Some(event) = uploads.next().await {
///     // Handle upload
/// }
/// ```
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<Event>,
    subscription: Subscription,
}

impl EventStream {
    /// Waits for the next event.
    pub async fn next(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Returns the next already-delivered event, if any.
    pub fn try_next(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.subscription.dispose();
    }
}
