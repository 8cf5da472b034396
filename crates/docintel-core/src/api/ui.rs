//! UI capability: mount points and notifications.
//!
//! The core never renders anything. A [`Container`] is a headless mount
//! point whose state a frontend can mirror, and notifications are only
//! published as events.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::event::{Event, EventBus};

/// Severity tag carried by notifications and status lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named mount point a feature renders into.
#[derive(Debug)]
pub struct Container {
    id: String,
    status: RefCell<String>,
    status_class: Cell<Option<Severity>>,
    status_expires: Cell<Option<Instant>>,
    enabled: Cell<bool>,
}

impl Container {
    fn new(id: String) -> Self {
        Self {
            id,
            status: RefCell::new(String::new()),
            status_class: Cell::new(None),
            status_expires: Cell::new(None),
            enabled: Cell::new(true),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the status line.
    pub fn status(&self) -> String {
        self.expire_status();
        self.status.borrow().clone()
    }

    /// Returns the status styling, if any.
    pub fn status_class(&self) -> Option<Severity> {
        self.expire_status();
        self.status_class.get()
    }

    /// Replaces the status line.
    pub fn set_status(&self, text: impl Into<String>, class: Option<Severity>) {
        *self.status.borrow_mut() = text.into();
        self.status_class.set(class);
        self.status_expires.set(None);
    }

    /// Replaces the status line until `ttl` has passed.
    pub fn set_status_for(&self, text: impl Into<String>, class: Option<Severity>, ttl: Duration) {
        self.set_status(text, class);
        self.status_expires.set(Instant::now().checked_add(ttl));
    }

    fn expire_status(&self) {
        if self
            .status_expires
            .get()
            .is_some_and(|at| Instant::now() >= at)
        {
            self.clear_status();
        }
    }

    /// Empties the status line.
    pub fn clear_status(&self) {
        self.set_status(String::new(), None);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }
}

/// UI sub-surface of [`CoreApi`](super::CoreApi).
pub struct Ui {
    containers: RefCell<HashMap<String, Rc<Container>>>,
    events: EventBus,
}

impl Ui {
    pub(crate) fn new(events: EventBus) -> Self {
        Self {
            containers: RefCell::new(HashMap::new()),
            events,
        }
    }

    /// Declares a mount point. Declaring an existing ID returns it unchanged.
    pub fn register_container(&self, id: impl Into<String>) -> Rc<Container> {
        let id = id.into();
        let mut containers = self.containers.borrow_mut();
        let container = containers
            .entry(id.clone())
            .or_insert_with(|| Rc::new(Container::new(id)));
        Rc::clone(container)
    }

    /// Resolves a mount point. Callers must handle `None`.
    pub fn get_container(&self, id: &str) -> Option<Rc<Container>> {
        self.containers.borrow().get(id).cloned()
    }

    /// Publishes a `ui:notification` event.
    pub fn show_notification(&self, message: impl Into<String>, severity: Severity) {
        self.events.publish(Event::Notification {
            message: message.into(),
            severity,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn test_container_registry() {
        let ui = Ui::new(EventBus::new());
        assert!(ui.get_container("upload-container").is_none());

        let registered = ui.register_container("upload-container");
        registered.set_status("Processing...", None);

        let again = ui.register_container("upload-container");
        assert!(Rc::ptr_eq(&registered, &again));

        let found = ui.get_container("upload-container").unwrap();
        assert_eq!(found.status(), "Processing...");
        assert!(found.is_enabled());
    }

    #[test]
    fn test_timed_status_expires() {
        let ui = Ui::new(EventBus::new());
        let container = ui.register_container("upload-container");

        container.set_status_for("Loaded: a.txt", Some(Severity::Success), Duration::from_secs(60));
        assert_eq!(container.status(), "Loaded: a.txt");
        assert_eq!(container.status_class(), Some(Severity::Success));

        container.set_status_for("Loaded: b.txt", Some(Severity::Success), Duration::ZERO);
        assert_eq!(container.status(), "");
        assert_eq!(container.status_class(), None);

        // A plain status replaces a timed one and stays
        container.set_status_for("Loaded: c.txt", Some(Severity::Success), Duration::ZERO);
        container.set_status("Processing...", None);
        assert_eq!(container.status(), "Processing...");
    }

    #[test]
    fn test_notification_is_published() {
        let events = EventBus::new();
        let ui = Ui::new(events.clone());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in = Rc::clone(&seen);
        let _s = events.subscribe(EventKind::Notification, move |event| {
            if let Event::Notification { message, severity } = event {
                seen_in.borrow_mut().push((message.clone(), *severity));
            }
        });

        ui.show_notification("Saved", Severity::Success);
        assert_eq!(*seen.borrow(), vec![("Saved".to_string(), Severity::Success)]);
    }

    #[test]
    fn test_severity_wire_names() {
        assert_eq!(serde_json::to_string(&Severity::Warning).unwrap(), "\"warning\"");
        assert_eq!(Severity::default(), Severity::Info);
    }
}
