// User-facing alerts raised by the store

use std::cell::RefCell;
use std::rc::Rc;
use tracing::error;

/// Sink for messages the user must see before carrying on
pub trait Alert {
    fn alert(&self, message: &str);
}

impl<A: Alert + ?Sized> Alert for Rc<A> {
    fn alert(&self, message: &str) {
        (**self).alert(message)
    }
}

/// Sends alerts to the log only
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlert;

impl Alert for LogAlert {
    fn alert(&self, message: &str) {
        error!(alert = true, "{}", message);
    }
}

/// Keeps every alert, for tests and for callers that render them later
#[derive(Debug, Default)]
pub struct CollectingAlert {
    messages: RefCell<Vec<String>>,
}

impl CollectingAlert {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }

    pub fn take(&self) -> Vec<String> {
        self.messages.take()
    }
}

impl Alert for CollectingAlert {
    fn alert(&self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }
}

/// Remediation text shown when a write hits the storage quota
pub fn quota_message(collection: &str) -> String {
    format!(
        "Storage is full: your changes to {} were not saved.\n\
         To free up space:\n\
         1. Export your data (pskstore export) to keep a backup\n\
         2. Delete old files or projects you no longer need\n\
         3. Clear cached data, then try again",
        collection
    )
}
