//! Mutation watcher
//!
//! Consent banners are often injected well after load. The host observes
//! child-list changes over the whole body subtree and hands each batch of
//! added elements here; a batch is only interesting if something in it looks
//! cookie related. Once consent is resolved the host observer is disconnected.

use optout_dom::Dom;

use crate::validator::ContextValidator;

/// Handle to the host's mutation observer
pub trait MutationObserver {
    /// Stop delivering mutation records
    fn disconnect(&mut self);
}

pub struct MutationWatcher {
    connected: bool,
    batches_seen: u64,
    observer: Option<Box<dyn MutationObserver>>,
}

impl MutationWatcher {
    pub fn new() -> Self {
        Self {
            connected: true,
            batches_seen: 0,
            observer: None,
        }
    }

    /// Attach the host observer that feeds this watcher
    pub fn set_observer(&mut self, observer: Box<dyn MutationObserver>) {
        self.observer = Some(observer);
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Stop observing; batches are ignored from here on
    pub fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;

        if let Some(observer) = self.observer.as_mut() {
            observer.disconnect();
        }
        tracing::debug!(batches = self.batches_seen, "Mutation watcher disconnected");
    }

    pub fn batches_seen(&self) -> u64 {
        self.batches_seen
    }

    /// True if the batch warrants a rescan
    pub fn observe<D: Dom>(&mut self, dom: &D, added: &[D::Node], validator: &ContextValidator) -> bool {
        if !self.connected {
            return false;
        }
        self.batches_seen += 1;

        added
            .iter()
            .any(|&node| validator.is_cookie_relevant(dom, node))
    }
}

impl Default for MutationWatcher {
    fn default() -> Self {
        Self::new()
    }
}
