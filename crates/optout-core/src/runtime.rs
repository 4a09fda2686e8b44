//! Async page driver
//!
//! Feeds host events into an [`Orchestrator`] and sleeps until its next
//! deadline in between. The orchestrator is not `Send`; run this on a
//! current-thread runtime or a `LocalSet`.

use serde_json::Value;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedReceiver;

use optout_dom::Dom;
use optout_messaging::MessageEvent;

use crate::orchestrator::Orchestrator;

/// Something the host observed on the page
#[derive(Debug, Clone)]
pub enum PageEvent<N> {
    /// Elements added to the document
    Mutation(Vec<N>),
    Message(MessageEvent),
    /// Payload of a TCF `addEventListener` callback
    TcfEvent(Value),
}

impl<D: Dom> Orchestrator<D> {
    pub fn handle_event(&mut self, event: PageEvent<D::Node>, now: Instant) {
        match event {
            PageEvent::Mutation(added) => self.handle_mutation(&added, now),
            PageEvent::Message(message) => self.handle_message(&message, now),
            PageEvent::TcfEvent(data) => self.handle_tcf_event(&data, now),
        }
    }
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Drive a started orchestrator until consent is resolved, or until the event
/// channel is closed and no timers remain.
pub async fn run_page<D: Dom>(
    mut orchestrator: Orchestrator<D>,
    mut events: UnboundedReceiver<PageEvent<D::Node>>,
) -> Orchestrator<D> {
    let mut channel_open = true;

    while !orchestrator.is_processed() {
        let deadline = orchestrator.next_deadline();
        if !channel_open && deadline.is_none() {
            break;
        }
        let sleep_until = deadline.map(tokio::time::Instant::from_std);

        tokio::select! {
            biased;

            event = events.recv(), if channel_open => match event {
                Some(event) => orchestrator.handle_event(event, now()),
                None => {
                    tracing::debug!("Page event channel closed");
                    channel_open = false;
                }
            },
            _ = async {
                if let Some(at) = sleep_until {
                    tokio::time::sleep_until(at).await;
                }
            }, if sleep_until.is_some() => {
                orchestrator.run_due(now());
            }
        }
    }

    orchestrator
}
