//! Event sink: observer callbacks fired after a store transaction
//! commits. The core never blocks on these — it hands a sink reference to
//! each ingestion operation and the sink decides how to deliver (log,
//! broadcast, or push to a webhook).

use tracing::warn;

use crate::types::Txid;

/// One method per event, each a no-op by default so a consumer only
/// implements the events it cares about.
pub trait EventSink {
    fn on_ready_to_execute(&self, _txid: &Txid) {}
    fn on_add_transaction(&self, _txid: &Txid) {}
    fn on_delete_transaction(&self, _txid: &Txid) {}
    fn on_trust_transaction(&self, _txid: &Txid) {}
    fn on_untrust_transaction(&self, _txid: &Txid) {}
    fn on_ban_transaction(&self, _txid: &Txid) {}
    fn on_unban_transaction(&self, _txid: &Txid) {}
    fn on_unindex_transaction(&self, _txid: &Txid) {}
}

pub struct NoopEventSink;

impl EventSink for NoopEventSink {}

/// An event as delivered to out-of-process consumers, mirroring the
/// `EventSink` method names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ReadyToExecute(Txid),
    Add(Txid),
    Delete(Txid),
    Trust(Txid),
    Untrust(Txid),
    Ban(Txid),
    Unban(Txid),
    Unindex(Txid),
}

/// Fans events out to any number of subscribers via a broadcast channel.
/// A full channel drops the oldest event rather than blocking the core —
/// subscribers that care about every event must keep up or resync from
/// the Store.
pub struct BroadcastEventSink {
    sender: tokio::sync::broadcast::Sender<Event>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = tokio::sync::broadcast::channel(capacity);
        BroadcastEventSink { sender }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    fn send(&self, event: Event) {
        // Err only means there are currently no subscribers; that's fine.
        let _ = self.sender.send(event);
    }
}

impl EventSink for BroadcastEventSink {
    fn on_ready_to_execute(&self, txid: &Txid) {
        self.send(Event::ReadyToExecute(*txid));
    }
    fn on_add_transaction(&self, txid: &Txid) {
        self.send(Event::Add(*txid));
    }
    fn on_delete_transaction(&self, txid: &Txid) {
        self.send(Event::Delete(*txid));
    }
    fn on_trust_transaction(&self, txid: &Txid) {
        self.send(Event::Trust(*txid));
    }
    fn on_untrust_transaction(&self, txid: &Txid) {
        self.send(Event::Untrust(*txid));
    }
    fn on_ban_transaction(&self, txid: &Txid) {
        self.send(Event::Ban(*txid));
    }
    fn on_unban_transaction(&self, txid: &Txid) {
        self.send(Event::Unban(*txid));
    }
    fn on_unindex_transaction(&self, txid: &Txid) {
        self.send(Event::Unindex(*txid));
    }
}

/// Posts every event to a configured webhook URL, fire-and-forget on a
/// background task. Failures are logged, never surfaced to the core: the
/// webhook is a downstream notification, not part of the transaction.
pub struct WebhookEventSink {
    url: String,
    client: reqwest::Client,
    handle: tokio::runtime::Handle,
}

impl WebhookEventSink {
    pub fn new(url: String, handle: tokio::runtime::Handle) -> Self {
        WebhookEventSink {
            url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn post(&self, event: Event) {
        let client = self.client.clone();
        let url = self.url.clone();
        self.handle.spawn(async move {
            let body = event_to_json(&event);
            if let Err(e) = client.post(&url).json(&body).send().await {
                warn!(url = %url, error = %e, "webhook delivery failed");
            }
        });
    }
}

fn event_to_json(event: &Event) -> serde_json::Value {
    let (kind, txid) = match event {
        Event::ReadyToExecute(t) => ("readyToExecute", t),
        Event::Add(t) => ("add", t),
        Event::Delete(t) => ("delete", t),
        Event::Trust(t) => ("trust", t),
        Event::Untrust(t) => ("untrust", t),
        Event::Ban(t) => ("ban", t),
        Event::Unban(t) => ("unban", t),
        Event::Unindex(t) => ("unindex", t),
    };
    serde_json::json!({ "event": kind, "txid": txid.to_hex() })
}

impl EventSink for WebhookEventSink {
    fn on_ready_to_execute(&self, txid: &Txid) {
        self.post(Event::ReadyToExecute(*txid));
    }
    fn on_add_transaction(&self, txid: &Txid) {
        self.post(Event::Add(*txid));
    }
    fn on_delete_transaction(&self, txid: &Txid) {
        self.post(Event::Delete(*txid));
    }
    fn on_trust_transaction(&self, txid: &Txid) {
        self.post(Event::Trust(*txid));
    }
    fn on_untrust_transaction(&self, txid: &Txid) {
        self.post(Event::Untrust(*txid));
    }
    fn on_ban_transaction(&self, txid: &Txid) {
        self.post(Event::Ban(*txid));
    }
    fn on_unban_transaction(&self, txid: &Txid) {
        self.post(Event::Unban(*txid));
    }
    fn on_unindex_transaction(&self, txid: &Txid) {
        self.post(Event::Unindex(*txid));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txid(byte: u8) -> Txid {
        Txid::from_bytes([byte; 32])
    }

    #[test]
    fn noop_sink_accepts_every_event_without_panicking() {
        let sink = NoopEventSink;
        sink.on_ready_to_execute(&txid(1));
        sink.on_add_transaction(&txid(1));
        sink.on_ban_transaction(&txid(1));
    }

    #[test]
    fn broadcast_sink_delivers_to_subscriber() {
        let sink = BroadcastEventSink::new(8);
        let mut rx = sink.subscribe();
        sink.on_add_transaction(&txid(1));
        assert_eq!(rx.try_recv().unwrap(), Event::Add(txid(1)));
    }

    #[test]
    fn broadcast_sink_without_subscribers_does_not_panic() {
        let sink = BroadcastEventSink::new(8);
        sink.on_ready_to_execute(&txid(1));
    }
}
