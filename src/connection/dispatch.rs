//! Delivery of observer callbacks outside the connection task.
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{CloseNotification, ConnectionObserver};

#[derive(Debug)]
pub(crate) enum Event {
    Open,
    Close(CloseNotification, String),
    Text(String),
    RawText(Bytes),
    Binary(Bytes),
}

/// Queues events for the dispatcher task. Sending never blocks.
#[derive(Clone)]
pub(crate) struct EventSender(mpsc::UnboundedSender<Event>);

impl EventSender {
    pub fn send(&self, event: Event) {
        // the dispatcher only stops once every sender is gone
        let _ = self.0.send(event);
    }

    pub fn open(&self) {
        self.send(Event::Open);
    }

    pub fn close(&self, code: CloseNotification, reason: impl Into<String>) {
        self.send(Event::Close(code, reason.into()));
    }
}

/// Spawns the task that hands events to `observer`, one at a time and in order.
pub(crate) fn spawn(observer: Arc<dyn ConnectionObserver>) -> EventSender {
    let (tx, mut rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            #[cfg(feature = "logging")]
            log::trace!("dispatching {event:?}");

            match event {
                Event::Open => observer.on_open(),
                Event::Close(code, reason) => observer.on_close(code, &reason),
                Event::Text(text) => observer.on_text_message(text),
                Event::RawText(payload) => observer.on_raw_text_message(payload),
                Event::Binary(payload) => observer.on_binary_message(payload),
            }
        }
    });

    EventSender(tx)
}
