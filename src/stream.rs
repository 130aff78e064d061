use crate::types::GloveData;
use crate::{GloveError, Result};
use crossbeam_channel::{Receiver, Sender};
use std::time::Duration;

/// Events a glove session reports to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum GloveEvent {
    /// Identification finished. Sent once per session.
    Detected { is_glove: bool },
    /// A motion report was decoded.
    Changed(GloveData),
    /// A transport request or completion failed.
    Error(GloveError),
    /// The session reached a terminal state and released its resources.
    Closed,
}

/// Consumer end of a session's event channel.
pub struct GloveStream {
    receiver: Receiver<GloveEvent>,
}

impl GloveStream {
    pub(crate) fn channel(capacity: usize) -> (EventSender, GloveStream) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        (EventSender { sender }, GloveStream { receiver })
    }

    /// Receive the next event (blocks until available).
    pub fn recv(&self) -> Result<GloveEvent> {
        self.receiver.recv().map_err(|_| GloveError::StreamStopped)
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&self) -> Option<GloveEvent> {
        self.receiver.try_recv().ok()
    }

    /// Receive an event with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<GloveEvent> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => GloveError::Timeout,
            crossbeam_channel::RecvTimeoutError::Disconnected => GloveError::StreamStopped,
        })
    }

    /// Wait for the next motion sample, skipping other events.
    pub fn next_data(&self, timeout: Duration) -> Result<GloveData> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            match self.recv_timeout(remaining)? {
                GloveEvent::Changed(data) => return Ok(data),
                GloveEvent::Closed => return Err(GloveError::StreamStopped),
                _ => continue,
            }
        }
    }

    /// Drain all pending events.
    pub fn drain(&self) -> Vec<GloveEvent> {
        self.receiver.try_iter().collect()
    }
}

/// Session end of the event channel. Never blocks the delivery path.
pub(crate) struct EventSender {
    sender: Sender<GloveEvent>,
}

impl EventSender {
    pub fn send(&self, event: GloveEvent) {
        if let Err(e) = self.sender.try_send(event) {
            match e {
                crossbeam_channel::TrySendError::Full(ev) => {
                    log::trace!("Event channel full, dropping {:?}", ev);
                }
                crossbeam_channel::TrySendError::Disconnected(_) => {
                    log::trace!("Event stream dropped by consumer");
                }
            }
        }
    }
}
