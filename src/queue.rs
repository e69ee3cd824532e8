// Compass Relay - Event Queue
//
// Single-slot mailbox between the sensing pipeline and the network.  A newer
// fire overwrites an unsent one; the sender drains it at most once per send
// interval and gives up on an event once it is older than the staleness bound.

use std::time::{Duration, Instant};

use crate::events::{Direction, PendingEvent};
use crate::transport::{Transport, TransportError};

#[derive(Debug)]
pub enum SendOutcome {
    /// Nothing pending.
    Idle,
    /// Pending, but the last attempt was too recent.
    Throttled,
    Sent { direction: Direction, status: u16 },
    Failed {
        direction: Direction,
        error: TransportError,
        /// The event stays queued for the next eligible tick.
        retained: bool,
    },
}

pub struct EventQueue {
    pending: Option<PendingEvent>,
    last_send_try: Option<Instant>,
    send_interval: Duration,
    stale_after: Duration,
}

impl EventQueue {
    pub fn new(send_interval: Duration, stale_after: Duration) -> Self {
        Self {
            pending: None,
            last_send_try: None,
            send_interval,
            stale_after,
        }
    }

    pub fn pending(&self) -> Option<&PendingEvent> {
        self.pending.as_ref()
    }

    /// Replace whatever is pending with `direction`.
    pub fn enqueue(&mut self, direction: Direction, now: Instant) {
        if let Some(old) = self.pending.replace(PendingEvent { direction, enqueued_at: now }) {
            log::debug!("[QUEUE] {} superseded", old.direction);
        }
        log::info!("[QUEUE] -> {}", direction);
    }

    /// Make at most one transport call if something is pending and the send
    /// interval has passed since the previous attempt.
    pub fn try_send<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        now: Instant,
    ) -> SendOutcome {
        let Some(event) = self.pending else {
            return SendOutcome::Idle;
        };

        if let Some(last) = self.last_send_try {
            if now.saturating_duration_since(last) < self.send_interval {
                return SendOutcome::Throttled;
            }
        }
        self.last_send_try = Some(now);

        match transport.send(event.direction) {
            Ok(status) => {
                log::info!("[SENT] {} {}", event.direction, status);
                self.pending = None;
                SendOutcome::Sent {
                    direction: event.direction,
                    status,
                }
            }
            Err(error) => {
                log::warn!("[SEND_ERR] {}: {}", event.direction, error);
                let retained = now.saturating_duration_since(event.enqueued_at) <= self.stale_after;
                if !retained {
                    log::warn!("[QUEUE] dropping stale {}", event.direction);
                    self.pending = None;
                }
                SendOutcome::Failed {
                    direction: event.direction,
                    error,
                    retained,
                }
            }
        }
    }
}
