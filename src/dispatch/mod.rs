//! Request dispatch: the single in-flight slot, latest-wins queueing and the
//! global request throttle.
//!
//! [`RequestDispatcher`] is pure bookkeeping. It decides *whether* and *what*
//! to send; the runtime performs the actual [`Backend`] call and reports the
//! outcome back through the coordinator.

pub mod backend;
pub mod extract;
#[cfg(feature = "http-backend")]
pub mod http;

pub use backend::{
    Backend, BackendReply, FramePurpose, ImageReply, ImageRequest, MockBackend, TextRequest,
    unix_timestamp,
};
#[cfg(feature = "http-backend")]
pub use http::HttpBackend;

use crate::config::BackendConfig;
use std::time::{Duration, Instant};

/// A conversational request ready to go out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingText {
    pub request_id: u64,
    /// Text to send (already lead-clause extracted).
    pub text: String,
    /// History index of the `UserUtterance` this request answers; context is
    /// taken from the turns before it.
    pub user_turn: usize,
    /// Monotonic per-session turn counter.
    pub turn_index: u64,
}

/// Outcome of offering text to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchDecision {
    /// Send this request now.
    Send(OutgoingText),
    /// A request is in flight; the text now occupies the pending slot.
    Queued { replaced: bool },
    /// Nothing in flight but the minimum interval has not elapsed; the text
    /// waits in the pending slot for `wait`.
    Throttled { wait: Duration, replaced: bool },
    /// Nothing to do.
    Idle,
}

#[derive(Debug, Clone)]
struct Pending {
    text: String,
    user_turn: usize,
}

/// Single-slot request dispatcher.
///
/// At most one request is in flight and at most one waits behind it. A newer
/// submission overwrites the waiting one.
#[derive(Debug)]
pub struct RequestDispatcher {
    min_interval: Duration,
    in_flight: Option<u64>,
    pending: Option<Pending>,
    last_dispatch_at: Option<Instant>,
    turn_counter: u64,
    next_request_id: u64,
    next_frame_id: u64,
}

impl RequestDispatcher {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            in_flight: None,
            pending: None,
            last_dispatch_at: None,
            turn_counter: 0,
            next_request_id: 1,
            next_frame_id: 1,
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(Duration::from_millis(config.min_request_interval_ms))
    }

    /// Offer a submitted utterance.
    pub fn submit(&mut self, text: String, user_turn: usize, now: Instant) -> DispatchDecision {
        let replaced = self
            .pending
            .replace(Pending { text, user_turn })
            .is_some();
        if self.in_flight.is_some() {
            return DispatchDecision::Queued { replaced };
        }
        match self.throttle_wait(now) {
            Some(wait) => DispatchDecision::Throttled { wait, replaced },
            None => self.send_pending(now),
        }
    }

    /// Send the pending text if the slot is free and the throttle allows it.
    pub fn poll(&mut self, now: Instant) -> DispatchDecision {
        if self.in_flight.is_some() || self.pending.is_none() {
            return DispatchDecision::Idle;
        }
        match self.throttle_wait(now) {
            Some(wait) => DispatchDecision::Throttled {
                wait,
                replaced: false,
            },
            None => self.send_pending(now),
        }
    }

    /// Mark `request_id` finished. Returns `false` for anything other than the
    /// request currently in flight; such results are stale.
    pub fn complete(&mut self, request_id: u64) -> bool {
        if self.in_flight == Some(request_id) {
            self.in_flight = None;
            true
        } else {
            false
        }
    }

    /// Drop the in-flight request and the pending slot. Returns the id of the
    /// request that was in flight.
    pub fn cancel(&mut self) -> Option<u64> {
        self.pending = None;
        self.in_flight.take()
    }

    /// Forget everything, including the turn counter.
    pub fn reset(&mut self) {
        self.in_flight = None;
        self.pending = None;
        self.last_dispatch_at = None;
        self.turn_counter = 0;
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    pub fn is_in_flight(&self, request_id: u64) -> bool {
        self.in_flight == Some(request_id)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn turn_counter(&self) -> u64 {
        self.turn_counter
    }

    /// Frame ids are shared by context and detection frames and never reset
    /// within a process, so a late response can never match a newer frame.
    pub fn next_frame_id(&mut self) -> u64 {
        let id = self.next_frame_id;
        self.next_frame_id += 1;
        id
    }

    fn throttle_wait(&self, now: Instant) -> Option<Duration> {
        let last = self.last_dispatch_at?;
        let ready_at = last + self.min_interval;
        (ready_at > now).then(|| ready_at - now)
    }

    fn send_pending(&mut self, now: Instant) -> DispatchDecision {
        let Some(pending) = self.pending.take() else {
            return DispatchDecision::Idle;
        };
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.turn_counter += 1;
        self.in_flight = Some(request_id);
        self.last_dispatch_at = Some(now);
        DispatchDecision::Send(OutgoingText {
            request_id,
            text: pending.text,
            user_turn: pending.user_turn,
            turn_index: self.turn_counter,
        })
    }
}
