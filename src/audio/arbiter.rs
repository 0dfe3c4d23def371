//! Exclusive ownership of the spoken-output channel.
//!
//! At most one [`ActivePlayback`] exists at a time. Every playback is granted
//! a fresh token; completions carrying any other token are stale and ignored.

use crate::audio::clip::AudioClip;
use serde::Serialize;
use std::fmt;
use std::time::Instant;

/// Output channel, ordered by priority (lowest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Filler,
    Reply,
    Critical,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Filler => "filler",
            Channel::Reply => "reply",
            Channel::Critical => "critical",
        }
    }

    /// Whether genuine user speech may cut this channel short.
    pub fn is_interruptible(&self) -> bool {
        !matches!(self, Channel::Critical)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The clip currently owning the output.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivePlayback {
    pub channel: Channel,
    pub token: u64,
    pub clip: AudioClip,
    pub started_at: Instant,
}

/// A reply waiting for the channel to free up.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedReply {
    pub clip: AudioClip,
    pub request_id: u64,
}

/// Result of asking for the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// The caller owns the channel under `token`. `preempted` was stopped to
    /// make room and must be cut off by the caller.
    Granted {
        token: u64,
        preempted: Option<ActivePlayback>,
    },
    /// An equal or higher priority channel holds the output.
    Rejected { active: Channel },
}

/// Single-writer owner of the output channel and the capture-mute state.
#[derive(Debug)]
pub struct AudioArbiter {
    active: Option<ActivePlayback>,
    queued_reply: Option<QueuedReply>,
    next_token: u64,
}

impl Default for AudioArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioArbiter {
    pub fn new() -> Self {
        Self {
            active: None,
            queued_reply: None,
            next_token: 1,
        }
    }

    /// Request the output for `clip` on `channel`.
    ///
    /// Critical always wins. Any other channel is admitted only over a
    /// strictly lower priority one.
    pub fn acquire(&mut self, channel: Channel, clip: AudioClip, now: Instant) -> Admission {
        if let Some(active) = &self.active
            && channel != Channel::Critical
            && active.channel >= channel
        {
            return Admission::Rejected {
                active: active.channel,
            };
        }

        let token = self.next_token;
        self.next_token += 1;
        let preempted = self.active.replace(ActivePlayback {
            channel,
            token,
            clip,
            started_at: now,
        });
        Admission::Granted { token, preempted }
    }

    /// Release the channel held under `token`. Returns the finished playback,
    /// or `None` when the token is stale.
    pub fn release(&mut self, token: u64) -> Option<ActivePlayback> {
        if self.active.as_ref().is_some_and(|a| a.token == token) {
            self.active.take()
        } else {
            None
        }
    }

    /// Drop the active playback and any queued reply unconditionally.
    pub fn force_release(&mut self) -> Option<ActivePlayback> {
        self.queued_reply = None;
        self.active.take()
    }

    /// Park a reply until the channel frees. A newer reply replaces an older
    /// one; returns the replaced request id.
    pub fn queue_reply(&mut self, clip: AudioClip, request_id: u64) -> Option<u64> {
        self.queued_reply
            .replace(QueuedReply { clip, request_id })
            .map(|old| old.request_id)
    }

    pub fn take_queued_reply(&mut self) -> Option<QueuedReply> {
        self.queued_reply.take()
    }

    pub fn has_queued_reply(&self) -> bool {
        self.queued_reply.is_some()
    }

    pub fn active(&self) -> Option<&ActivePlayback> {
        self.active.as_ref()
    }

    pub fn active_channel(&self) -> Option<Channel> {
        self.active.as_ref().map(|a| a.channel)
    }

    pub fn is_active(&self, token: u64) -> bool {
        self.active.as_ref().is_some_and(|a| a.token == token)
    }

    /// Transcript updates are discarded while anything plays.
    pub fn capture_muted(&self) -> bool {
        self.active.is_some()
    }
}
