//! Tick bookkeeping for the probe timer.
//!
//! The timer itself lives in the driver loop; this module only keeps the two
//! countdowns that decide what a tick does.

/// Remaining probes and ambient speech cadence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduler {
    remaining: u64,
    sent: u64,
    talk_every: u32,
    talk_countdown: u32,
}

impl Scheduler {
    /// `probe_count` probes; speak every `talk_every` ticks (at least 1).
    pub fn new(probe_count: u64, talk_every: u32) -> Self {
        let talk_every = talk_every.max(1);
        Self {
            remaining: probe_count,
            sent: 0,
            talk_every,
            talk_countdown: talk_every,
        }
    }

    /// Claim the next probe. `false` means the count is exhausted and the
    /// run is over.
    pub fn take_probe(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.sent += 1;
        true
    }

    /// Advance the ambient speech countdown; `true` when it is time to speak.
    pub fn should_talk(&mut self) -> bool {
        self.talk_countdown = self.talk_countdown.saturating_sub(1);
        if self.talk_countdown == 0 {
            self.talk_countdown = self.talk_every;
            return true;
        }
        false
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Probes claimed so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }
}
