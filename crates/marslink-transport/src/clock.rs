// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 marslink-transport contributors

//! Injectable clock so the Reassembler's timeout/stall arithmetic can be
//! driven deterministically in tests instead of sleeping for real.

use std::time::Instant;

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// The real wall clock, used everywhere outside tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(test)]
pub mod fake {
    use super::Clock;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{Duration, Instant};

    /// A clock that only advances when told to. `Instant` can't be
    /// constructed out of thin air, so this anchors to a real `now()` taken
    /// at creation and adds a virtual offset on top.
    pub struct FakeClock {
        anchor: Instant,
        offset_millis: AtomicU64,
    }

    impl FakeClock {
        pub fn new() -> Self {
            Self {
                anchor: Instant::now(),
                offset_millis: AtomicU64::new(0),
            }
        }

        pub fn advance(&self, duration: Duration) {
            self.offset_millis
                .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.anchor + Duration::from_millis(self.offset_millis.load(Ordering::SeqCst))
        }
    }
}
