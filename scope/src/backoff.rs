// Copyright (c) 2025 vivo Mobile Communication Co., Ltd.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded exponential backoff for polling waiters.

use core::cell::Cell;

// Spin rounds double up to 2^SPIN_LIMIT pause hints per round.
const SPIN_LIMIT: u32 = 6;
// Past this many rounds a waiter should stop polling and park if its
// scope supports parking.
const YIELD_LIMIT: u32 = 10;

/// Backoff state for one waiting context.
///
/// Each failed poll widens the pause between the next two polls, first with
/// pure spin hints, then (on hosted builds) by yielding the thread. Once
/// [`is_completed`](Backoff::is_completed) turns true, further waiting is
/// better spent parked.
#[derive(Debug, Default)]
pub struct Backoff {
    step: Cell<u32>,
}

impl Backoff {
    pub const fn new() -> Self {
        Self { step: Cell::new(0) }
    }

    /// Restart the backoff schedule, e.g. after the awaited value changed.
    pub fn reset(&self) {
        self.step.set(0);
    }

    /// Back off without giving up the execution resource.
    pub fn spin(&self) {
        let step = self.step.get().min(SPIN_LIMIT);
        for _ in 0..1u32 << step {
            core::hint::spin_loop();
        }
        self.bump();
    }

    /// Back off, yielding the execution resource once spinning saturates.
    ///
    /// Without an OS to yield to this degrades to a full spin round.
    pub fn snooze(&self) {
        if self.step.get() <= SPIN_LIMIT {
            for _ in 0..1u32 << self.step.get() {
                core::hint::spin_loop();
            }
        } else {
            #[cfg(feature = "std")]
            std::thread::yield_now();
            #[cfg(not(feature = "std"))]
            for _ in 0..1u32 << SPIN_LIMIT {
                core::hint::spin_loop();
            }
        }
        self.bump();
    }

    /// True once the schedule is exhausted and the waiter should park.
    pub fn is_completed(&self) -> bool {
        self.step.get() > YIELD_LIMIT
    }

    fn bump(&self) {
        if self.step.get() <= YIELD_LIMIT {
            self.step.set(self.step.get() + 1);
        }
    }
}
