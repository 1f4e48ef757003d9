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

//! Single-use countdown rendezvous over a [`Scope`].

use blue_scope::{Scope, SystemScope};
use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicUsize, Ordering};

/// A one-shot countdown: waiters block until the counter reaches zero.
///
/// Unlike [`Barrier`](crate::Barrier) a latch has a single phase and never
/// resets; counting down and waiting are independent roles, and a counter
/// of zero means released from the start.
pub struct Latch<S: Scope = SystemScope> {
    count: AtomicUsize,
    _scope: PhantomData<fn(S)>,
}

impl<S: Scope> Latch<S> {
    pub const fn new(count: usize) -> Self {
        Self {
            count: AtomicUsize::new(count),
            _scope: PhantomData,
        }
    }

    /// Decrement the counter by `n`; the decrement that reaches zero
    /// releases every waiter. Counting below zero is a contract violation.
    pub fn count_down(&self, n: usize) {
        if n == 0 {
            return;
        }
        S::fence();
        let prev = self.count.fetch_sub(n, Ordering::AcqRel);
        assert!(prev >= n, "latch counted down below zero");
        // Any change can unblock a waiter parked on the old value, not just
        // the final one.
        S::notify_all(&self.count);
    }

    /// Non-blocking probe whether the latch has been released.
    pub fn try_wait(&self) -> bool {
        if self.count.load(Ordering::Acquire) == 0 {
            S::fence();
            return true;
        }
        false
    }

    /// Block until the counter reaches zero.
    pub fn wait(&self) {
        loop {
            let cur = self.count.load(Ordering::Acquire);
            if cur == 0 {
                S::fence();
                return;
            }
            S::wait_ne(&self.count, cur);
        }
    }

    /// [`count_down`](Latch::count_down) by one, then [`wait`](Latch::wait).
    pub fn arrive_and_wait(&self) {
        self.count_down(1);
        self.wait();
    }
}

impl<S: Scope> fmt::Debug for Latch<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Latch")
            .field("scope", &S::NAME)
            .field("count", &self.count.load(Ordering::Relaxed))
            .finish()
    }
}
