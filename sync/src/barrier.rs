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

//! Reusable rendezvous over a [`Scope`].
//!
//! A fixed set of participants repeatedly meets at the barrier; nobody
//! leaves a phase before everybody has arrived. The arrival that closes a
//! phase runs the completion function before any waiter is released, so its
//! effects are visible to every participant of that phase.

use blue_scope::{BlockScope, DeviceScope, Scope, SystemScope};
use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "std")]
use crate::error::{code, Error};
#[cfg(feature = "std")]
use core::time::Duration;

/// Names the phase an arrival joined; pass it to [`Barrier::wait`].
///
/// Tokens are not copyable: one arrival buys one wait.
#[must_use = "an arrival token names the phase to pass to wait()"]
#[derive(Debug)]
pub struct ArrivalToken {
    phase: usize,
}

/// A reusable rendezvous for a fixed number of participants, scoped to one
/// memory-visibility domain.
///
/// Construction is `const`, so a barrier may live in static or shared
/// storage reachable by every intended participant; placement is the
/// caller's concern.
///
/// The completion function runs exactly once per phase, on the context of
/// the closing arrival, after the last arrival and before any release.
pub struct Barrier<S: Scope = SystemScope, F: Fn() = fn()> {
    // Participants of the next phase. Only the closing arrival of a phase
    // writes it, while every other participant is still accounted for.
    expected: AtomicUsize,
    // Drops announced during the current phase, folded into `expected` when
    // the phase closes.
    adjust: AtomicUsize,
    // Arrivals still missing in the current phase.
    arrived: AtomicUsize,
    phase: AtomicUsize,
    completion: F,
    _scope: PhantomData<fn(S)>,
}

/// Barrier over the tightest visibility domain.
pub type BlockBarrier<F = fn()> = Barrier<BlockScope, F>;
/// Barrier over one accelerator or host process.
pub type DeviceBarrier<F = fn()> = Barrier<DeviceScope, F>;
/// Barrier over the whole machine.
pub type SystemBarrier<F = fn()> = Barrier<SystemScope, F>;

fn noop() {}

impl<S: Scope> Barrier<S> {
    /// Rendezvous for `expected` participants with no completion function.
    pub const fn new(expected: usize) -> Self {
        Self::with_completion(expected, noop as fn())
    }
}

impl<S: Scope, F: Fn()> Barrier<S, F> {
    /// Rendezvous for `expected` participants; `completion` runs once per
    /// phase before the phase's waiters are released.
    ///
    /// `expected` must be at least one.
    pub const fn with_completion(expected: usize, completion: F) -> Self {
        assert!(expected != 0, "a barrier needs at least one participant");
        Self {
            expected: AtomicUsize::new(expected),
            adjust: AtomicUsize::new(0),
            arrived: AtomicUsize::new(expected),
            phase: AtomicUsize::new(0),
            completion,
            _scope: PhantomData,
        }
    }

    /// Signal arrival for the current phase without waiting.
    ///
    /// If this is the last missing arrival, the phase closes on the calling
    /// context: the completion function runs, pending drops are folded in,
    /// and every waiter of the phase is released.
    pub fn arrive(&self) -> ArrivalToken {
        S::fence();
        let phase = self.phase.load(Ordering::Relaxed);
        let prev = self.arrived.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev != 0, "more arrivals than expected participants");
        if prev == 1 {
            self.close_phase(phase);
        }
        ArrivalToken { phase }
    }

    /// Block until the phase named by `token` has closed.
    ///
    /// Returns immediately for a phase that already closed, so a late
    /// waiter cannot be confused with the next phase.
    pub fn wait(&self, token: ArrivalToken) {
        let ArrivalToken { phase } = token;
        if self.phase.load(Ordering::Acquire) == phase {
            S::wait_ne(&self.phase, phase);
        }
        S::fence();
    }

    /// Non-blocking probe whether the phase named by `token` has closed.
    pub fn try_wait(&self, token: &ArrivalToken) -> bool {
        if self.phase.load(Ordering::Acquire) != token.phase {
            S::fence();
            return true;
        }
        false
    }

    /// Bounded wait for the phase named by `token`.
    ///
    /// On timeout the token stays usable, the caller may keep waiting.
    #[cfg(feature = "std")]
    pub fn try_wait_for(&self, token: &ArrivalToken, timeout: Duration) -> Result<(), Error> {
        if self.phase.load(Ordering::Acquire) != token.phase {
            S::fence();
            return Ok(());
        }
        match S::wait_ne_timeout(&self.phase, token.phase, timeout) {
            Some(_) => {
                S::fence();
                Ok(())
            }
            None => Err(code::ETIMEDOUT),
        }
    }

    /// Arrive and block until the current phase closes.
    pub fn arrive_and_wait(&self) {
        let token = self.arrive();
        self.wait(token);
    }

    /// Arrive for the current phase and leave the participant set.
    ///
    /// The expected count of subsequent phases shrinks by one. The caller
    /// does not wait and must not touch the barrier again.
    pub fn arrive_and_drop(&self) {
        self.adjust.fetch_add(1, Ordering::Relaxed);
        let _ = self.arrive();
    }

    /// Snapshot of the current participant count. Racy, for diagnostics.
    pub fn expected(&self) -> usize {
        self.expected.load(Ordering::Relaxed)
    }

    // Last arrival of `phase`: run the completion, restock the arrival
    // count, then publish the new phase. The reset is ordered before the
    // release store, so a participant entering the next phase finds the
    // counter already restocked.
    #[cold]
    fn close_phase(&self, phase: usize) {
        (self.completion)();
        let dropped = self.adjust.swap(0, Ordering::Relaxed);
        let expected = self.expected.load(Ordering::Relaxed);
        assert!(
            dropped <= expected,
            "arrive_and_drop reduced the participant count below zero"
        );
        let next = expected - dropped;
        self.expected.store(next, Ordering::Relaxed);
        self.arrived.store(next, Ordering::Relaxed);
        #[cfg(feature = "debugging_sync")]
        log::trace!(
            "{} barrier: phase {} closed, {} participants ahead",
            S::NAME,
            phase,
            next
        );
        self.phase.store(phase.wrapping_add(1), Ordering::Release);
        S::notify_all(&self.phase);
    }
}

impl<S: Scope, F: Fn()> fmt::Debug for Barrier<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Barrier")
            .field("scope", &S::NAME)
            .field("expected", &self.expected.load(Ordering::Relaxed))
            .field("phase", &self.phase.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn completion_runs_once_per_phase<S: Scope + 'static>() {
        let hits = Arc::new(AtomicUsize::new(0));
        let barrier = {
            let hits = hits.clone();
            Arc::new(Barrier::<S, _>::with_completion(2, move || {
                hits.fetch_add(1, Ordering::Relaxed);
            }))
        };
        let worker = {
            let barrier = barrier.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    barrier.arrive_and_wait();
                }
            })
        };
        for _ in 0..10 {
            barrier.arrive_and_wait();
        }
        worker.join().unwrap();
        assert_eq!(hits.load(Ordering::Relaxed), 10);
    }

    fn writes_visible_after_wait<S: Scope + 'static>() {
        let data = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::<S>::new(2));
        let writer = {
            let data = data.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                data.store(42, Ordering::Relaxed);
                barrier.arrive_and_wait();
            })
        };
        barrier.arrive_and_wait();
        assert_eq!(data.load(Ordering::Relaxed), 42);
        writer.join().unwrap();
    }

    macro_rules! scope_matrix {
        ($($scope:ty => $name:ident),* $(,)?) => {
            $(paste::paste! {
                #[test]
                fn [<completion_runs_once_per_phase_ $name>]() {
                    completion_runs_once_per_phase::<$scope>();
                }

                #[test]
                fn [<writes_visible_after_wait_ $name>]() {
                    writes_visible_after_wait::<$scope>();
                }
            })*
        };
    }

    scope_matrix! {
        BlockScope => block,
        DeviceScope => device,
        SystemScope => system,
    }

    #[test]
    fn split_arrive_allows_work_before_wait() {
        let flags = Arc::new([AtomicUsize::new(0), AtomicUsize::new(0)]);
        let barrier = Arc::new(SystemBarrier::new(2));
        let mut workers = Vec::new();
        for me in 0..2 {
            let flags = flags.clone();
            let barrier = barrier.clone();
            workers.push(thread::spawn(move || {
                flags[me].store(me + 1, Ordering::Relaxed);
                let token = barrier.arrive();
                // Unsynchronized work fits between arrive and wait.
                let checksum: usize = (0..64).sum();
                assert_eq!(checksum, 2016);
                barrier.wait(token);
                assert_eq!(flags[1 - me].load(Ordering::Relaxed), 2 - me);
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }
    }

    #[test]
    fn arrive_and_drop_shrinks_next_phase() {
        let barrier = Arc::new(SystemBarrier::new(3));
        let mut workers = Vec::new();
        for _ in 0..2 {
            let barrier = barrier.clone();
            workers.push(thread::spawn(move || {
                barrier.arrive_and_wait();
                // Phase 1 must close with only two participants left.
                barrier.arrive_and_wait();
            }));
        }
        barrier.arrive_and_drop();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(barrier.expected(), 2);
    }

    #[test]
    fn dropping_every_participant_retires_the_barrier() {
        let barrier = SystemBarrier::new(2);
        barrier.arrive_and_drop();
        barrier.arrive_and_drop();
        assert_eq!(barrier.expected(), 0);
    }

    #[test]
    fn sole_participant_never_blocks() {
        let hits = Arc::new(AtomicUsize::new(0));
        let barrier = {
            let hits = hits.clone();
            Barrier::<SystemScope, _>::with_completion(1, move || {
                hits.fetch_add(1, Ordering::Relaxed);
            })
        };
        for _ in 0..1000 {
            barrier.arrive_and_wait();
        }
        assert_eq!(hits.load(Ordering::Relaxed), 1000);
    }

    // Token/phase matching must stay unambiguous across many reuse cycles.
    #[test]
    fn thousand_phase_reuse() {
        const PARTICIPANTS: usize = 4;
        const PHASES: usize = 1000;
        let hits = Arc::new(AtomicUsize::new(0));
        let barrier = {
            let hits = hits.clone();
            Arc::new(Barrier::<SystemScope, _>::with_completion(PARTICIPANTS, move || {
                hits.fetch_add(1, Ordering::Relaxed);
            }))
        };
        let mut workers = Vec::new();
        for _ in 0..PARTICIPANTS - 1 {
            let barrier = barrier.clone();
            workers.push(thread::spawn(move || {
                for _ in 0..PHASES {
                    let token = barrier.arrive();
                    barrier.wait(token);
                }
            }));
        }
        for _ in 0..PHASES {
            barrier.arrive_and_wait();
        }
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(hits.load(Ordering::Relaxed), PHASES);
    }

    // Should not hang.
    #[test]
    fn static_rendezvous() {
        static BARRIER: SystemBarrier = SystemBarrier::new(8);
        let mut workers = Vec::new();
        for _ in 0..7 {
            workers.push(thread::spawn(|| {
                BARRIER.arrive_and_wait();
            }));
        }
        BARRIER.arrive_and_wait();
        for worker in workers {
            worker.join().unwrap();
        }
    }

    #[test]
    fn late_waiter_returns_immediately() {
        let barrier = Arc::new(SystemBarrier::new(2));
        let token = barrier.arrive();
        let closer = {
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.arrive_and_wait();
            })
        };
        closer.join().unwrap();
        // The phase closed while we were away, wait must not block.
        assert!(barrier.try_wait(&token));
        barrier.wait(token);
    }

    #[test]
    #[cfg(feature = "std")]
    fn bounded_wait_times_out_then_succeeds() {
        let barrier = Arc::new(SystemBarrier::new(2));
        let token = barrier.arrive();
        assert_eq!(
            barrier.try_wait_for(&token, Duration::from_millis(20)),
            Err(crate::error::code::ETIMEDOUT)
        );
        let closer = {
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.arrive_and_wait();
            })
        };
        closer.join().unwrap();
        assert_eq!(barrier.try_wait_for(&token, Duration::from_millis(20)), Ok(()));
        barrier.wait(token);
    }

    #[test]
    #[should_panic(expected = "at least one participant")]
    fn zero_participants_rejected() {
        let _ = SystemBarrier::new(0);
    }

    #[test]
    fn debug_names_the_scope() {
        let barrier = BlockBarrier::new(2);
        let rendered = format!("{:?}", barrier);
        assert!(rendered.contains("block"));
    }
}
