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

//! Memory-visibility scopes for synchronization primitives shared between
//! host threads and accelerator execution units.
//!
//! A [`Scope`] supplies the fences and the atomic waiting strategy a
//! primitive needs to be correct across one visibility domain. Primitives
//! take the scope as a type parameter, so the choice is made at compile time
//! and narrow scopes pay nothing for machinery they do not need.

#![cfg_attr(not(test), no_std)]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod backoff;
#[cfg(feature = "std")]
mod park;

cfg_if::cfg_if! {
    if #[cfg(feature = "std")] {
        use self::park as parking;
    } else {
        // Bare builds have nothing to park on, deep waits degrade to
        // polling with yield hints.
        mod parking {
            use core::sync::atomic::AtomicUsize;

            pub(crate) fn wait_ne(atom: &AtomicUsize, val: usize) -> usize {
                crate::yield_wait_ne(atom, val)
            }

            pub(crate) fn notify_all(_atom: &AtomicUsize) {}
        }
    }
}

pub use backoff::Backoff;

use core::sync::atomic::{fence, AtomicUsize, Ordering};
#[cfg(feature = "std")]
use core::time::Duration;

/// A memory-visibility domain.
///
/// # Safety
///
/// Implementations are relied upon for the publication guarantees of the
/// primitives built on top of them:
/// - [`wait_ne`](Scope::wait_ne) must not return while `atom == val`, and
///   the observation of the changed value must carry acquire ordering.
/// - [`notify_all`](Scope::notify_all) must wake every context blocked in
///   `wait_ne` on the same atom; a wakeup that races a store to the atom
///   must not be lost.
/// - [`fence`](Scope::fence) must order prior writes before later reads
///   across every execution unit of the declared domain.
pub unsafe trait Scope {
    /// Scope label, used in debug output.
    const NAME: &'static str;

    /// Strongest fence the domain requires.
    fn fence();

    /// Block the calling context while `atom == val`, returns the changed
    /// value.
    fn wait_ne(atom: &AtomicUsize, val: usize) -> usize;

    /// Bounded [`wait_ne`](Scope::wait_ne); `None` if `atom` still held
    /// `val` when the deadline passed.
    #[cfg(feature = "std")]
    fn wait_ne_timeout(atom: &AtomicUsize, val: usize, timeout: Duration) -> Option<usize>;

    /// Wake every context blocked in [`wait_ne`](Scope::wait_ne) on `atom`.
    /// A no-op for scopes whose waiters poll.
    fn notify_all(atom: &AtomicUsize);
}

/// Execution units sharing the tightest visibility domain, e.g. one
/// accelerator block or a small cluster of host threads.
///
/// Waiters busy-poll with backoff and never leave the execution resource;
/// use a wider scope if participants can be descheduled for long stretches.
pub struct BlockScope;

/// All execution units of one accelerator, or one host process.
///
/// Waiters poll with backoff and yield the execution resource once the
/// backoff saturates on hosted builds.
pub struct DeviceScope;

/// The whole machine, host threads and accelerator units together.
///
/// On hosted builds waiters escalate from polling to parking on an
/// address-keyed registry; on bare builds they poll.
pub struct SystemScope;

unsafe impl Scope for BlockScope {
    const NAME: &'static str = "block";

    #[inline]
    fn fence() {
        fence(Ordering::AcqRel);
    }

    fn wait_ne(atom: &AtomicUsize, val: usize) -> usize {
        poll_wait_ne(atom, val)
    }

    #[cfg(feature = "std")]
    fn wait_ne_timeout(atom: &AtomicUsize, val: usize, timeout: Duration) -> Option<usize> {
        poll_wait_ne_timeout(atom, val, timeout)
    }

    #[inline]
    fn notify_all(_atom: &AtomicUsize) {}
}

unsafe impl Scope for DeviceScope {
    const NAME: &'static str = "device";

    #[inline]
    fn fence() {
        fence(Ordering::SeqCst);
    }

    fn wait_ne(atom: &AtomicUsize, val: usize) -> usize {
        yield_wait_ne(atom, val)
    }

    #[cfg(feature = "std")]
    fn wait_ne_timeout(atom: &AtomicUsize, val: usize, timeout: Duration) -> Option<usize> {
        poll_wait_ne_timeout(atom, val, timeout)
    }

    #[inline]
    fn notify_all(_atom: &AtomicUsize) {}
}

unsafe impl Scope for SystemScope {
    const NAME: &'static str = "system";

    #[inline]
    fn fence() {
        fence(Ordering::SeqCst);
    }

    fn wait_ne(atom: &AtomicUsize, val: usize) -> usize {
        parking::wait_ne(atom, val)
    }

    #[cfg(feature = "std")]
    fn wait_ne_timeout(atom: &AtomicUsize, val: usize, timeout: Duration) -> Option<usize> {
        parking::wait_ne_timeout(atom, val, timeout)
    }

    fn notify_all(atom: &AtomicUsize) {
        parking::notify_all(atom);
    }
}

// Spin-only wait, stays on the execution resource.
fn poll_wait_ne(atom: &AtomicUsize, val: usize) -> usize {
    let backoff = Backoff::new();
    loop {
        let cur = atom.load(Ordering::Acquire);
        if cur != val {
            return cur;
        }
        backoff.spin();
    }
}

// Spin escalating to OS yield where one exists.
fn yield_wait_ne(atom: &AtomicUsize, val: usize) -> usize {
    let backoff = Backoff::new();
    loop {
        let cur = atom.load(Ordering::Acquire);
        if cur != val {
            return cur;
        }
        backoff.snooze();
    }
}

#[cfg(feature = "std")]
fn poll_wait_ne_timeout(atom: &AtomicUsize, val: usize, timeout: Duration) -> Option<usize> {
    let deadline = std::time::Instant::now() + timeout;
    let backoff = Backoff::new();
    loop {
        let cur = atom.load(Ordering::Acquire);
        if cur != val {
            return Some(cur);
        }
        if std::time::Instant::now() >= deadline {
            return None;
        }
        backoff.snooze();
    }
}
