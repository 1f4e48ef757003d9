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

//! Address-keyed parking for hosted builds.
//!
//! Waiters that exhausted their backoff sleep on a condvar attached to the
//! address of the watched atomic, futex style. A waker only has to know the
//! address.

use crate::backoff::Backoff;
use core::sync::atomic::{AtomicUsize, Ordering};
use core::time::Duration;
use spin::RwLock;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use std::vec::Vec;

struct WaitEntry {
    addr: usize,
    waiters: Mutex<usize>,
    wakeups: Condvar,
}

impl WaitEntry {
    fn new(addr: usize) -> Self {
        Self {
            addr,
            waiters: Mutex::new(0),
            wakeups: Condvar::new(),
        }
    }
}

// TODO: switch to a hash map keyed by address if registries with many
// distinct atoms show up in profiles.
static ENTRIES: RwLock<Vec<Arc<WaitEntry>>> = RwLock::new(Vec::new());

fn lock(m: &Mutex<usize>) -> MutexGuard<'_, usize> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// The count is bumped while the registry lock is held, so a concurrent
// deregister cannot detach the entry underneath us.
fn register(addr: usize) -> Arc<WaitEntry> {
    {
        let entries = ENTRIES.read();
        if let Some(entry) = entries.iter().find(|e| e.addr == addr) {
            *lock(&entry.waiters) += 1;
            return entry.clone();
        }
    }
    let mut entries = ENTRIES.write();
    if let Some(entry) = entries.iter().find(|e| e.addr == addr) {
        *lock(&entry.waiters) += 1;
        return entry.clone();
    }
    let entry = Arc::new(WaitEntry::new(addr));
    *lock(&entry.waiters) += 1;
    entries.push(entry.clone());
    entry
}

fn deregister(entry: &Arc<WaitEntry>) {
    let mut entries = ENTRIES.write();
    let mut waiters = lock(&entry.waiters);
    *waiters -= 1;
    if *waiters == 0 {
        drop(waiters);
        entries.retain(|e| !Arc::ptr_eq(e, entry));
    }
}

/// Block the calling thread while `atom == val`, returns the changed value.
pub(crate) fn wait_ne(atom: &AtomicUsize, val: usize) -> usize {
    match wait_inner(atom, val, None) {
        Some(cur) => cur,
        None => unreachable!("unbounded wait cannot time out"),
    }
}

/// Bounded [`wait_ne`]; `None` if `atom` still held `val` at the deadline.
pub(crate) fn wait_ne_timeout(atom: &AtomicUsize, val: usize, timeout: Duration) -> Option<usize> {
    wait_inner(atom, val, Some(Instant::now() + timeout))
}

fn wait_inner(atom: &AtomicUsize, val: usize, deadline: Option<Instant>) -> Option<usize> {
    // Most waits are short, poll before touching the registry.
    let backoff = Backoff::new();
    while !backoff.is_completed() {
        let cur = atom.load(Ordering::Acquire);
        if cur != val {
            return Some(cur);
        }
        backoff.snooze();
    }

    let addr = atom as *const AtomicUsize as usize;
    let entry = register(addr);
    #[cfg(feature = "debugging_scope")]
    log::trace!("parking waiter @ {:#x}", addr);
    let mut result = None;
    {
        let mut waiters = lock(&entry.waiters);
        loop {
            // Second check under the entry lock, a wakeup between the first
            // check and this point is not lost because the waker takes the
            // same lock before notifying.
            let cur = atom.load(Ordering::Acquire);
            if cur != val {
                result = Some(cur);
                break;
            }
            match deadline {
                None => {
                    waiters = entry
                        .wakeups
                        .wait(waiters)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    waiters = entry
                        .wakeups
                        .wait_timeout(waiters, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }
    deregister(&entry);
    #[cfg(feature = "debugging_scope")]
    log::trace!("waiter left @ {:#x}", addr);
    result
}

/// Wake every thread parked on `atom`.
pub(crate) fn notify_all(atom: &AtomicUsize) {
    let addr = atom as *const AtomicUsize as usize;
    let entries = ENTRIES.read();
    if let Some(entry) = entries.iter().find(|e| e.addr == addr) {
        // Hold the entry lock so a waiter between its check and the actual
        // block cannot miss this wakeup.
        let _waiters = lock(&entry.waiters);
        entry.wakeups.notify_all();
    }
}
