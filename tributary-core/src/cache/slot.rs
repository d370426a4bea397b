//! Per-entity cache slot.
//!
//! A slot holds every memoized value of one entity, keyed by the overrides
//! that produced it. Slots only ever gain entries; an existing entry is never
//! replaced while flows may be reading it, except by a concurrent computation
//! of the same key when single-flight is disabled.
//!
//! # Single-flight
//!
//! With single-flight enabled, the first thread to miss a key becomes the
//! leader and registers a [`Flight`]. Other threads missing the same key
//! wait on the flight instead of computing, then re-check the slot. If the
//! leader failed there is still no entry, and one waiter becomes the next
//! leader. Errors are never stored.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use tracing::trace;

use super::key::OverrideKey;
use crate::error::Result;
use crate::value::Value;

#[derive(Default)]
pub(crate) struct Slot {
    ready: DashMap<OverrideKey, Value>,
    in_flight: Mutex<HashMap<OverrideKey, Arc<Flight>>>,
}

impl Slot {
    pub(crate) fn get(&self, key: &OverrideKey) -> Option<Value> {
        self.ready.get(key).map(|entry| entry.value().clone())
    }

    pub(crate) fn put(&self, key: OverrideKey, value: Value) {
        self.ready.insert(key, value);
    }

    pub(crate) fn contains(&self, key: &OverrideKey) -> bool {
        self.ready.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.ready.len()
    }

    pub(crate) fn keys(&self) -> Vec<OverrideKey> {
        self.ready.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Return the value for `key`, running `compute` on a miss and storing
    /// its result if it succeeds.
    pub(crate) fn get_or_compute<F>(
        &self,
        key: &OverrideKey,
        single_flight: bool,
        compute: F,
    ) -> Result<Value>
    where
        F: FnOnce() -> Result<Value>,
    {
        if !single_flight {
            if let Some(value) = self.get(key) {
                return Ok(value);
            }
            let value = compute()?;
            self.put(key.clone(), value.clone());
            return Ok(value);
        }

        let flight = loop {
            if let Some(value) = self.get(key) {
                return Ok(value);
            }

            let waiting = {
                let mut in_flight = self.in_flight.lock();

                // The leader may have finished between the check and the lock.
                if let Some(value) = self.get(key) {
                    return Ok(value);
                }
                match in_flight.get(key) {
                    Some(flight) => Arc::clone(flight),
                    None => {
                        let flight = Arc::new(Flight::default());
                        in_flight.insert(key.clone(), Arc::clone(&flight));
                        break flight;
                    }
                }
            };

            trace!("waiting for in-flight computation");
            waiting.wait();
        };

        let _landing = Landing {
            slot: self,
            key,
            flight,
        };

        let value = compute()?;
        self.put(key.clone(), value.clone());
        Ok(value)
    }
}

/// A computation in progress. Waiters block until the leader lands.
#[derive(Default)]
struct Flight {
    done: Mutex<bool>,
    landed: Condvar,
}

impl Flight {
    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.landed.wait(&mut done);
        }
    }

    fn land(&self) {
        *self.done.lock() = true;
        self.landed.notify_all();
    }
}

/// Unregisters the leader's flight and wakes waiters, whether the
/// computation returned, failed or panicked.
struct Landing<'s> {
    slot: &'s Slot,
    key: &'s OverrideKey,
    flight: Arc<Flight>,
}

impl Drop for Landing<'_> {
    fn drop(&mut self) {
        self.slot.in_flight.lock().remove(self.key);
        self.flight.land();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowError;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn count_calls(counter: &AtomicI32, value: i32) -> Result<Value> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Value::new(value))
    }

    #[test]
    fn computes_once_then_hits() {
        let slot = Slot::default();
        let calls = AtomicI32::new(0);
        let key = OverrideKey::empty();

        let first = slot.get_or_compute(&key, true, || count_calls(&calls, 5)).unwrap();
        let second = slot.get_or_compute(&key, true, || count_calls(&calls, 6)).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Value::ptr_eq(&first, &second));
        assert_eq!(slot.len(), 1);
    }

    #[test]
    fn failures_are_not_stored() {
        let slot = Slot::default();
        let key = OverrideKey::empty();

        let err = slot
            .get_or_compute(&key, true, || {
                Err(FlowError::MissingValue { name: "x".into() })
            })
            .unwrap_err();
        assert!(matches!(err, FlowError::MissingValue { .. }));
        assert!(!slot.contains(&key));
        assert!(slot.in_flight.lock().is_empty());

        let value = slot.get_or_compute(&key, true, || Ok(Value::new(1))).unwrap();
        assert_eq!(value.downcast_ref::<i32>(), Some(&1));
    }

    #[test]
    fn concurrent_misses_compute_once() {
        let slot = Slot::default();
        let calls = AtomicI32::new(0);
        let key = OverrideKey::empty();
        let barrier = Barrier::new(8);

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    barrier.wait();
                    let value = slot
                        .get_or_compute(&key, true, || {
                            thread::sleep(Duration::from_millis(50));
                            count_calls(&calls, 9)
                        })
                        .unwrap();
                    assert_eq!(value.downcast_ref::<i32>(), Some(&9));
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn waiters_retry_after_the_leader_fails() {
        let slot = Slot::default();
        let calls = AtomicI32::new(0);
        let key = OverrideKey::empty();
        let barrier = Barrier::new(4);
        let (slot_ref, calls_ref, key_ref, barrier_ref) = (&slot, &calls, &key, &barrier);

        let results: Vec<Result<Value>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(move || {
                        barrier_ref.wait();
                        slot_ref.get_or_compute(key_ref, true, || {
                            let attempt = calls_ref.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(50));
                            if attempt == 0 {
                                return Err(FlowError::MissingValue { name: "x".into() });
                            }
                            Ok(Value::new(attempt))
                        })
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        // Only the first leader sees its own failure; everyone else gets the
        // value computed by the second leader.
        let failures = results.iter().filter(|result| result.is_err()).count();
        assert_eq!(failures, 1);
        for value in results.iter().filter_map(|result| result.as_ref().ok()) {
            assert_eq!(value.downcast_ref::<i32>(), Some(&1));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(slot.in_flight.lock().is_empty());
        assert_eq!(slot.len(), 1);
    }

    #[test]
    fn without_single_flight_last_writer_wins() {
        let slot = Slot::default();
        let calls = AtomicI32::new(0);
        let key = OverrideKey::empty();
        let barrier = Barrier::new(8);
        let (slot_ref, calls_ref, key_ref, barrier_ref) = (&slot, &calls, &key, &barrier);

        let returned: Vec<i32> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|index| {
                    scope.spawn(move || {
                        barrier_ref.wait();
                        let value = slot_ref
                            .get_or_compute(key_ref, false, || {
                                thread::sleep(Duration::from_millis(20));
                                count_calls(calls_ref, index)
                            })
                            .unwrap();
                        *value.downcast_ref::<i32>().unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        // Racers may each compute, but the slot keeps a single entry and no
        // flight is ever registered.
        let computed = calls.load(Ordering::SeqCst);
        assert!((1..=8).contains(&computed));
        assert_eq!(slot.len(), 1);
        assert!(slot.in_flight.lock().is_empty());

        let stored = *slot.get(&key).unwrap().downcast_ref::<i32>().unwrap();
        assert!(returned.contains(&stored));
    }

    #[test]
    fn without_single_flight_still_caches() {
        let slot = Slot::default();
        let calls = AtomicI32::new(0);
        let key = OverrideKey::empty();

        slot.get_or_compute(&key, false, || count_calls(&calls, 1)).unwrap();
        slot.get_or_compute(&key, false, || count_calls(&calls, 1)).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(slot.in_flight.lock().is_empty());
    }
}
