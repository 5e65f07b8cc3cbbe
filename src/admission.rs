//! Admission Control
//!
//! A counting semaphore bounding how many ingestions run at once. The
//! in-flight counter and the wait condition live under one mutex, so a
//! release can never race an acquire past the configured maximum.

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct Slots {
    in_flight: usize,
    /// Highest `in_flight` ever observed
    peak: usize,
}

/// Bounded-concurrency gate for ingestions
#[derive(Debug)]
pub struct AdmissionControl {
    capacity: usize,
    slots: Mutex<Slots>,
    released: Condvar,
}

/// A held admission slot; dropping it frees the slot
#[must_use = "the slot is released as soon as the permit is dropped"]
#[derive(Debug)]
pub struct Permit<'a> {
    gate: &'a AdmissionControl,
}

impl AdmissionControl {
    /// `capacity` must be positive; zero would block every caller forever
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Mutex::new(Slots::default()),
            released: Condvar::new(),
        }
    }

    /// Block until a slot is free, then take it
    pub fn acquire(&self) -> Permit<'_> {
        let mut slots = self.slots.lock();
        while slots.in_flight >= self.capacity {
            self.released.wait(&mut slots);
        }
        self.admit(&mut slots);
        Permit { gate: self }
    }

    /// Take a slot only if one is free right now
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut slots = self.slots.lock();
        if slots.in_flight >= self.capacity {
            return None;
        }
        self.admit(&mut slots);
        Some(Permit { gate: self })
    }

    fn admit(&self, slots: &mut Slots) {
        slots.in_flight += 1;
        slots.peak = slots.peak.max(slots.in_flight);
    }

    fn release(&self) {
        let mut slots = self.slots.lock();
        slots.in_flight -= 1;
        drop(slots);
        self.released.notify_one();
    }

    /// Slots currently held
    pub fn in_flight(&self) -> usize {
        self.slots.lock().in_flight
    }

    /// Most slots ever held at the same time
    pub fn peak(&self) -> usize {
        self.slots.lock().peak
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
