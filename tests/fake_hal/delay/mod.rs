use super::concurrent;
use embedded_hal::delay::DelayNs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A delay that returns immediately and records the requested time in microseconds.
pub struct Delay {
    elapsed_us: Arc<AtomicUsize>,
}

fn elapsed_key(name: &str) -> String {
    format!("{}/delay_us", name)
}

/// The total delay requested from the delay named `name`, in milliseconds.
pub fn elapsed_ms(name: &str) -> usize {
    concurrent::get_named_value(&elapsed_key(name)) / 1000
}

impl Delay {
    pub fn new(name: &'static str) -> Delay {
        concurrent::set_named_value(&elapsed_key(name), 0);
        Delay {
            elapsed_us: concurrent::named_counter(&elapsed_key(name)),
        }
    }
}

impl DelayNs for Delay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_us
            .fetch_add(ns as usize / 1000, Ordering::Relaxed);
    }

    fn delay_us(&mut self, us: u32) {
        self.elapsed_us.fetch_add(us as usize, Ordering::Relaxed);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.elapsed_us
            .fetch_add(ms as usize * 1000, Ordering::Relaxed);
    }
}
