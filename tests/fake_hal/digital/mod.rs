use super::concurrent;
use embedded_hal::digital::{ErrorKind, ErrorType, InputPin, OutputPin};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, PartialEq)]
pub enum Error {}

impl embedded_hal::digital::Error for Error {
    fn kind(&self) -> ErrorKind {
        match *self {}
    }
}

/// A fake open-drain pin that replays a fixed sequence of line levels.
///
/// Each read consumes one level. Once the sequence is exhausted, reads return the default level,
/// which is high as if only the pull-up were attached. Reads and writes are counted under the
/// pin's name so they can be observed after the pin is moved into a sensor.
#[derive(Debug)]
pub struct Pin {
    data_to_read: Vec<u8>,
    data_index: usize,
    default_data: bool,
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

fn reads_key(name: &str) -> String {
    format!("{}/reads", name)
}

fn writes_key(name: &str) -> String {
    format!("{}/writes", name)
}

/// The number of line samples taken from the pin named `name`.
pub fn reads(name: &str) -> usize {
    concurrent::get_named_value(&reads_key(name))
}

/// The number of times the pin named `name` was driven low or released.
pub fn writes(name: &str) -> usize {
    concurrent::get_named_value(&writes_key(name))
}

impl Pin {
    pub fn new(name: &'static str) -> Pin {
        concurrent::set_named_value(&reads_key(name), 0);
        concurrent::set_named_value(&writes_key(name), 0);
        Pin {
            data_to_read: Vec::new(),
            data_index: 0,
            default_data: true,
            reads: concurrent::named_counter(&reads_key(name)),
            writes: concurrent::named_counter(&writes_key(name)),
        }
    }

    pub fn set_default_data(&mut self, default: bool) {
        self.default_data = default;
    }

    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data_to_read = data;
        self.data_index = 0;
    }

    fn next_level(&mut self) -> bool {
        self.reads.fetch_add(1, Ordering::Relaxed);
        match self.data_to_read.get(self.data_index) {
            Some(level) => {
                self.data_index += 1;
                *level > 0
            }
            None => self.default_data,
        }
    }
}

impl ErrorType for Pin {
    type Error = Error;
}

impl InputPin for Pin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.next_level())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.next_level())
    }
}

impl OutputPin for Pin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
