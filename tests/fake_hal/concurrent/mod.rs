use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

lazy_static! {
    static ref NAMED_COUNTERS: Mutex<HashMap<String, Arc<AtomicUsize>>> =
        Mutex::new(HashMap::new());
}

/// Returns the counter registered under `name`, creating it if needed.
pub fn named_counter(name: &str) -> Arc<AtomicUsize> {
    let mut map = NAMED_COUNTERS.lock().unwrap();
    map.entry(name.to_string())
        .or_insert_with(|| Arc::new(AtomicUsize::new(0)))
        .clone()
}

pub fn set_named_value(name: &str, value: usize) {
    named_counter(name).store(value, Ordering::SeqCst);
}

pub fn get_named_value(name: &str) -> usize {
    named_counter(name).load(Ordering::SeqCst)
}
