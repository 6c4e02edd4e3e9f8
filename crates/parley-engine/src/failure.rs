//! Circuit breaker for repeatedly failing tool calls.
//!
//! A call is identified by tool name plus its arguments with object keys
//! sorted recursively, so argument order never splits a key.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::debug;

pub struct FailureTracker {
    threshold: u32,
    window: Duration,
    failures: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl FailureTracker {
    pub fn new(threshold: u32, window: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Failures of this exact call inside the window.
    pub fn recent_failures(&self, name: &str, args: &Map<String, Value>) -> u32 {
        let key = call_key(name, args);
        let mut failures = self.failures.lock();
        let Some(times) = failures.get_mut(&key) else {
            return 0;
        };
        evict(times, self.window);
        let count = u32::try_from(times.len()).unwrap_or(u32::MAX);
        if times.is_empty() {
            failures.remove(&key);
        }
        count
    }

    /// Whether this call has failed `threshold` times within the window.
    pub fn is_blocked(&self, name: &str, args: &Map<String, Value>) -> bool {
        self.recent_failures(name, args) >= self.threshold
    }

    pub fn record_failure(&self, name: &str, args: &Map<String, Value>) {
        let key = call_key(name, args);
        let mut failures = self.failures.lock();
        let times = failures.entry(key).or_default();
        evict(times, self.window);
        times.push_back(Instant::now());
        debug!(tool = name, failures = times.len(), "tool failure recorded");
    }

    /// A success clears the history of that exact call.
    pub fn record_success(&self, name: &str, args: &Map<String, Value>) {
        self.failures.lock().remove(&call_key(name, args));
    }
}

fn evict(times: &mut VecDeque<Instant>, window: Duration) {
    let now = Instant::now();
    while times
        .front()
        .is_some_and(|t| now.duration_since(*t) > window)
    {
        times.pop_front();
    }
}

fn call_key(name: &str, args: &Map<String, Value>) -> String {
    let mut key = String::from(name);
    key.push('(');
    write_canonical(&mut key, &Value::Object(args.clone()));
    key.push(')');
    key
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(k) {
                    write_canonical(out, v);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, v);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
