//! Line protocol encoder
//!
//! ```text
//! <measurement>,<tag>=<val>,... <field>=<fval>,... <timestamp_ns>
//! ```
//!
//! Timestamps are wall-clock milliseconds scaled to nanoseconds, captured
//! per point at encode time. Measurement names, tag keys/values and field
//! keys are written as-is; only string field values are quoted and escaped.

use std::sync::Arc;

use crate::point::Point;
use crate::time::{SystemTimeProvider, TimeProvider};

const NANOS_PER_MILLI: i64 = 1_000_000;

/// Serializes points (and caller-formatted raw lines) into line protocol
#[derive(Clone)]
pub struct LineEncoder {
    clock: Arc<dyn TimeProvider>,
}

impl Default for LineEncoder {
    fn default() -> Self {
        Self::new(Arc::new(SystemTimeProvider))
    }
}

impl std::fmt::Debug for LineEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineEncoder").finish_non_exhaustive()
    }
}

impl LineEncoder {
    pub fn new(clock: Arc<dyn TimeProvider>) -> Self {
        Self { clock }
    }

    /// Current timestamp in nanoseconds (millisecond resolution)
    pub fn now_nanos(&self) -> i64 {
        self.clock.now_millis().saturating_mul(NANOS_PER_MILLI)
    }

    /// Encode a point stamped with the current time
    pub fn encode(&self, point: &Point) -> String {
        self.encode_at(point, self.now_nanos())
    }

    /// Encode a point with an explicit nanosecond timestamp
    pub fn encode_at(&self, point: &Point, timestamp_ns: i64) -> String {
        let mut line = point.to_string();
        append_timestamp(&mut line, timestamp_ns);
        line
    }

    /// Assemble a raw line from caller-formatted sections
    ///
    /// `tags` and `fields` are inserted verbatim. An empty `tags` section
    /// drops the separating comma.
    pub fn raw_line(&self, measurement: &str, tags: &str, fields: &str) -> String {
        let mut line = String::with_capacity(measurement.len() + tags.len() + fields.len() + 22);
        line.push_str(measurement);
        if !tags.is_empty() {
            line.push(',');
            line.push_str(tags);
        }
        line.push(' ');
        line.push_str(fields);
        append_timestamp(&mut line, self.now_nanos());
        line
    }
}

fn append_timestamp(line: &mut String, timestamp_ns: i64) {
    let mut buffer = itoa::Buffer::new();
    line.push(' ');
    line.push_str(buffer.format(timestamp_ns));
}
