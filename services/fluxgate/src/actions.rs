//! Inbound action surface
//!
//! Actions arrive as JSON objects tagged by `"action"`:
//!
//! ```json
//! {"action": "write_float_point", "measurement": "temp", "tags": "room=lab",
//!  "field": "celsius", "value": "21.5"}
//! {"action": "write_boolean_point", "measurement": "door", "field": "open", "value": "true"}
//! {"action": "write_line", "measurement": "m", "tags": "a=1", "fields": "x=1.5,y=\"on\""}
//! {"action": "flush_buffer"}
//! ```
//!
//! Omitted options take the same defaults the controller UI offers.

use serde::{Deserialize, Serialize};

/// Options shared by the float and string point actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointOptions {
    pub measurement: String,
    pub tags: String,
    pub field: String,
    pub value: String,
}

impl Default for PointOptions {
    fn default() -> Self {
        Self {
            measurement: "example".to_string(),
            tags: "tag1=value1,tag2=value2".to_string(),
            field: "value".to_string(),
            value: "0".to_string(),
        }
    }
}

/// Closed boolean choice; never free text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoolChoice {
    #[default]
    True,
    False,
}

impl BoolChoice {
    pub fn as_bool(self) -> bool {
        matches!(self, BoolChoice::True)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BooleanOptions {
    pub measurement: String,
    pub tags: String,
    pub field: String,
    pub value: BoolChoice,
}

impl Default for BooleanOptions {
    fn default() -> Self {
        Self {
            measurement: "example".to_string(),
            tags: "tag1=value1,tag2=value2".to_string(),
            field: "field".to_string(),
            value: BoolChoice::True,
        }
    }
}

/// Raw line options; `fields` is caller-formatted line protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineOptions {
    pub measurement: String,
    pub tags: String,
    pub fields: String,
}

impl Default for LineOptions {
    fn default() -> Self {
        Self {
            measurement: "exampleMeasurement".to_string(),
            tags: "tag1=value1,tag2=value2".to_string(),
            fields: r#"field1=1234.5,field2="value2""#.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    WriteFloatPoint(PointOptions),
    WriteStringPoint(PointOptions),
    WriteBooleanPoint(BooleanOptions),
    WriteLine(LineOptions),
    FlushBuffer,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::WriteFloatPoint(_) => "write_float_point",
            Action::WriteStringPoint(_) => "write_string_point",
            Action::WriteBooleanPoint(_) => "write_boolean_point",
            Action::WriteLine(_) => "write_line",
            Action::FlushBuffer => "flush_buffer",
        }
    }
}

/// What an action did once it succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// One line was added to the write buffer
    Buffered,
    /// The buffer was flushed; number of lines transmitted
    Flushed(usize),
}
