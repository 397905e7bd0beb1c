use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field injected into every aggregated record naming the partition it came from.
pub const ORIGIN_FIELD: &str = "origin";
/// Field holding the task status folded into a [`TaskCounts`].
pub const STATUS_FIELD: &str = "status";

/// Identifies one of the two partitions the crate aggregates across.
///
/// The set is fixed. `Alec` is partition A and always precedes `Nate`
/// (partition B) in aggregated output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Alec,
    Nate,
}

impl Origin {
    /// Every partition in aggregation order.
    pub const ALL: [Origin; 2] = [Origin::Alec, Origin::Nate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Alec => "alec",
            Origin::Nate => "nate",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Origin {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "alec" => Ok(Origin::Alec),
            "nate" => Ok(Origin::Nate),
            other => Err(format!("unknown partition '{other}'")),
        }
    }
}

/// Entity types that can be aggregated and watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Engineers,
    Tasks,
    Feed,
}

impl EntityType {
    /// Name of the backing table in each partition.
    pub fn table(&self) -> &'static str {
        match self {
            EntityType::Engineers => "engineers",
            EntityType::Tasks => "tasks",
            EntityType::Feed => "feed",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// A single row returned by a partition, annotated with its origin.
///
/// The schema belongs to the partitions, so the record stays an untyped JSON
/// object and fields are read on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Wraps a raw row and stamps it with `origin`, replacing any existing
    /// `origin` field.
    pub fn tagged(mut fields: Map<String, Value>, origin: Origin) -> Self {
        fields.insert(
            ORIGIN_FIELD.to_string(),
            Value::String(origin.as_str().to_string()),
        );
        Self { fields }
    }

    /// Partition the record was produced by, if it carries a valid tag.
    pub fn origin(&self) -> Option<Origin> {
        self.fields
            .get(ORIGIN_FIELD)
            .and_then(Value::as_str)
            .and_then(|value| value.parse().ok())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Reads `field` as a point in time. See [`parse_timestamp`] for the
    /// accepted shapes.
    pub fn timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        self.fields.get(field).and_then(parse_timestamp)
    }
}

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f%#z"];
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Interprets a JSON value as a timestamp.
///
/// Strings may be RFC 3339, carry a short offset such as `+00`, use a space
/// instead of `T`, or have no offset at all (read as UTC). Numbers are epoch
/// milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => parse_timestamp_str(text.trim()),
        Value::Number(number) => number.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

fn parse_timestamp_str(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(text, format).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|naive| naive.and_utc())
        })
}

/// Task statuses that are counted by the tally. Any other value is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    InProgress,
    Completed,
    Blocked,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Queued,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Blocked,
    ];

    /// Parses a status value; unrecognised strings return `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(TaskStatus::Queued),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "blocked" => Some(TaskStatus::Blocked),
            _ => None,
        }
    }
}

/// Count of tasks per recognised status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTally {
    pub queued: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub blocked: usize,
}

impl StatusTally {
    pub fn get(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::Queued => self.queued,
            TaskStatus::InProgress => self.in_progress,
            TaskStatus::Completed => self.completed,
            TaskStatus::Blocked => self.blocked,
        }
    }

    pub fn increment(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Queued => self.queued += 1,
            TaskStatus::InProgress => self.in_progress += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Blocked => self.blocked += 1,
        }
    }

    /// Number of tasks across all recognised statuses.
    pub fn sum(&self) -> usize {
        TaskStatus::ALL.iter().map(|status| self.get(*status)).sum()
    }
}

/// Task status tally kept per partition and as a grand total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub alec: StatusTally,
    pub nate: StatusTally,
    pub total: StatusTally,
}

impl TaskCounts {
    pub fn for_origin(&self, origin: Origin) -> &StatusTally {
        match origin {
            Origin::Alec => &self.alec,
            Origin::Nate => &self.nate,
        }
    }

    /// Counts one task for `origin`. The total and the partition tally always
    /// move together.
    pub fn record(&mut self, origin: Origin, status: TaskStatus) {
        self.total.increment(status);
        match origin {
            Origin::Alec => self.alec.increment(status),
            Origin::Nate => self.nate.increment(status),
        }
    }
}
