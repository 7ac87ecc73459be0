//! Normalized ride records and the projection from raw export objects.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Default key of the nested parameter group inside each raw object.
pub const DEFAULT_PARAMETER_KEY: &str = "parameter3";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// One bike rental.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ride {
    pub departure_station_id: Option<String>,
    pub arrival_station_id: Option<String>,
    pub bike_id: Option<String>,
    pub bonus_earned: f64,
    pub distance_meters: f64,
    pub average_speed_kmh: Option<f64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl Ride {
    /// Signed duration; negative when the export has `end < start`.
    pub fn duration_seconds(&self) -> i64 {
        (self.end_time - self.start_time).num_seconds()
    }
}

/// Why a raw object did not become a [`Ride`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    #[error("raw value is not a JSON object")]
    NotAnObject,
    #[error("missing {0}")]
    MissingTimestamp(&'static str),
    #[error("invalid {field} timestamp '{value}'")]
    InvalidTimestamp { field: &'static str, value: String },
    #[error("field {0} is not numeric")]
    InvalidNumber(&'static str),
    #[error("field {0} is negative")]
    NegativeValue(&'static str),
    #[error("end time precedes start time by {0}s")]
    NegativeDuration(i64),
}

/// Per-reason rejection counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RejectionCounts {
    pub not_an_object: usize,
    pub missing_timestamp: usize,
    pub invalid_timestamp: usize,
    pub invalid_number: usize,
    pub negative_value: usize,
    pub negative_duration: usize,
}

impl RejectionCounts {
    pub fn record(&mut self, reason: &RejectReason) {
        match reason {
            RejectReason::NotAnObject => self.not_an_object += 1,
            RejectReason::MissingTimestamp(_) => self.missing_timestamp += 1,
            RejectReason::InvalidTimestamp { .. } => self.invalid_timestamp += 1,
            RejectReason::InvalidNumber(_) => self.invalid_number += 1,
            RejectReason::NegativeValue(_) => self.negative_value += 1,
            RejectReason::NegativeDuration(_) => self.negative_duration += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.not_an_object
            + self.missing_timestamp
            + self.invalid_timestamp
            + self.invalid_number
            + self.negative_value
            + self.negative_duration
    }
}

/// Maps one raw export object to a [`Ride`].
///
/// Identifiers may be strings or numbers. Numeric fields may be numbers or
/// numeric strings; `null` counts as absent.
pub fn project_ride(raw: &Value, parameter_key: &str) -> Result<Ride, RejectReason> {
    let obj = raw.as_object().ok_or(RejectReason::NotAnObject)?;

    let empty = Map::new();
    let params = obj
        .get(parameter_key)
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let start_time = timestamp(obj, "startDate")?;
    let end_time = timestamp(obj, "endDate")?;

    let bonus_earned = non_negative(params, "BONUS_EARNED")?.unwrap_or(0.0);
    let distance_meters = non_negative(params, "DISTANCE")?.unwrap_or(0.0);
    let average_speed_kmh = number(params, "AVERAGE_SPEED")?;

    Ok(Ride {
        departure_station_id: identifier(params, "departureStationId"),
        arrival_station_id: identifier(params, "arrivalStationId"),
        bike_id: identifier(params, "BIKEID"),
        bonus_earned,
        distance_meters,
        average_speed_kmh,
        start_time,
        end_time,
    })
}

/// Parses a `YYYY-MM-DDTHH:MM:SSZ` UTC timestamp.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn timestamp(obj: &Map<String, Value>, field: &'static str) -> Result<DateTime<Utc>, RejectReason> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(RejectReason::MissingTimestamp(field)),
        Some(Value::String(s)) if s.is_empty() => Err(RejectReason::MissingTimestamp(field)),
        Some(Value::String(s)) => parse_timestamp(s).ok_or_else(|| RejectReason::InvalidTimestamp {
            field,
            value: s.clone(),
        }),
        Some(other) => Err(RejectReason::InvalidTimestamp {
            field,
            value: other.to_string(),
        }),
    }
}

fn identifier(params: &Map<String, Value>, field: &str) -> Option<String> {
    match params.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(params: &Map<String, Value>, field: &'static str) -> Result<Option<f64>, RejectReason> {
    let parsed = match params.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(RejectReason::InvalidNumber(field)),
    }
}

fn non_negative(
    params: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<f64>, RejectReason> {
    match number(params, field)? {
        Some(v) if v < 0.0 => Err(RejectReason::NegativeValue(field)),
        other => Ok(other),
    }
}
