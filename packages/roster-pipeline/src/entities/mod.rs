//! The four entity shapes, their source columns and their rule tables
//!
//! Each entity implements [`Entity`]: how a raw row becomes a typed candidate,
//! which declarative rules it must satisfy and which cross-record facts
//! (intervals, foreign keys, room bookings) the referential pass inspects.

mod course;
mod instructor;
mod learner;
mod schedule;
pub mod vocab;

pub use course::Course;
pub use instructor::Instructor;
pub use learner::Learner;
pub use schedule::ScheduleSlot;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::extract::RawRecord;
use crate::transform::{Column, Parsed};
use crate::validation::RuleTable;

/// Which of the four fixed collections a stage works on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Instructor,
    Course,
    Learner,
    ScheduleSlot,
}

impl EntityKind {
    /// Load order: every kind comes after the kinds it references
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Instructor,
        EntityKind::Course,
        EntityKind::Learner,
        EntityKind::ScheduleSlot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Instructor => "instructor",
            EntityKind::Course => "course",
            EntityKind::Learner => "learner",
            EntityKind::ScheduleSlot => "schedule_slot",
        }
    }

    /// Target collection name
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Instructor => "instructors",
            EntityKind::Course => "courses",
            EntityKind::Learner => "learners",
            EntityKind::ScheduleSlot => "schedule_slots",
        }
    }

    /// Key of the source file name under `sources:` in the config
    pub fn source_key(&self) -> &'static str {
        match self {
            EntityKind::Instructor => "instructors",
            EntityKind::Course => "courses",
            EntityKind::Learner => "learners",
            EntityKind::ScheduleSlot => "schedule",
        }
    }

    /// Kinds whose ids this kind references
    pub fn dependencies(&self) -> &'static [EntityKind] {
        match self {
            EntityKind::Instructor => &[],
            EntityKind::Course => &[EntityKind::Instructor],
            EntityKind::Learner => &[EntityKind::Course],
            EntityKind::ScheduleSlot => &[EntityKind::Course, EntityKind::Instructor],
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A start/end pair that must be strictly ordered when both ends parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    pub start_field: String,
    pub end_field: String,
    /// Comparable keys (days since CE for dates, minutes for times)
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl Interval {
    pub fn new(
        start_field: impl Into<String>,
        end_field: impl Into<String>,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Self {
        Self {
            start_field: start_field.into(),
            end_field: end_field.into(),
            start,
            end,
        }
    }

    pub fn is_inverted(&self) -> bool {
        matches!((self.start, self.end), (Some(s), Some(e)) if s >= e)
    }
}

/// A foreign key held by a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference<'a> {
    pub parent: EntityKind,
    pub field: &'static str,
    pub id: &'a str,
}

/// A room occupied on one weekday for `[start, end)` minutes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub record_id: String,
    pub room: String,
    pub day: String,
    pub start: u16,
    pub end: u16,
}

impl Booking {
    /// Half-open overlap on the same room and day; touching slots do not conflict
    pub fn conflicts_with(&self, other: &Booking) -> bool {
        self.room == other.room
            && self.day == other.day
            && self.start < other.end
            && other.start < self.end
    }
}

/// One entity shape as seen by the pipeline
pub trait Entity: Serialize + Sized + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Every source column the transformer reads
    const COLUMNS: &'static [Column];

    /// Field Transformer: best-effort typed candidate, never fails
    fn from_raw(raw: &RawRecord) -> Self;

    /// Declarative field rules; `ids` is the configured id format
    fn rules(ids: &Regex) -> RuleTable<Self>;

    /// Identifier used in diagnostics
    fn record_id(&self) -> &str;

    fn intervals(&self) -> Vec<Interval> {
        Vec::new()
    }

    /// Cross-field checks beyond the rule table
    fn consistency_violations(&self) -> Vec<String> {
        Vec::new()
    }

    fn references(&self) -> Vec<Reference<'_>> {
        Vec::new()
    }

    fn booking(&self) -> Option<Booking> {
        None
    }
}

/// `{day, startTime, endTime}` entry of an availability or schedule array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    #[serde(default, alias = "dia")]
    pub day: Option<String>,
    #[serde(default, alias = "horaInicio")]
    pub start_time: Option<String>,
    #[serde(default, alias = "horaFin")]
    pub end_time: Option<String>,
}

impl TimeSlot {
    /// Slot with its day spelled canonically when recognised
    pub fn canonicalized(mut self) -> Self {
        if let Some(day) = self.day.as_deref().and_then(vocab::canonical_day) {
            self.day = Some(day.to_string());
        }
        self
    }

    pub fn is_complete(&self) -> bool {
        self.day.is_some() && self.start_time.is_some() && self.end_time.is_some()
    }
}

/// One entry of a learner's grade history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord {
    #[serde(default, alias = "cursoId")]
    pub course_id: Option<String>,
    #[serde(default, alias = "nombreCurso")]
    pub course_name: Option<String>,
    #[serde(default, alias = "fechaInicio")]
    pub start_date: Option<String>,
    #[serde(default, alias = "fechaFin")]
    pub end_date: Option<String>,
    #[serde(default, alias = "peso")]
    pub weight: Option<f64>,
    #[serde(default, alias = "notaFinal")]
    pub final_grade: Option<f64>,
}

impl GradeRecord {
    pub fn is_complete(&self) -> bool {
        self.course_id.is_some()
            && self.course_name.is_some()
            && self.start_date.is_some()
            && self.end_date.is_some()
            && self.weight.is_some()
            && self.final_grade.is_some()
    }
}

/// Date as a comparable day number
fn day_key(date: &NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce())
}

/// One `startTime < endTime` interval per complete slot
pub(crate) fn slot_intervals(field: &str, slots: &Parsed<Vec<TimeSlot>>) -> Vec<Interval> {
    let Some(slots) = slots.valid() else {
        return Vec::new();
    };
    slots
        .iter()
        .enumerate()
        .map(|(i, slot)| {
            let minutes = |t: &Option<String>| {
                t.as_deref()
                    .and_then(vocab::clock_minutes)
                    .map(i64::from)
            };
            Interval::new(
                format!("{field}[{i}].startTime"),
                format!("{field}[{i}].endTime"),
                minutes(&slot.start_time),
                minutes(&slot.end_time),
            )
        })
        .collect()
}

/// `startDate < endDate` when both parsed
pub(crate) fn date_interval(start: &Parsed<NaiveDate>, end: &Parsed<NaiveDate>) -> Interval {
    Interval::new(
        "startDate",
        "endDate",
        start.valid().map(day_key),
        end.valid().map(day_key),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(room: &str, day: &str, start: u16, end: u16) -> Booking {
        Booking {
            record_id: "S00001".to_string(),
            room: room.to_string(),
            day: day.to_string(),
            start,
            end,
        }
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(EntityKind::ScheduleSlot.to_string(), "schedule_slot");
        assert_eq!(EntityKind::ScheduleSlot.collection(), "schedule_slots");
        assert_eq!(EntityKind::ScheduleSlot.source_key(), "schedule");
    }

    #[test]
    fn test_all_is_dependency_ordered() {
        for (i, kind) in EntityKind::ALL.iter().enumerate() {
            for dep in kind.dependencies() {
                let pos = EntityKind::ALL.iter().position(|k| k == dep).unwrap();
                assert!(pos < i, "{} must load before {}", dep, kind);
            }
        }
    }

    #[test]
    fn test_booking_half_open() {
        let a = booking("A101", "Monday", 480, 600);
        assert!(a.conflicts_with(&booking("A101", "Monday", 540, 660)));
        // back-to-back is fine
        assert!(!a.conflicts_with(&booking("A101", "Monday", 600, 720)));
        assert!(!a.conflicts_with(&booking("A102", "Monday", 540, 660)));
        assert!(!a.conflicts_with(&booking("A101", "Tuesday", 540, 660)));
        // containment
        assert!(a.conflicts_with(&booking("A101", "Monday", 500, 520)));
    }

    #[test]
    fn test_interval_inversion() {
        assert!(Interval::new("startDate", "endDate", Some(10), Some(5)).is_inverted());
        assert!(Interval::new("startDate", "endDate", Some(5), Some(5)).is_inverted());
        assert!(!Interval::new("startDate", "endDate", Some(5), Some(10)).is_inverted());
        assert!(!Interval::new("startDate", "endDate", None, Some(10)).is_inverted());
    }

    #[test]
    fn test_time_slot_aliases() {
        let slot: TimeSlot =
            serde_json::from_str(r#"{"dia": "lunes", "horaInicio": "08:00", "horaFin": "10:00"}"#)
                .unwrap();
        let slot = slot.canonicalized();
        assert_eq!(slot.day.as_deref(), Some("Monday"));
        assert!(slot.is_complete());

        let json = serde_json::to_value(&slot).unwrap();
        assert_eq!(json["startTime"], "08:00");
    }

    #[test]
    fn test_grade_record_completeness() {
        let grade: GradeRecord =
            serde_json::from_str(r#"{"cursoId": "CUR001", "peso": 0.5, "notaFinal": 8}"#).unwrap();
        assert!(!grade.is_complete());
        assert_eq!(grade.final_grade, Some(8.0));

        let undated: GradeRecord = serde_json::from_str(
            r#"{"cursoId": "CUR001", "nombreCurso": "Algebra", "peso": 0.4, "notaFinal": 8.5}"#,
        )
        .unwrap();
        assert!(!undated.is_complete());
    }
}
