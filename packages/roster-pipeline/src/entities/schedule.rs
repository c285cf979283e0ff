use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use super::vocab::{self, DAYS};
use super::{date_interval, Booking, Entity, EntityKind, Interval, Reference};
use crate::extract::RawRecord;
use crate::transform::{self, Column, Parsed};
use crate::validation::{FieldRule, RuleTable};

const ID: Column = Column::new("id", &[]);
const COURSE_ID: Column = Column::new("courseId", &["cursoId"]);
const INSTRUCTOR_ID: Column = Column::new("instructorId", &["profesorId"]);
const DAY: Column = Column::new("day", &["dia"]);
const START_TIME: Column = Column::new("startTime", &["horaInicio"]);
const END_TIME: Column = Column::new("endTime", &["horaFin"]);
const ROOM: Column = Column::new("room", &["aula"]);
const START_DATE: Column = Column::new("startDate", &["fechaInicio"]);
const END_DATE: Column = Column::new("endDate", &["fechaFin"]);
const MAX_CAPACITY: Column = Column::new("maxCapacity", &["capacidadMaxima"]);
const ENROLLED: Column = Column::new("enrolledLearnerIds", &["estudiantesInscritos"]);

/// One weekly session of a course in a room
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSlot {
    pub id: String,
    pub course_id: String,
    pub instructor_id: String,
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    pub room: String,
    pub start_date: Parsed<NaiveDate>,
    pub end_date: Parsed<NaiveDate>,
    pub max_capacity: Parsed<i64>,
    pub enrolled_learner_ids: Vec<String>,
}

impl Entity for ScheduleSlot {
    const KIND: EntityKind = EntityKind::ScheduleSlot;

    const COLUMNS: &'static [Column] = &[
        ID,
        COURSE_ID,
        INSTRUCTOR_ID,
        DAY,
        START_TIME,
        END_TIME,
        ROOM,
        START_DATE,
        END_DATE,
        MAX_CAPACITY,
        ENROLLED,
    ];

    fn from_raw(raw: &RawRecord) -> Self {
        Self {
            id: transform::text(raw, &ID),
            course_id: transform::text(raw, &COURSE_ID),
            instructor_id: transform::text(raw, &INSTRUCTOR_ID),
            day: transform::canonical(raw, &DAY, vocab::canonical_day),
            start_time: transform::text(raw, &START_TIME),
            end_time: transform::text(raw, &END_TIME),
            room: transform::text(raw, &ROOM),
            start_date: transform::date(raw, &START_DATE),
            end_date: transform::date(raw, &END_DATE),
            max_capacity: transform::integer(raw, &MAX_CAPACITY),
            enrolled_learner_ids: transform::id_list(raw, &ENROLLED),
        }
    }

    fn rules(ids: &Regex) -> RuleTable<Self> {
        RuleTable::new()
            .with(
                FieldRule::text("id", |s: &ScheduleSlot| s.id.as_str())
                    .required()
                    .pattern(ids, "id")
                    .unique(),
            )
            .with(
                FieldRule::text("courseId", |s: &ScheduleSlot| s.course_id.as_str())
                    .required()
                    .pattern(ids, "id"),
            )
            .with(
                FieldRule::text("instructorId", |s: &ScheduleSlot| s.instructor_id.as_str())
                    .required()
                    .pattern(ids, "id"),
            )
            .with(
                FieldRule::text("day", |s: &ScheduleSlot| s.day.as_str())
                    .required()
                    .one_of(DAYS),
            )
            .with(
                FieldRule::text("startTime", |s: &ScheduleSlot| s.start_time.as_str())
                    .required()
                    .pattern(&vocab::CLOCK_TIME, "HH:MM"),
            )
            .with(
                FieldRule::text("endTime", |s: &ScheduleSlot| s.end_time.as_str())
                    .required()
                    .pattern(&vocab::CLOCK_TIME, "HH:MM"),
            )
            .with(
                FieldRule::text("room", |s: &ScheduleSlot| s.room.as_str())
                    .required()
                    .pattern(&vocab::ROOM, "room code"),
            )
            .with(FieldRule::date("startDate", |s: &ScheduleSlot| &s.start_date).required())
            .with(FieldRule::date("endDate", |s: &ScheduleSlot| &s.end_date).required())
            .with(
                FieldRule::integer("maxCapacity", |s: &ScheduleSlot| &s.max_capacity)
                    .required()
                    .at_least(1.0),
            )
            .with(
                FieldRule::list("enrolledLearnerIds", |s: &ScheduleSlot| {
                    s.enrolled_learner_ids.as_slice()
                })
                .pattern(ids, "id"),
            )
    }

    fn record_id(&self) -> &str {
        &self.id
    }

    fn intervals(&self) -> Vec<Interval> {
        let minutes = |t: &str| vocab::clock_minutes(t).map(i64::from);
        vec![
            Interval::new(
                "startTime",
                "endTime",
                minutes(&self.start_time),
                minutes(&self.end_time),
            ),
            date_interval(&self.start_date, &self.end_date),
        ]
    }

    fn references(&self) -> Vec<Reference<'_>> {
        vec![
            Reference {
                parent: EntityKind::Course,
                field: "courseId",
                id: &self.course_id,
            },
            Reference {
                parent: EntityKind::Instructor,
                field: "instructorId",
                id: &self.instructor_id,
            },
        ]
    }

    fn booking(&self) -> Option<Booking> {
        Some(Booking {
            record_id: self.id.clone(),
            room: self.room.clone(),
            day: self.day.clone(),
            start: vocab::clock_minutes(&self.start_time)?,
            end: vocab::clock_minutes(&self.end_time)?,
        })
    }
}
