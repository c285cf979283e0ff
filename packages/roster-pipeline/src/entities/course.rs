use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use super::vocab::{self, LEVELS, STATUSES};
use super::{date_interval, slot_intervals, Entity, EntityKind, Interval, Reference, TimeSlot};
use crate::extract::RawRecord;
use crate::transform::{self, Column, Parsed};
use crate::validation::{FieldRule, RuleTable};

const ID: Column = Column::new("id", &[]);
const NAME: Column = Column::new("name", &["nombre"]);
const DESCRIPTION: Column = Column::new("description", &["descripcion"]);
const DURATION: Column = Column::new("duration", &["duracion"]);
const LEVEL: Column = Column::new("level", &["nivel"]);
const START_DATE: Column = Column::new("startDate", &["fechaInicio"]);
const END_DATE: Column = Column::new("endDate", &["fechaFin"]);
const INSTRUCTOR_ID: Column = Column::new("instructorId", &["profesorId"]);
const MAX_CAPACITY: Column = Column::new("maxCapacity", &["capacidadMaxima"]);
const ENROLLED: Column = Column::new("enrolledLearnerIds", &["estudiantesInscritos"]);
const SCHEDULE: Column = Column::new("schedule", &["horario"]);
const STATUS: Column = Column::new("status", &["estado"]);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub name: String,
    pub description: String,
    pub duration: String,
    pub level: String,
    pub start_date: Parsed<NaiveDate>,
    pub end_date: Parsed<NaiveDate>,
    pub instructor_id: String,
    pub max_capacity: Parsed<i64>,
    pub enrolled_learner_ids: Vec<String>,
    pub schedule: Parsed<Vec<TimeSlot>>,
    pub status: String,
}

impl Entity for Course {
    const KIND: EntityKind = EntityKind::Course;

    const COLUMNS: &'static [Column] = &[
        ID,
        NAME,
        DESCRIPTION,
        DURATION,
        LEVEL,
        START_DATE,
        END_DATE,
        INSTRUCTOR_ID,
        MAX_CAPACITY,
        ENROLLED,
        SCHEDULE,
        STATUS,
    ];

    fn from_raw(raw: &RawRecord) -> Self {
        let schedule = match transform::json_list::<TimeSlot>(raw, &SCHEDULE) {
            Parsed::Valid(slots) => {
                Parsed::Valid(slots.into_iter().map(TimeSlot::canonicalized).collect())
            }
            other => other,
        };

        Self {
            id: transform::text(raw, &ID),
            name: transform::text(raw, &NAME),
            description: transform::text(raw, &DESCRIPTION),
            duration: transform::text(raw, &DURATION),
            level: transform::canonical(raw, &LEVEL, vocab::canonical_level),
            start_date: transform::date(raw, &START_DATE),
            end_date: transform::date(raw, &END_DATE),
            instructor_id: transform::text(raw, &INSTRUCTOR_ID),
            max_capacity: transform::integer(raw, &MAX_CAPACITY),
            enrolled_learner_ids: transform::id_list(raw, &ENROLLED),
            schedule,
            status: transform::canonical(raw, &STATUS, vocab::canonical_status),
        }
    }

    fn rules(ids: &Regex) -> RuleTable<Self> {
        RuleTable::new()
            .with(
                FieldRule::text("id", |c: &Course| c.id.as_str())
                    .required()
                    .pattern(ids, "id")
                    .unique(),
            )
            .with(FieldRule::text("name", |c: &Course| c.name.as_str()).required())
            .with(FieldRule::text("description", |c: &Course| c.description.as_str()).required())
            .with(FieldRule::text("duration", |c: &Course| c.duration.as_str()).required())
            .with(
                FieldRule::text("level", |c: &Course| c.level.as_str())
                    .required()
                    .one_of(LEVELS),
            )
            .with(FieldRule::date("startDate", |c: &Course| &c.start_date).required())
            .with(FieldRule::date("endDate", |c: &Course| &c.end_date).required())
            .with(
                FieldRule::text("instructorId", |c: &Course| c.instructor_id.as_str())
                    .required()
                    .pattern(ids, "id"),
            )
            .with(
                FieldRule::integer("maxCapacity", |c: &Course| &c.max_capacity)
                    .required()
                    .at_least(1.0),
            )
            .with(
                FieldRule::list("enrolledLearnerIds", |c: &Course| {
                    c.enrolled_learner_ids.as_slice()
                })
                .pattern(ids, "id"),
            )
            .with(FieldRule::slots("schedule", |c: &Course| &c.schedule))
            .with(FieldRule::text("status", |c: &Course| c.status.as_str()).one_of(STATUSES))
    }

    fn record_id(&self) -> &str {
        &self.id
    }

    fn intervals(&self) -> Vec<Interval> {
        let mut intervals = vec![date_interval(&self.start_date, &self.end_date)];
        intervals.extend(slot_intervals("schedule", &self.schedule));
        intervals
    }

    fn consistency_violations(&self) -> Vec<String> {
        match self.max_capacity.valid() {
            Some(&cap) if self.enrolled_learner_ids.len() as i64 > cap => vec![format!(
                "enrolledLearnerIds has {} entries, more than maxCapacity {}",
                self.enrolled_learner_ids.len(),
                cap
            )],
            _ => Vec::new(),
        }
    }

    fn references(&self) -> Vec<Reference<'_>> {
        vec![Reference {
            parent: EntityKind::Instructor,
            field: "instructorId",
            id: &self.instructor_id,
        }]
    }
}
