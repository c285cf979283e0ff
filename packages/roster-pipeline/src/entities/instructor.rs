use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use super::vocab::{self, IDENTIFICATION_TYPES};
use super::{slot_intervals, Entity, EntityKind, Interval, TimeSlot};
use crate::extract::RawRecord;
use crate::transform::{self, Column, Parsed};
use crate::validation::{FieldRule, RuleTable};

const ID: Column = Column::new("id", &[]);
const IDENTIFICATION_TYPE: Column = Column::new("identificationType", &["tipoIdentificacion"]);
const IDENTIFICATION_NUMBER: Column =
    Column::new("identificationNumber", &["numeroIdentificacion"]);
const FIRST_NAME: Column = Column::new("firstName", &["primerNombre"]);
const MIDDLE_NAME: Column = Column::new("middleName", &["segundoNombre"]);
const LAST_NAME: Column = Column::new("lastName", &["primerApellido"]);
const SECOND_LAST_NAME: Column = Column::new("secondLastName", &["segundoApellido"]);
const AGE: Column = Column::new("age", &["edad"]);
const EMAIL: Column = Column::new("email", &["correo"]);
const REGISTRATION_DATE: Column = Column::new("registrationDate", &["fechaRegistro"]);
const SPECIALTY: Column = Column::new("specialty", &["especialidad"]);
const ASSIGNED_COURSE_IDS: Column = Column::new("assignedCourseIds", &["cursosAsignados"]);
const AVAILABILITY: Column = Column::new("availability", &["horarioDisponible"]);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Instructor {
    pub id: String,
    pub identification_type: String,
    pub identification_number: String,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub second_last_name: String,
    pub age: Parsed<i64>,
    pub email: String,
    pub registration_date: Parsed<NaiveDate>,
    pub specialty: String,
    pub assigned_course_ids: Vec<String>,
    pub availability: Parsed<Vec<TimeSlot>>,
}

impl Entity for Instructor {
    const KIND: EntityKind = EntityKind::Instructor;

    const COLUMNS: &'static [Column] = &[
        ID,
        IDENTIFICATION_TYPE,
        IDENTIFICATION_NUMBER,
        FIRST_NAME,
        MIDDLE_NAME,
        LAST_NAME,
        SECOND_LAST_NAME,
        AGE,
        EMAIL,
        REGISTRATION_DATE,
        SPECIALTY,
        ASSIGNED_COURSE_IDS,
        AVAILABILITY,
    ];

    fn from_raw(raw: &RawRecord) -> Self {
        let availability = match transform::json_list::<TimeSlot>(raw, &AVAILABILITY) {
            Parsed::Valid(slots) => {
                Parsed::Valid(slots.into_iter().map(TimeSlot::canonicalized).collect())
            }
            other => other,
        };

        Self {
            id: transform::text(raw, &ID),
            identification_type: transform::canonical(
                raw,
                &IDENTIFICATION_TYPE,
                vocab::canonical_identification_type,
            ),
            identification_number: transform::text(raw, &IDENTIFICATION_NUMBER),
            first_name: transform::text(raw, &FIRST_NAME),
            middle_name: transform::text(raw, &MIDDLE_NAME),
            last_name: transform::text(raw, &LAST_NAME),
            second_last_name: transform::text(raw, &SECOND_LAST_NAME),
            age: transform::integer(raw, &AGE),
            email: transform::text(raw, &EMAIL),
            registration_date: transform::date(raw, &REGISTRATION_DATE),
            specialty: transform::text(raw, &SPECIALTY),
            assigned_course_ids: transform::id_list(raw, &ASSIGNED_COURSE_IDS),
            availability,
        }
    }

    fn rules(ids: &Regex) -> RuleTable<Self> {
        RuleTable::new()
            .with(
                FieldRule::text("id", |i: &Instructor| i.id.as_str())
                    .required()
                    .pattern(ids, "id")
                    .unique(),
            )
            .with(
                FieldRule::text("identificationType", |i: &Instructor| {
                    i.identification_type.as_str()
                })
                .one_of(IDENTIFICATION_TYPES),
            )
            .with(
                FieldRule::text("identificationNumber", |i: &Instructor| {
                    i.identification_number.as_str()
                })
                .unique(),
            )
            .with(FieldRule::text("firstName", |i: &Instructor| i.first_name.as_str()).required())
            .with(FieldRule::text("lastName", |i: &Instructor| i.last_name.as_str()).required())
            .with(
                FieldRule::integer("age", |i: &Instructor| &i.age)
                    .required()
                    .range(18.0, 100.0),
            )
            .with(
                FieldRule::text("email", |i: &Instructor| i.email.as_str())
                    .required()
                    .pattern(&vocab::EMAIL, "email")
                    .unique_ignoring_case(),
            )
            .with(FieldRule::date("registrationDate", |i: &Instructor| {
                &i.registration_date
            }))
            .with(FieldRule::text("specialty", |i: &Instructor| i.specialty.as_str()).required())
            .with(
                FieldRule::list("assignedCourseIds", |i: &Instructor| {
                    i.assigned_course_ids.as_slice()
                })
                .pattern(ids, "id"),
            )
            .with(FieldRule::slots("availability", |i: &Instructor| {
                &i.availability
            }))
    }

    fn record_id(&self) -> &str {
        &self.id
    }

    fn intervals(&self) -> Vec<Interval> {
        slot_intervals("availability", &self.availability)
    }
}
