use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use super::vocab::{self, GRADE_RANGE, IDENTIFICATION_TYPES};
use super::{Entity, EntityKind, GradeRecord, Interval, Reference};
use crate::extract::RawRecord;
use crate::transform::{self, parse_date, Column, Parsed};
use crate::validation::{FieldRule, RuleTable};

const ID: Column = Column::new("id", &["codigo"]);
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
const COURSE_IDS: Column = Column::new("courseIds", &["cursos"]);
const GRADES: Column = Column::new("grades", &["notas"]);
const OVERALL_AVERAGE: Column = Column::new("overallAverage", &["promedioGeneral"]);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Learner {
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
    pub course_ids: Vec<String>,
    pub grades: Parsed<Vec<GradeRecord>>,
    pub overall_average: Parsed<f64>,
}

impl Entity for Learner {
    const KIND: EntityKind = EntityKind::Learner;

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
        COURSE_IDS,
        GRADES,
        OVERALL_AVERAGE,
    ];

    fn from_raw(raw: &RawRecord) -> Self {
        let grades = match transform::json_list::<GradeRecord>(raw, &GRADES) {
            Parsed::Valid(grades) => Parsed::Valid(grades.into_iter().map(normalize_dates).collect()),
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
            course_ids: transform::id_list(raw, &COURSE_IDS),
            grades,
            overall_average: transform::number(raw, &OVERALL_AVERAGE).or_default(),
        }
    }

    fn rules(ids: &Regex) -> RuleTable<Self> {
        RuleTable::new()
            .with(
                FieldRule::text("id", |l: &Learner| l.id.as_str())
                    .required()
                    .pattern(ids, "id")
                    .unique(),
            )
            .with(
                FieldRule::text("identificationType", |l: &Learner| {
                    l.identification_type.as_str()
                })
                .required()
                .one_of(IDENTIFICATION_TYPES),
            )
            .with(
                FieldRule::text("identificationNumber", |l: &Learner| {
                    l.identification_number.as_str()
                })
                .required()
                .unique(),
            )
            .with(FieldRule::text("firstName", |l: &Learner| l.first_name.as_str()).required())
            .with(FieldRule::text("lastName", |l: &Learner| l.last_name.as_str()).required())
            .with(
                FieldRule::integer("age", |l: &Learner| &l.age)
                    .required()
                    .range(16.0, 100.0),
            )
            .with(
                FieldRule::text("email", |l: &Learner| l.email.as_str())
                    .required()
                    .pattern(&vocab::EMAIL, "email")
                    .unique_ignoring_case(),
            )
            .with(
                FieldRule::date("registrationDate", |l: &Learner| &l.registration_date)
                    .required(),
            )
            .with(FieldRule::list("courseIds", |l: &Learner| l.course_ids.as_slice()).pattern(ids, "id"))
            .with(FieldRule::grades("grades", |l: &Learner| &l.grades))
            .with(
                FieldRule::number("overallAverage", |l: &Learner| &l.overall_average)
                    .range(GRADE_RANGE.0, GRADE_RANGE.1),
            )
    }

    fn record_id(&self) -> &str {
        &self.id
    }

    fn intervals(&self) -> Vec<Interval> {
        let Some(grades) = self.grades.valid() else {
            return Vec::new();
        };
        grades
            .iter()
            .enumerate()
            .map(|(i, g)| {
                let day = |d: &Option<String>| {
                    d.as_deref()
                        .and_then(parse_date)
                        .map(|d| super::day_key(&d))
                };
                Interval::new(
                    format!("grades[{i}].startDate"),
                    format!("grades[{i}].endDate"),
                    day(&g.start_date),
                    day(&g.end_date),
                )
            })
            .collect()
    }

    /// Weighted-grade consistency; the average is reported, never recomputed
    fn consistency_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if let Some(grades) = self.grades.valid() {
            for (i, g) in grades.iter().enumerate() {
                if g.course_id.is_none() || g.weight.is_none() || g.final_grade.is_none() {
                    violations.push(format!(
                        "grades[{i}] must carry courseId, weight and finalGrade"
                    ));
                }
            }
        }
        if let Some(avg) = self.overall_average.valid() {
            let (min, max) = GRADE_RANGE;
            if !(min..=max).contains(avg) {
                violations.push(format!("overallAverage must be between {min} and {max}"));
            }
        }
        violations
    }

    fn references(&self) -> Vec<Reference<'_>> {
        self.course_ids
            .iter()
            .map(|id| Reference {
                parent: EntityKind::Course,
                field: "courseIds",
                id,
            })
            .collect()
    }
}

/// Grade dates persist as `YYYY-MM-DD` when they parse
fn normalize_dates(mut grade: GradeRecord) -> GradeRecord {
    for date in [&mut grade.start_date, &mut grade.end_date] {
        if let Some(parsed) = date.as_deref().and_then(parse_date) {
            *date = Some(parsed.format("%Y-%m-%d").to_string());
        }
    }
    grade
}
