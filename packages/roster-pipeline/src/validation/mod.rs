//! Validation Engine
//!
//! A [`RuleTable`] is a list of [`FieldRule`]s, each pairing a field name with
//! an accessor into the typed candidate and the constraints that apply to it.
//! [`RuleTable::check`] interprets any table with four ordered passes:
//!
//! 1. required-field presence
//! 2. type and numeric range
//! 3. enum membership and pattern
//! 4. structure of nested lists (time slots, grade records)
//!
//! The result is an ordered list of human-readable violations; an empty list
//! means the record passes. Uniqueness flags are declared here but checked by
//! the [`referential`] pass, which sees every accepted record of the run.

pub mod referential;

use chrono::NaiveDate;
use regex::Regex;

use crate::entities::vocab::{self, GRADE_RANGE, WEIGHT_RANGE};
use crate::entities::{GradeRecord, TimeSlot};
use crate::transform::{parse_date, Parsed};

pub use referential::{KnownIds, ReferentialValidator};

/// Typed view of one field
#[derive(Debug, Clone, Copy)]
pub enum FieldRef<'a> {
    Text(&'a str),
    Integer(&'a Parsed<i64>),
    Number(&'a Parsed<f64>),
    Date(&'a Parsed<NaiveDate>),
    List(&'a [String]),
    Slots(&'a Parsed<Vec<TimeSlot>>),
    Grades(&'a Parsed<Vec<GradeRecord>>),
}

impl FieldRef<'_> {
    fn is_present(&self) -> bool {
        match self {
            FieldRef::Text(v) => !v.is_empty(),
            FieldRef::Integer(p) => !p.is_absent(),
            FieldRef::Number(p) => !p.is_absent(),
            FieldRef::Date(p) => !p.is_absent(),
            FieldRef::List(items) => !items.is_empty(),
            FieldRef::Slots(p) => list_present(p),
            FieldRef::Grades(p) => list_present(p),
        }
    }
}

fn list_present<T>(value: &Parsed<Vec<T>>) -> bool {
    match value {
        Parsed::Absent => false,
        Parsed::Invalid(_) => true,
        Parsed::Valid(items) => !items.is_empty(),
    }
}

enum Accessor<E> {
    Text(fn(&E) -> &str),
    Integer(fn(&E) -> &Parsed<i64>),
    Number(fn(&E) -> &Parsed<f64>),
    Date(fn(&E) -> &Parsed<NaiveDate>),
    List(fn(&E) -> &[String]),
    Slots(fn(&E) -> &Parsed<Vec<TimeSlot>>),
    Grades(fn(&E) -> &Parsed<Vec<GradeRecord>>),
}

impl<E> Accessor<E> {
    fn get<'e>(&self, record: &'e E) -> FieldRef<'e> {
        match self {
            Accessor::Text(f) => FieldRef::Text(f(record)),
            Accessor::Integer(f) => FieldRef::Integer(f(record)),
            Accessor::Number(f) => FieldRef::Number(f(record)),
            Accessor::Date(f) => FieldRef::Date(f(record)),
            Accessor::List(f) => FieldRef::List(f(record)),
            Accessor::Slots(f) => FieldRef::Slots(f(record)),
            Accessor::Grades(f) => FieldRef::Grades(f(record)),
        }
    }
}

/// How two values of a unique field are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uniqueness {
    Exact,
    CaseInsensitive,
}

impl Uniqueness {
    pub fn key(&self, value: &str) -> String {
        match self {
            Uniqueness::Exact => value.to_string(),
            Uniqueness::CaseInsensitive => value.to_lowercase(),
        }
    }
}

#[derive(Debug, Clone)]
struct Pattern {
    regex: Regex,
    format: &'static str,
}

/// Constraints on one field of `E`
pub struct FieldRule<E> {
    field: &'static str,
    access: Accessor<E>,
    required: bool,
    min: Option<f64>,
    max: Option<f64>,
    one_of: Option<&'static [&'static str]>,
    pattern: Option<Pattern>,
    unique: Option<Uniqueness>,
}

impl<E> FieldRule<E> {
    fn new(field: &'static str, access: Accessor<E>) -> Self {
        Self {
            field,
            access,
            required: false,
            min: None,
            max: None,
            one_of: None,
            pattern: None,
            unique: None,
        }
    }

    pub fn text(field: &'static str, access: fn(&E) -> &str) -> Self {
        Self::new(field, Accessor::Text(access))
    }

    pub fn integer(field: &'static str, access: fn(&E) -> &Parsed<i64>) -> Self {
        Self::new(field, Accessor::Integer(access))
    }

    pub fn number(field: &'static str, access: fn(&E) -> &Parsed<f64>) -> Self {
        Self::new(field, Accessor::Number(access))
    }

    pub fn date(field: &'static str, access: fn(&E) -> &Parsed<NaiveDate>) -> Self {
        Self::new(field, Accessor::Date(access))
    }

    pub fn list(field: &'static str, access: fn(&E) -> &[String]) -> Self {
        Self::new(field, Accessor::List(access))
    }

    pub fn slots(field: &'static str, access: fn(&E) -> &Parsed<Vec<TimeSlot>>) -> Self {
        Self::new(field, Accessor::Slots(access))
    }

    pub fn grades(field: &'static str, access: fn(&E) -> &Parsed<Vec<GradeRecord>>) -> Self {
        Self::new(field, Accessor::Grades(access))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn at_least(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn one_of(mut self, values: &'static [&'static str]) -> Self {
        self.one_of = Some(values);
        self
    }

    /// Text must match `regex`; for lists, every entry must
    pub fn pattern(mut self, regex: &Regex, format: &'static str) -> Self {
        self.pattern = Some(Pattern {
            regex: regex.clone(),
            format,
        });
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = Some(Uniqueness::Exact);
        self
    }

    pub fn unique_ignoring_case(mut self) -> Self {
        self.unique = Some(Uniqueness::CaseInsensitive);
        self
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Uniqueness key of this field on `record`; `None` when not unique or empty
    pub fn unique_key(&self, record: &E) -> Option<String> {
        let mode = self.unique?;
        match self.access.get(record) {
            FieldRef::Text(v) if !v.is_empty() => Some(mode.key(v)),
            _ => None,
        }
    }

    fn check_required(&self, value: &FieldRef<'_>, out: &mut Vec<String>) {
        if self.required && !value.is_present() {
            out.push(format!("{} is required", self.field));
        }
    }

    fn check_type_and_range(&self, value: &FieldRef<'_>, out: &mut Vec<String>) {
        let field = self.field;
        let number = match value {
            FieldRef::Integer(Parsed::Invalid(raw)) => {
                out.push(format!("{field} must be an integer (got '{raw}')"));
                return;
            }
            FieldRef::Number(Parsed::Invalid(raw)) => {
                out.push(format!("{field} must be a number (got '{raw}')"));
                return;
            }
            FieldRef::Date(Parsed::Invalid(raw)) => {
                out.push(format!("{field} must be a date in YYYY-MM-DD format (got '{raw}')"));
                return;
            }
            FieldRef::Slots(Parsed::Invalid(reason)) | FieldRef::Grades(Parsed::Invalid(reason)) => {
                out.push(format!("{field} is not a valid JSON array: {reason}"));
                return;
            }
            FieldRef::Integer(Parsed::Valid(n)) => *n as f64,
            FieldRef::Number(Parsed::Valid(n)) => *n,
            _ => return,
        };

        if let Some(min) = self.min {
            if number < min {
                out.push(format!("{field} must be at least {min} (got {number})"));
            }
        }
        if let Some(max) = self.max {
            if number > max {
                out.push(format!("{field} must be at most {max} (got {number})"));
            }
        }
    }

    fn check_enum_and_pattern(&self, value: &FieldRef<'_>, out: &mut Vec<String>) {
        let field = self.field;
        match value {
            FieldRef::Text(v) if !v.is_empty() => {
                if let Some(allowed) = self.one_of {
                    if !allowed.contains(v) {
                        out.push(format!(
                            "{field} must be one of: {} (got '{v}')",
                            allowed.join(", ")
                        ));
                    }
                }
                if let Some(p) = &self.pattern {
                    if !p.regex.is_match(v) {
                        out.push(format!("{field} '{v}' does not match the {} format", p.format));
                    }
                }
            }
            FieldRef::List(items) => {
                if let Some(p) = &self.pattern {
                    for item in items.iter().filter(|i| !p.regex.is_match(i)) {
                        out.push(format!(
                            "{field} entry '{item}' does not match the {} format",
                            p.format
                        ));
                    }
                }
            }
            _ => {}
        }
    }

    fn check_structure(&self, value: &FieldRef<'_>, out: &mut Vec<String>) {
        match value {
            FieldRef::Slots(Parsed::Valid(slots)) => check_slots(self.field, slots, out),
            FieldRef::Grades(Parsed::Valid(grades)) => check_grades(self.field, grades, out),
            _ => {}
        }
    }
}

fn check_slots(field: &str, slots: &[TimeSlot], out: &mut Vec<String>) {
    for (i, slot) in slots.iter().enumerate() {
        if !slot.is_complete() {
            out.push(format!("{field}[{i}] must have day, startTime and endTime"));
            return;
        }
        if let Some(day) = slot.day.as_deref().filter(|d| !vocab::DAYS.contains(d)) {
            out.push(format!(
                "{field}[{i}].day must be one of: {} (got '{day}')",
                vocab::DAYS.join(", ")
            ));
        }
        for (key, time) in [("startTime", &slot.start_time), ("endTime", &slot.end_time)] {
            if let Some(t) = time.as_deref().filter(|t| vocab::clock_minutes(t).is_none()) {
                out.push(format!("{field}[{i}].{key} '{t}' does not match the HH:MM format"));
            }
        }
    }
}

fn check_grades(field: &str, grades: &[GradeRecord], out: &mut Vec<String>) {
    for (i, grade) in grades.iter().enumerate() {
        if !grade.is_complete() {
            out.push(format!(
                "{field}[{i}] must have courseId, courseName, startDate, endDate, weight and finalGrade"
            ));
            return;
        }
        let checks = [
            ("weight", grade.weight, WEIGHT_RANGE),
            ("finalGrade", grade.final_grade, GRADE_RANGE),
        ];
        for (key, value, (min, max)) in checks {
            if let Some(v) = value.filter(|v| *v < min || *v > max) {
                out.push(format!("{field}[{i}].{key} must be between {min} and {max} (got {v})"));
            }
        }
        for (key, date) in [("startDate", &grade.start_date), ("endDate", &grade.end_date)] {
            if let Some(d) = date.as_deref().filter(|d| parse_date(d).is_none()) {
                out.push(format!("{field}[{i}].{key} must be a date in YYYY-MM-DD format (got '{d}')"));
            }
        }
    }
}

/// Declarative rules for one entity shape
pub struct RuleTable<E> {
    rules: Vec<FieldRule<E>>,
}

impl<E> Default for RuleTable<E> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<E> RuleTable<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, rule: FieldRule<E>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[FieldRule<E>] {
        &self.rules
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().filter(|r| r.required).map(|r| r.field)
    }

    pub fn unique_rules(&self) -> impl Iterator<Item = &FieldRule<E>> + '_ {
        self.rules.iter().filter(|r| r.unique.is_some())
    }

    /// All violations for `record`, in pass order then table order
    pub fn check(&self, record: &E) -> Vec<String> {
        let values: Vec<FieldRef<'_>> = self.rules.iter().map(|r| r.access.get(record)).collect();
        let mut violations = Vec::new();

        for (rule, value) in self.rules.iter().zip(&values) {
            rule.check_required(value, &mut violations);
        }
        for (rule, value) in self.rules.iter().zip(&values) {
            rule.check_type_and_range(value, &mut violations);
        }
        for (rule, value) in self.rules.iter().zip(&values) {
            rule.check_enum_and_pattern(value, &mut violations);
        }
        for (rule, value) in self.rules.iter().zip(&values) {
            rule.check_structure(value, &mut violations);
        }
        violations
    }
}
