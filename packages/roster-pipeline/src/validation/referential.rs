//! Referential Validator
//!
//! Runs after a record passes its rule table. Checks that need more than the
//! record itself live here: interval ordering, entity consistency, uniqueness
//! against records accepted earlier in the run, foreign keys against parent
//! collections already in the store, and room overlaps.
//!
//! Keys and bookings are reserved only by [`ReferentialValidator::admit`] on
//! success, so a rejected record never blocks a later one.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::entities::{Booking, Entity, EntityKind};
use crate::validation::RuleTable;

/// Id sets of parent collections, as committed by earlier stages
#[derive(Debug, Clone, Default)]
pub struct KnownIds {
    ids: HashMap<EntityKind, BTreeSet<String>>,
}

impl KnownIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: EntityKind, ids: BTreeSet<String>) {
        self.ids.insert(kind, ids);
    }

    pub fn with(mut self, kind: EntityKind, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.insert(kind, ids.into_iter().map(Into::into).collect());
        self
    }

    /// `None` when the parent's ids were never loaded
    pub fn contains(&self, kind: EntityKind, id: &str) -> Option<bool> {
        self.ids.get(&kind).map(|set| set.contains(id))
    }
}

fn clock(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub struct ReferentialValidator<'t, E> {
    rules: &'t RuleTable<E>,
    known: Option<KnownIds>,
    seen: HashMap<&'static str, HashSet<String>>,
    bookings: Vec<Booking>,
}

impl<'t, E: Entity> ReferentialValidator<'t, E> {
    /// `known = None` disables foreign-key checks
    pub fn new(rules: &'t RuleTable<E>, known: Option<KnownIds>) -> Self {
        Self {
            rules,
            known,
            seen: HashMap::new(),
            bookings: Vec::new(),
        }
    }

    /// Violations against the current accepted set; reserves nothing
    pub fn check(&self, record: &E) -> Vec<String> {
        let mut violations = Vec::new();

        for interval in record.intervals().iter().filter(|i| i.is_inverted()) {
            violations.push(format!(
                "{} must be before {}",
                interval.start_field, interval.end_field
            ));
        }

        violations.extend(record.consistency_violations());

        for rule in self.rules.unique_rules() {
            if let Some(key) = rule.unique_key(record) {
                let taken = self.seen.get(rule.field()).is_some_and(|s| s.contains(&key));
                if taken {
                    violations.push(format!(
                        "{} '{}' duplicates an earlier record",
                        rule.field(),
                        key
                    ));
                }
            }
        }

        if let Some(known) = &self.known {
            for reference in record.references() {
                if known.contains(reference.parent, reference.id) == Some(false) {
                    violations.push(format!(
                        "{} '{}' does not match any loaded {}",
                        reference.field, reference.id, reference.parent
                    ));
                }
            }
        }

        if let Some(booking) = record.booking() {
            if let Some(taken) = self.bookings.iter().find(|b| b.conflicts_with(&booking)) {
                violations.push(format!(
                    "room {} is already booked on {} {}-{} by {}",
                    taken.room,
                    taken.day,
                    clock(taken.start),
                    clock(taken.end),
                    taken.record_id
                ));
            }
        }

        violations
    }

    /// Accept `record` and reserve its keys, or return why it was refused
    pub fn admit(&mut self, record: &E) -> Result<(), Vec<String>> {
        let violations = self.check(record);
        if !violations.is_empty() {
            return Err(violations);
        }

        for rule in self.rules.unique_rules() {
            if let Some(key) = rule.unique_key(record) {
                self.seen.entry(rule.field()).or_default().insert(key);
            }
        }
        if let Some(booking) = record.booking() {
            self.bookings.push(booking);
        }
        Ok(())
    }

    pub fn bookings(&self) -> &[Booking] {
        &self.bookings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Course, Instructor, ScheduleSlot};
    use crate::extract::RawRecord;
    use regex::Regex;

    fn ids() -> Regex {
        Regex::new(crate::config::DEFAULT_ID_PATTERN).unwrap()
    }

    fn slot(id: &str, room: &str, day: &str, start: &str, end: &str) -> ScheduleSlot {
        ScheduleSlot::from_raw(&RawRecord::from_pairs(
            2,
            [
                ("id", id),
                ("courseId", "CUR001"),
                ("instructorId", "PRF001"),
                ("day", day),
                ("startTime", start),
                ("endTime", end),
                ("room", room),
                ("startDate", "2024-02-01"),
                ("endDate", "2024-06-30"),
                ("maxCapacity", "30"),
            ],
        ))
    }

    fn instructor(id: &str, email: &str) -> Instructor {
        Instructor::from_raw(&RawRecord::from_pairs(
            2,
            [
                ("id", id),
                ("firstName", "Ana"),
                ("lastName", "Pérez"),
                ("age", "40"),
                ("email", email),
                ("specialty", "Mathematics"),
            ],
        ))
    }

    #[test]
    fn test_overlap_first_accepted_wins() {
        let rules = ScheduleSlot::rules(&ids());
        let mut validator = ReferentialValidator::new(&rules, None);

        validator
            .admit(&slot("HOR001", "A101", "Monday", "08:00", "10:00"))
            .unwrap();
        let err = validator
            .admit(&slot("HOR002", "A101", "lunes", "09:00", "11:00"))
            .unwrap_err();
        assert_eq!(
            err,
            vec!["room A101 is already booked on Monday 08:00-10:00 by HOR001".to_string()]
        );

        // back-to-back and other rooms are fine
        validator
            .admit(&slot("HOR003", "A101", "Monday", "10:00", "12:00"))
            .unwrap();
        validator
            .admit(&slot("HOR004", "B202", "Monday", "09:00", "11:00"))
            .unwrap();
        assert_eq!(validator.bookings().len(), 3);
    }

    #[test]
    fn test_rejected_record_reserves_nothing() {
        let rules = ScheduleSlot::rules(&ids());
        let mut validator = ReferentialValidator::new(&rules, None);

        validator
            .admit(&slot("HOR001", "A101", "Monday", "08:00", "10:00"))
            .unwrap();
        // rejected for overlap; its id must stay free
        assert!(validator
            .admit(&slot("HOR002", "A101", "Monday", "09:00", "11:00"))
            .is_err());
        validator
            .admit(&slot("HOR002", "A101", "Tuesday", "09:00", "11:00"))
            .unwrap();
    }

    #[test]
    fn test_inverted_times_rejected() {
        let rules = ScheduleSlot::rules(&ids());
        let validator = ReferentialValidator::new(&rules, None);
        let violations = validator.check(&slot("HOR001", "A101", "Monday", "10:00", "10:00"));
        assert_eq!(violations, vec!["startTime must be before endTime".to_string()]);
    }

    #[test]
    fn test_duplicate_id_and_email() {
        let rules = Instructor::rules(&ids());
        let mut validator = ReferentialValidator::new(&rules, None);

        validator.admit(&instructor("PRF001", "ana@school.edu")).unwrap();

        let dup_id = validator.check(&instructor("PRF001", "other@school.edu"));
        assert_eq!(dup_id, vec!["id 'PRF001' duplicates an earlier record".to_string()]);

        let dup_email = validator.check(&instructor("PRF002", "ANA@School.edu"));
        assert_eq!(
            dup_email,
            vec!["email 'ana@school.edu' duplicates an earlier record".to_string()]
        );
    }

    #[test]
    fn test_foreign_keys() {
        let rules = ScheduleSlot::rules(&ids());
        let known = KnownIds::new()
            .with(EntityKind::Course, ["CUR001"])
            .with(EntityKind::Instructor, ["PRF002"]);
        let validator = ReferentialValidator::new(&rules, Some(known));

        let violations = validator.check(&slot("HOR001", "A101", "Monday", "08:00", "10:00"));
        assert_eq!(
            violations,
            vec!["instructorId 'PRF001' does not match any loaded instructor".to_string()]
        );
    }

    #[test]
    fn test_foreign_keys_skipped_when_disabled() {
        let rules = Course::rules(&ids());
        let validator = ReferentialValidator::new(&rules, None);
        let course = Course::from_raw(&RawRecord::from_pairs(
            2,
            [
                ("id", "CUR001"),
                ("instructorId", "ZZZ999"),
                ("startDate", "2024-01-01"),
                ("endDate", "2024-06-01"),
            ],
        ));
        assert!(validator.check(&course).is_empty());
    }
}
