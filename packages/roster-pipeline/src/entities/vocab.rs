//! Closed vocabularies, shared formats and their canonical spellings

use once_cell::sync::Lazy;
use regex::Regex;

pub const DAYS: &[&str] = &[
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];
pub const LEVELS: &[&str] = &["basic", "intermediate", "advanced"];
pub const STATUSES: &[&str] = &["active", "inactive", "completed", "cancelled"];
pub const IDENTIFICATION_TYPES: &[&str] = &["CC", "TI", "CE"];

pub const WEIGHT_RANGE: (f64, f64) = (0.0, 1.0);
pub const GRADE_RANGE: (f64, f64) = (0.0, 10.0);

pub static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));
pub static CLOCK_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01]?[0-9]|2[0-3]):[0-5][0-9]$").expect("valid time regex"));
pub static ROOM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][0-9]{3}$").expect("valid room regex"));

pub fn canonical_day(value: &str) -> Option<&'static str> {
    let day = match value.trim().to_lowercase().as_str() {
        "monday" | "lunes" => "Monday",
        "tuesday" | "martes" => "Tuesday",
        "wednesday" | "miercoles" | "miércoles" => "Wednesday",
        "thursday" | "jueves" => "Thursday",
        "friday" | "viernes" => "Friday",
        "saturday" | "sabado" | "sábado" => "Saturday",
        "sunday" | "domingo" => "Sunday",
        _ => return None,
    };
    Some(day)
}

pub fn canonical_level(value: &str) -> Option<&'static str> {
    let level = match value.trim().to_lowercase().as_str() {
        "basic" | "basico" | "básico" => "basic",
        "intermediate" | "intermedio" => "intermediate",
        "advanced" | "avanzado" => "advanced",
        _ => return None,
    };
    Some(level)
}

pub fn canonical_status(value: &str) -> Option<&'static str> {
    let status = match value.trim().to_lowercase().as_str() {
        "active" | "activo" => "active",
        "inactive" | "inactivo" => "inactive",
        "completed" | "completado" | "finalizado" => "completed",
        "cancelled" | "canceled" | "cancelado" => "cancelled",
        _ => return None,
    };
    Some(status)
}

pub fn canonical_identification_type(value: &str) -> Option<&'static str> {
    let upper = value.trim().to_ascii_uppercase();
    IDENTIFICATION_TYPES
        .iter()
        .find(|t| **t == upper)
        .copied()
}

/// `H:MM` / `HH:MM` as minutes after midnight
pub fn clock_minutes(value: &str) -> Option<u16> {
    let value = value.trim();
    if !CLOCK_TIME.is_match(value) {
        return None;
    }
    let (hours, minutes) = value.split_once(':')?;
    let hours: u16 = hours.parse().ok()?;
    let minutes: u16 = minutes.parse().ok()?;
    Some(hours * 60 + minutes)
}
