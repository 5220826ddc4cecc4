//! Client-side form validation.
//!
//! Every check here runs before a request is built; failures are reported
//! per field and never reach the network.

use std::fmt;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub const EXPERIENCE_TYPES: [&str; 3] = ["Full Time", "Part Time", "Internship"];

pub const MIN_PASSWORD_LEN: usize = 8;
pub const EARLIEST_START_YEAR: i32 = 1985;
/// How far in the future an expected graduation year may lie.
pub const MAX_YEARS_AHEAD: i32 = 6;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Collected per-field validation failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    #[cfg(test)]
    pub fn has(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        self.errors.extend(other.errors);
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }

    pub fn require(&mut self, field: &'static str, value: &str, message: &str) {
        if value.trim().is_empty() {
            self.add(field, message);
        }
    }

    pub fn email(&mut self, field: &'static str, value: &str) {
        if value.trim().is_empty() {
            self.add(field, "Email is required");
        } else if !is_valid_email(value) {
            self.add(field, "Invalid email address");
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value.trim())
}

pub fn month_index(name: &str) -> Option<usize> {
    MONTH_NAMES.iter().position(|m| m.eq_ignore_ascii_case(name.trim()))
}

pub fn current_year() -> i32 {
    chrono::Local::now().year()
}

pub fn is_valid_date(value: &str) -> bool {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").is_ok()
}

/// Start/end period shared by education and work entries.
pub struct Period<'a> {
    pub start_month: &'a str,
    pub start_year: Option<i32>,
    pub end_month: Option<&'a str>,
    pub end_year: Option<i32>,
}

impl Period<'_> {
    /// Apply the date rules; `max_end_year` caps the end year when set.
    pub fn check(&self, errors: &mut ValidationErrors, max_end_year: Option<i32>, today_year: i32) {
        let start_idx = month_index(self.start_month);
        if self.start_month.trim().is_empty() {
            errors.add("startMonth", "Start Month is required");
        } else if start_idx.is_none() {
            errors.add("startMonth", "Invalid Start Month");
        }

        match self.start_year {
            None => errors.add("startYear", "Start Year is required"),
            Some(y) if y < EARLIEST_START_YEAR => {
                errors.add("startYear", format!("Start year must be {EARLIEST_START_YEAR} or later"))
            }
            Some(y) if y > today_year => errors.add("startYear", "Start Year cannot be in the future"),
            Some(_) => {}
        }

        let end_month = self.end_month.map(str::trim).filter(|m| !m.is_empty());
        let end_idx = end_month.and_then(month_index);
        if end_month.is_some() && end_idx.is_none() {
            errors.add("endMonth", "Invalid End Month");
        }
        if end_month.is_some() && self.end_year.is_none() {
            errors.add("endYear", "End Year is required");
        }
        if let (Some(cap), Some(end)) = (max_end_year, self.end_year) {
            if end > cap {
                errors.add(
                    "endYear",
                    format!("End Year cannot be more than {MAX_YEARS_AHEAD} years in the future"),
                );
            }
        }

        // Ongoing entries leave the end blank and skip the ordering check.
        if let (Some(sy), Some(ey), Some(si), Some(ei)) =
            (self.start_year, self.end_year, start_idx, end_idx)
        {
            if ey < sy || (ey == sy && ei < si) {
                errors.add("endMonth", "End Date must be later than Start Date");
            }
        }
    }
}
