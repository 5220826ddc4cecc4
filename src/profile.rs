//! Profile documents for both account kinds.
//!
//! The backend keys every profile field with the account's prefix
//! (`jobSeekerFirstName`, `employerEduMajor`, ...). In Rust the two shapes
//! are variants of [`Profile`] sharing a [`Person`]; the prefixes are added
//! and removed only in [`Profile::to_wire`] and [`Profile::from_wire`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::{UserType, lenient};
use crate::validate::{self, EXPERIENCE_TYPES, MAX_YEARS_AHEAD, Period, ValidationErrors};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Education {
    #[serde(rename = "educationId", default)]
    pub id: String,
    #[serde(rename = "eduSchoolName", default, deserialize_with = "lenient::string")]
    pub school_name: String,
    #[serde(rename = "eduDegreeType", default, deserialize_with = "lenient::string")]
    pub degree_type: String,
    #[serde(rename = "eduMajor", default, deserialize_with = "lenient::string")]
    pub major: String,
    #[serde(rename = "eduStartMonth", default, deserialize_with = "lenient::string")]
    pub start_month: String,
    #[serde(rename = "eduStartYear", default, deserialize_with = "lenient::opt_i32")]
    pub start_year: Option<i32>,
    #[serde(rename = "eduEndMonth", default, deserialize_with = "lenient::opt_string")]
    pub end_month: Option<String>,
    #[serde(rename = "eduEndYear", default, deserialize_with = "lenient::opt_i32")]
    pub end_year: Option<i32>,
    #[serde(rename = "eduGPA", default, deserialize_with = "lenient::opt_f64")]
    pub gpa: Option<f64>,
}

impl Education {
    /// New entry with a fresh client-side identifier.
    pub fn new(school_name: &str, degree_type: &str, major: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            school_name: school_name.to_string(),
            degree_type: degree_type.to_string(),
            major: major.to_string(),
            ..Default::default()
        }
    }

    pub fn validate(&self, today_year: i32) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("eduSchoolName", &self.school_name, "School Name is required");
        errors.require("eduDegreeType", &self.degree_type, "Degree Type is required");
        errors.require("eduMajor", &self.major, "Major is required");
        Period {
            start_month: &self.start_month,
            start_year: self.start_year,
            end_month: self.end_month.as_deref(),
            end_year: self.end_year,
        }
        .check(&mut errors, Some(today_year + MAX_YEARS_AHEAD), today_year);
        if let Some(gpa) = self.gpa {
            if !(0.0..=4.0).contains(&gpa) {
                errors.add("eduGPA", "GPA must be between 0.0 and 4.0");
            }
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkExperience {
    #[serde(rename = "workExId", default)]
    pub id: String,
    #[serde(rename = "workExCompany", default, deserialize_with = "lenient::string")]
    pub company: String,
    #[serde(rename = "workExPosition", default, deserialize_with = "lenient::string")]
    pub position: String,
    #[serde(rename = "workExLocation", default, deserialize_with = "lenient::string")]
    pub location: String,
    #[serde(rename = "workExType", default, deserialize_with = "lenient::string")]
    pub kind: String,
    #[serde(rename = "workExStartMonth", default, deserialize_with = "lenient::string")]
    pub start_month: String,
    #[serde(rename = "workExStartYear", default, deserialize_with = "lenient::opt_i32")]
    pub start_year: Option<i32>,
    #[serde(rename = "workExEndMonth", default, deserialize_with = "lenient::opt_string")]
    pub end_month: Option<String>,
    #[serde(rename = "workExEndYear", default, deserialize_with = "lenient::opt_i32")]
    pub end_year: Option<i32>,
    #[serde(rename = "workExDescription", default, deserialize_with = "lenient::string")]
    pub description: String,
}

impl WorkExperience {
    pub fn new(company: &str, position: &str, location: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            company: company.to_string(),
            position: position.to_string(),
            location: location.to_string(),
            ..Default::default()
        }
    }

    pub fn validate(&self, today_year: i32) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("workExPosition", &self.position, "Position Title is required");
        errors.require("workExCompany", &self.company, "Company is required");
        errors.require("workExLocation", &self.location, "Location is required");
        if self.kind.trim().is_empty() {
            errors.add("workExType", "Experience Type is required");
        } else if !EXPERIENCE_TYPES.iter().any(|t| t.eq_ignore_ascii_case(self.kind.trim())) {
            errors.add("workExType", "Invalid Experience Type");
        }
        Period {
            start_month: &self.start_month,
            start_year: self.start_year,
            end_month: self.end_month.as_deref(),
            end_year: self.end_year,
        }
        .check(&mut errors, None, today_year);
        errors.into_result()
    }
}

/// Fields both account kinds carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    #[serde(default, deserialize_with = "lenient::string")]
    pub first_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub last_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub role: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub phone_number: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub location: String,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub work_experience: Vec<WorkExperience>,
}

impl Person {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Insert the entry, or replace the one with the same id.
    pub fn upsert_education(&mut self, entry: Education) {
        match self.education.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => self.education.push(entry),
        }
    }

    pub fn remove_education(&mut self, id: &str) -> bool {
        let before = self.education.len();
        self.education.retain(|e| e.id != id);
        self.education.len() != before
    }

    pub fn upsert_work_experience(&mut self, entry: WorkExperience) {
        match self.work_experience.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => self.work_experience.push(entry),
        }
    }

    pub fn remove_work_experience(&mut self, id: &str) -> bool {
        let before = self.work_experience.len();
        self.work_experience.retain(|e| e.id != id);
        self.work_experience.len() != before
    }

    /// Personal-information card rules.
    pub fn validate_personal(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("firstName", &self.first_name, "First Name is required");
        errors.require("lastName", &self.last_name, "Last Name is required");
        errors.require("role", &self.role, "Role is required");
        if !self.email.trim().is_empty() && !validate::is_valid_email(&self.email) {
            errors.add("email", "Invalid email address");
        }
        errors.require("phoneNumber", &self.phone_number, "Phone Number is required");
        errors.require("location", &self.location, "Location is required");
        errors.into_result()
    }

    /// Rules for every education and work entry in the document.
    pub fn validate_entries(&self, today_year: i32) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        for entry in &self.education {
            if let Err(e) = entry.validate(today_year) {
                errors.merge(e);
            }
        }
        for entry in &self.work_experience {
            if let Err(e) = entry.validate(today_year) {
                errors.merge(e);
            }
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSeekerProfile {
    #[serde(flatten)]
    pub person: Person,
    #[serde(default)]
    pub saved_jobs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployerProfile {
    #[serde(flatten)]
    pub person: Person,
    #[serde(default)]
    pub posted_jobs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Profile {
    JobSeeker(JobSeekerProfile),
    Employer(EmployerProfile),
}

impl Profile {
    pub fn user_type(&self) -> UserType {
        match self {
            Profile::JobSeeker(_) => UserType::JobSeeker,
            Profile::Employer(_) => UserType::Employer,
        }
    }

    pub fn person(&self) -> &Person {
        match self {
            Profile::JobSeeker(p) => &p.person,
            Profile::Employer(p) => &p.person,
        }
    }

    pub fn person_mut(&mut self) -> &mut Person {
        match self {
            Profile::JobSeeker(p) => &mut p.person,
            Profile::Employer(p) => &mut p.person,
        }
    }

    /// Saved job ids; employers have none.
    pub fn saved_jobs(&self) -> &[String] {
        match self {
            Profile::JobSeeker(p) => &p.saved_jobs,
            Profile::Employer(_) => &[],
        }
    }

    /// Copy of this document with its saved-job list replaced.
    pub fn with_saved_jobs(&self, ids: Vec<String>) -> Profile {
        let mut next = self.clone();
        if let Profile::JobSeeker(p) = &mut next {
            p.saved_jobs = ids;
        }
        next
    }

    pub fn from_wire(user_type: UserType, value: Value) -> Result<Self, serde_json::Error> {
        let plain = strip_prefix(value, user_type.prefix());
        Ok(match user_type {
            UserType::JobSeeker => Profile::JobSeeker(serde_json::from_value(plain)?),
            UserType::Employer => Profile::Employer(serde_json::from_value(plain)?),
        })
    }

    pub fn to_wire(&self) -> Result<Value, serde_json::Error> {
        let plain = match self {
            Profile::JobSeeker(p) => serde_json::to_value(p)?,
            Profile::Employer(p) => serde_json::to_value(p)?,
        };
        Ok(add_prefix(plain, self.user_type().prefix()))
    }
}

/// Rewrites object keys, recursing into arrays of objects. Keys starting with
/// `_` are backend identifiers and pass through untouched.
fn rewrite_keys(value: Value, rename: &dyn Fn(&str) -> Option<String>) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, inner) in map {
                let key = if key.starts_with('_') {
                    key
                } else {
                    rename(&key).unwrap_or(key)
                };
                out.insert(key, rewrite_keys(inner, rename));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(|v| rewrite_keys(v, rename)).collect()),
        other => other,
    }
}

fn add_prefix(value: Value, prefix: &str) -> Value {
    rewrite_keys(value, &|key| {
        let mut chars = key.chars();
        chars
            .next()
            .map(|first| format!("{}{}{}", prefix, first.to_ascii_uppercase(), chars.as_str()))
    })
}

fn strip_prefix(value: Value, prefix: &str) -> Value {
    rewrite_keys(value, &|key| {
        let rest = key.strip_prefix(prefix)?;
        let mut chars = rest.chars();
        let first = chars.next().filter(|c| c.is_ascii_uppercase())?;
        Some(format!("{}{}", first.to_ascii_lowercase(), chars.as_str()))
    })
}
