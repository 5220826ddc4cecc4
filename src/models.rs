use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::validate::{self, MIN_PASSWORD_LEN, ValidationErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserType {
    #[serde(rename = "jobSeeker")]
    JobSeeker,
    #[serde(rename = "employer")]
    Employer,
}

impl UserType {
    /// Prefix the backend puts on every profile and form field.
    pub fn prefix(self) -> &'static str {
        match self {
            UserType::JobSeeker => "jobSeeker",
            UserType::Employer => "employer",
        }
    }

    /// Path segment selecting the account's route family.
    pub fn route(self) -> &'static str {
        match self {
            UserType::JobSeeker => "user",
            UserType::Employer => "employer",
        }
    }

    /// `jobSeeker` + `Email` -> `jobSeekerEmail`.
    pub fn field(self, name: &str) -> String {
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => format!("{}{}{}", self.prefix(), first.to_ascii_uppercase(), chars.as_str()),
            None => self.prefix().to_string(),
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jobseeker" | "seeker" | "user" => Ok(UserType::JobSeeker),
            "employer" => Ok(UserType::Employer),
            other => Err(format!("unknown user type '{}' (expected seeker or employer)", other)),
        }
    }
}

/// Authentication state as last reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Session {
    pub authenticated: bool,
    pub user_type: Option<UserType>,
}

impl Session {
    pub fn signed_in(user_type: UserType) -> Self {
        Self {
            authenticated: true,
            user_type: Some(user_type),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

// --- Jobs ---

/// Search filters; empty strings match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    pub keyword: String,
    pub location: String,
}

impl SearchCriteria {
    pub fn new(keyword: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            location: location.into(),
        }
    }
}

impl fmt::Display for SearchCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.keyword.trim(), self.location.trim()) {
            ("", "") => f.write_str("all jobs"),
            (k, "") => write!(f, "'{}'", k),
            ("", l) => write!(f, "jobs in {}", l),
            (k, l) => write!(f, "'{}' in {}", k, l),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobLocation {
    #[serde(rename = "jobCity", default, deserialize_with = "lenient::string")]
    pub city: String,
    #[serde(rename = "jobState", default, deserialize_with = "lenient::string")]
    pub state: String,
    #[serde(rename = "jobAdress", default, deserialize_with = "lenient::string")]
    pub address: String,
    #[serde(rename = "jobZip", default, deserialize_with = "lenient::opt_string")]
    pub zip: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Company {
    #[serde(rename = "companyName", default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(rename = "companyDescription", default, deserialize_with = "lenient::string")]
    pub description: String,
    #[serde(rename = "companyIndustry", default, deserialize_with = "lenient::string")]
    pub industry: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "reqId", default, deserialize_with = "lenient::opt_string")]
    pub req_id: Option<String>,
    #[serde(rename = "jobTitle", default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(rename = "jobCategory", default, deserialize_with = "lenient::opt_string")]
    pub category: Option<String>,
    #[serde(rename = "jobDescription", default, deserialize_with = "lenient::string")]
    pub description: String,
    #[serde(rename = "jobQualifications", default, deserialize_with = "lenient::string")]
    pub qualifications: String,
    #[serde(rename = "jobSkills", default, deserialize_with = "lenient::string")]
    pub skills: String,
    #[serde(rename = "jobSalary", default, deserialize_with = "lenient::opt_string")]
    pub salary: Option<String>,
    #[serde(rename = "employmentType", default, deserialize_with = "lenient::opt_string")]
    pub employment_type: Option<String>,
    #[serde(flatten)]
    pub location: JobLocation,
    #[serde(flatten)]
    pub company: Company,
    #[serde(rename = "noOfopening", default, deserialize_with = "lenient::opt_u32")]
    pub openings: Option<u32>,
    #[serde(rename = "startDate", default, deserialize_with = "lenient::opt_string")]
    pub start_date: Option<String>,
    #[serde(rename = "appDeadline", default, deserialize_with = "lenient::opt_string")]
    pub app_deadline: Option<String>,
    #[serde(rename = "createdAt", default, deserialize_with = "lenient::opt_string")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub applied_status: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub under_review_status: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub rejected_status: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub accepted_status: bool,
}

impl Job {
    /// Furthest application stage the status flags report.
    pub fn application_stage(&self) -> Option<ApplicationStatus> {
        if self.accepted_status {
            Some(ApplicationStatus::Accepted)
        } else if self.rejected_status {
            Some(ApplicationStatus::Rejected)
        } else if self.under_review_status {
            Some(ApplicationStatus::UnderReview)
        } else if self.applied_status {
            Some(ApplicationStatus::Applied)
        } else {
            None
        }
    }

    /// Qualifications are stored as sentences; split them for listing.
    pub fn qualification_list(&self) -> Vec<&str> {
        self.qualifications
            .split(". ")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn place(&self) -> String {
        match (self.location.city.is_empty(), self.location.state.is_empty()) {
            (false, false) => format!("{}, {}", self.location.city, self.location.state),
            (false, true) => self.location.city.clone(),
            (true, false) => self.location.state.clone(),
            (true, true) => String::new(),
        }
    }
}

/// Form payload for posting or editing a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobPosting {
    #[serde(rename = "reqId")]
    pub req_id: String,
    #[serde(rename = "jobTitle")]
    pub title: String,
    #[serde(rename = "jobCategory")]
    pub category: String,
    #[serde(rename = "employmentType")]
    pub employment_type: String,
    #[serde(rename = "noOfopening")]
    pub openings: u32,
    #[serde(rename = "jobAdress")]
    pub address: String,
    #[serde(rename = "jobCity")]
    pub city: String,
    #[serde(rename = "jobState")]
    pub state: String,
    #[serde(rename = "jobZip")]
    pub zip: String,
    #[serde(rename = "jobDescription")]
    pub description: String,
    #[serde(rename = "jobQualifications")]
    pub qualifications: String,
    #[serde(rename = "jobSkills")]
    pub skills: String,
    #[serde(rename = "jobSalary")]
    pub salary: String,
    #[serde(rename = "companyName")]
    pub company_name: String,
    #[serde(rename = "companyDescription")]
    pub company_description: String,
    #[serde(rename = "companyIndustry")]
    pub company_industry: String,
    #[serde(rename = "startDate")]
    pub start_date: String,
    #[serde(rename = "appDeadline")]
    pub app_deadline: String,
}

impl JobPosting {
    /// Pre-fill an edit form from an existing listing.
    pub fn from_job(job: &Job) -> Self {
        Self {
            req_id: job.req_id.clone().unwrap_or_default(),
            title: job.title.clone(),
            category: job.category.clone().unwrap_or_default(),
            employment_type: job.employment_type.clone().unwrap_or_default(),
            openings: job.openings.unwrap_or(1),
            address: job.location.address.clone(),
            city: job.location.city.clone(),
            state: job.location.state.clone(),
            zip: job.location.zip.clone().unwrap_or_default(),
            description: job.description.clone(),
            qualifications: job.qualifications.clone(),
            skills: job.skills.clone(),
            salary: job.salary.clone().unwrap_or_default(),
            company_name: job.company.name.clone(),
            company_description: job.company.description.clone(),
            company_industry: job.company.industry.clone(),
            start_date: job.start_date.clone().unwrap_or_default(),
            app_deadline: job.app_deadline.clone().unwrap_or_default(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("reqId", &self.req_id, "Requisition ID is required");
        errors.require("jobTitle", &self.title, "Job Title is required");
        errors.require("jobCategory", &self.category, "Job Category is required");
        errors.require("employmentType", &self.employment_type, "Employment Type is required");
        if self.openings == 0 {
            errors.add("noOfopening", "Number of Openings is required");
        }
        errors.require("jobAdress", &self.address, "Job Address is required");
        errors.require("jobCity", &self.city, "Job City is required");
        errors.require("jobState", &self.state, "Job State is required");
        errors.require("jobZip", &self.zip, "Job Zip is required");
        errors.require("jobDescription", &self.description, "Job Description is required");
        errors.require("jobQualifications", &self.qualifications, "Job Qualifications are required");
        errors.require("jobSkills", &self.skills, "Job Skills are required");
        errors.require("jobSalary", &self.salary, "Job Salary is required");
        errors.require("companyName", &self.company_name, "Company Name is required");
        errors.require("companyDescription", &self.company_description, "Company Description is required");
        errors.require("companyIndustry", &self.company_industry, "Industry is required");
        for (field, value, label) in [
            ("startDate", &self.start_date, "Start Date"),
            ("appDeadline", &self.app_deadline, "Application Deadline"),
        ] {
            if value.trim().is_empty() {
                errors.add(field, format!("{} is required", label));
            } else if !validate::is_valid_date(value) {
                errors.add(field, format!("{} must be YYYY-MM-DD", label));
            }
        }
        errors.into_result()
    }
}

// --- Applications ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Applied,
    UnderReview,
    Rejected,
    Accepted,
}

impl ApplicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::Applied => "applied",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Accepted => "accepted",
        }
    }

    pub fn label(self) -> String {
        self.as_str().replace('_', " ").to_uppercase()
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "applied" => Ok(ApplicationStatus::Applied),
            "under_review" | "review" => Ok(ApplicationStatus::UnderReview),
            "rejected" | "reject" => Ok(ApplicationStatus::Rejected),
            "accepted" | "accept" => Ok(ApplicationStatus::Accepted),
            other => Err(format!(
                "unknown status '{}' (expected under_review, rejected or accepted)",
                other
            )),
        }
    }
}

/// A job seeker's application as the employer sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Applicant {
    pub application_id: String,
    pub user_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub phone: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub location: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub applied_on: Option<String>,
    pub status: ApplicationStatus,
}

impl Applicant {
    /// Relative "applied N ago" text; the backend sends naive UTC timestamps.
    pub fn applied_ago(&self) -> Option<String> {
        let raw = self.applied_on.as_deref()?;
        let at = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())?
            .and_utc();
        let elapsed = Utc::now().signed_duration_since(at);
        let text = if elapsed.num_days() > 0 {
            format!("{} day(s) ago", elapsed.num_days())
        } else if elapsed.num_hours() > 0 {
            format!("{} hour(s) ago", elapsed.num_hours())
        } else if elapsed.num_minutes() > 0 {
            format!("{} minute(s) ago", elapsed.num_minutes())
        } else {
            "just now".to_string()
        };
        Some(text)
    }
}

// --- Account forms ---

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.email("email", &self.email);
        errors.require("password", &self.password, "Password is required");
        errors.into_result()
    }

    pub fn to_wire(&self, user_type: UserType) -> Value {
        let mut body = Map::new();
        body.insert(user_type.field("email"), json!(self.email.trim()));
        body.insert(user_type.field("password"), json!(self.password));
        Value::Object(body)
    }
}

#[derive(Debug, Clone)]
pub struct SignUp {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignUp {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("firstName", &self.first_name, "First name is required");
        errors.require("lastName", &self.last_name, "Last name is required");
        errors.email("email", &self.email);
        let password = self.password.trim();
        if password.is_empty() {
            errors.add("password", "Password is required");
        } else if password.len() < MIN_PASSWORD_LEN {
            errors.add("password", format!("Password must be at least {MIN_PASSWORD_LEN} characters"));
        }
        if self.confirm_password.trim().is_empty() {
            errors.add("confirmPassword", "Confirm password is required");
        } else if self.confirm_password != self.password {
            errors.add("confirmPassword", "Passwords must match");
        }
        errors.into_result()
    }

    /// The confirmation field never leaves the client.
    pub fn to_wire(&self, user_type: UserType) -> Value {
        let mut body = Map::new();
        body.insert(user_type.field("firstName"), json!(self.first_name.trim()));
        body.insert(user_type.field("lastName"), json!(self.last_name.trim()));
        body.insert(user_type.field("email"), json!(self.email.trim()));
        body.insert(user_type.field("password"), json!(self.password));
        Value::Object(body)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PasswordChange {
    pub email: String,
    pub old_password: String,
    pub new_password: String,
}

impl PasswordChange {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("oldPassword", &self.old_password, "Current password is required");
        if self.new_password.trim().len() < MIN_PASSWORD_LEN {
            errors.add(
                "newPassword",
                format!("New password must be at least {MIN_PASSWORD_LEN} characters"),
            );
        }
        errors.into_result()
    }

    pub fn to_wire(&self, user_type: UserType) -> Value {
        let mut body = Map::new();
        body.insert(user_type.field("email"), json!(self.email));
        body.insert(user_type.field("oldPassword"), json!(self.old_password));
        body.insert(user_type.field("newPassword"), json!(self.new_password));
        Value::Object(body)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub message: Option<String>,
}

/// Deserializers for fields that forms submit as either strings or numbers.
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(opt_string(d)?.unwrap_or_default())
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        })
    }

    pub fn opt_i32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i32>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Number(n)) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn opt_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        Ok(opt_i32(d)?.and_then(|v| u32::try_from(v).ok()))
    }

    pub fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Bool(b)) => b,
            Some(Value::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        })
    }
}
