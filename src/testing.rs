//! In-memory backend for controller tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::oneshot;

use crate::error::{BoardError, BoardResult};
use crate::gateway::Backend;
use crate::models::{
    Applicant, ApplicationStatus, Company, Credentials, Job, JobLocation, JobPosting, PasswordChange,
    Registration, SearchCriteria, Session, SignUp, UserType,
};
use crate::profile::Profile;

#[derive(Default)]
pub struct FakeState {
    pub session: Session,
    /// (user type, email, password)
    pub accounts: Vec<(UserType, String, String)>,
    pub profiles: HashMap<UserType, Profile>,
    pub applicant_profiles: HashMap<String, Profile>,
    pub catalogue: Vec<Job>,
    pub applied: Vec<String>,
    pub roster: Vec<Job>,
    pub applicants: HashMap<String, Vec<Applicant>>,
    /// Whether `post_job` echoes the created job.
    pub echo_posted: bool,
    /// Operation names that fail with a 503.
    pub failing: HashSet<&'static str>,
    /// Every operation in call order.
    pub calls: Vec<&'static str>,
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
    search_gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn fail(&self, op: &'static str) {
        self.state().failing.insert(op);
    }

    pub fn recover(&self, op: &'static str) {
        self.state().failing.remove(op);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.state().calls.iter().filter(|c| **c == op).count()
    }

    /// Hold the next search for `keyword` until the returned sender fires.
    pub fn hold_search(&self, keyword: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.search_gates.lock().unwrap().insert(keyword.to_string(), rx);
        tx
    }

    /// True while a held search has not started waiting yet.
    pub fn gate_armed(&self, keyword: &str) -> bool {
        self.search_gates.lock().unwrap().contains_key(keyword)
    }

    fn enter(&self, op: &'static str) -> BoardResult<MutexGuard<'_, FakeState>> {
        let mut state = self.state();
        state.calls.push(op);
        if state.failing.contains(op) {
            return Err(BoardError::from_status(503, format!("{} unavailable", op)));
        }
        Ok(state)
    }
}

pub fn job(id: &str, title: &str) -> Job {
    Job {
        id: id.to_string(),
        title: title.to_string(),
        description: format!("{} description", title),
        location: JobLocation {
            city: "Brooklyn".into(),
            state: "NY".into(),
            ..Default::default()
        },
        company: Company {
            name: "Diner Co".into(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// `count` jobs titled "<title> N" with ids "<prefix>N".
pub fn jobs(prefix: &str, title: &str, count: usize) -> Vec<Job> {
    (1..=count)
        .map(|n| job(&format!("{}{}", prefix, n), &format!("{} {}", title, n)))
        .collect()
}

pub fn seeker_profile(saved: &[&str]) -> Profile {
    Profile::from_wire(
        UserType::JobSeeker,
        json!({
            "jobSeekerFirstName": "Ada",
            "jobSeekerLastName": "Lovelace",
            "jobSeekerRole": "Cook",
            "jobSeekerEmail": "ada@example.com",
            "jobSeekerPhoneNumber": "555-0100",
            "jobSeekerLocation": "Brooklyn",
            "jobSeekerSavedJobs": saved,
        }),
    )
    .unwrap()
}

pub fn employer_profile() -> Profile {
    Profile::from_wire(
        UserType::Employer,
        json!({
            "employerFirstName": "Grace",
            "employerLastName": "Hopper",
            "employerEmail": "grace@example.com",
        }),
    )
    .unwrap()
}

pub fn applicant(application_id: &str, user_id: &str) -> Applicant {
    Applicant {
        application_id: application_id.to_string(),
        user_id: user_id.to_string(),
        name: "Ada Lovelace".into(),
        email: "ada@example.com".into(),
        phone: "555-0100".into(),
        location: "Brooklyn".into(),
        applied_on: None,
        status: ApplicationStatus::Applied,
    }
}

/// Backend with one account of each kind, a catalogue and a roster.
pub fn seeded() -> Arc<FakeBackend> {
    let backend = FakeBackend::new();
    {
        let mut s = backend.state();
        s.accounts.push((UserType::JobSeeker, "ada@example.com".into(), "hunter22".into()));
        s.accounts.push((UserType::Employer, "grace@example.com".into(), "cobol1959".into()));
        s.profiles.insert(UserType::JobSeeker, seeker_profile(&[]));
        s.profiles.insert(UserType::Employer, employer_profile());
        s.catalogue = jobs("c", "Chef", 8);
        s.roster = jobs("r", "Line Cook", 3);
        s.echo_posted = true;
    }
    backend
}

pub fn seeker_credentials() -> Credentials {
    Credentials {
        email: "ada@example.com".into(),
        password: "hunter22".into(),
    }
}

pub fn employer_credentials() -> Credentials {
    Credentials {
        email: "grace@example.com".into(),
        password: "cobol1959".into(),
    }
}

fn matches(job: &Job, criteria: &SearchCriteria) -> bool {
    let keyword = criteria.keyword.trim().to_lowercase();
    let location = criteria.location.trim().to_lowercase();
    (keyword.is_empty() || job.title.to_lowercase().contains(&keyword))
        && (location.is_empty() || job.place().to_lowercase().contains(&location))
}

fn job_from_posting(id: String, posting: &JobPosting) -> Job {
    Job {
        id,
        req_id: Some(posting.req_id.clone()),
        title: posting.title.clone(),
        description: posting.description.clone(),
        openings: Some(posting.openings),
        location: JobLocation {
            city: posting.city.clone(),
            state: posting.state.clone(),
            address: posting.address.clone(),
            zip: Some(posting.zip.clone()),
        },
        ..Default::default()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn current_user(&self) -> BoardResult<Session> {
        Ok(self.enter("current_user")?.session)
    }

    async fn login(&self, user_type: UserType, credentials: &Credentials) -> BoardResult<Session> {
        let mut state = self.enter("login")?;
        let known = state
            .accounts
            .iter()
            .any(|(t, e, p)| *t == user_type && *e == credentials.email && *p == credentials.password);
        if !known {
            return Err(BoardError::from_status(401, "Invalid credentials"));
        }
        state.session = Session::signed_in(user_type);
        Ok(state.session)
    }

    async fn register(&self, user_type: UserType, sign_up: &SignUp) -> BoardResult<Registration> {
        let mut state = self.enter("register")?;
        if state.accounts.iter().any(|(_, e, _)| *e == sign_up.email) {
            return Err(BoardError::from_status(409, "Email already registered"));
        }
        state
            .accounts
            .push((user_type, sign_up.email.clone(), sign_up.password.clone()));
        Ok(Registration {
            message: Some("Registered".into()),
        })
    }

    async fn logout(&self, _user_type: UserType) -> BoardResult<()> {
        let mut state = self.enter("logout")?;
        state.session = Session::anonymous();
        Ok(())
    }

    async fn fetch_profile(&self, user_type: UserType) -> BoardResult<Profile> {
        let state = self.enter("fetch_profile")?;
        state
            .profiles
            .get(&user_type)
            .cloned()
            .ok_or_else(|| BoardError::NotFound("profile".into()))
    }

    async fn update_profile(&self, profile: &Profile) -> BoardResult<Profile> {
        let mut state = self.enter("update_profile")?;
        state.profiles.insert(profile.user_type(), profile.clone());
        Ok(profile.clone())
    }

    async fn update_password(&self, user_type: UserType, change: &PasswordChange) -> BoardResult<()> {
        let mut state = self.enter("update_password")?;
        let account = state
            .accounts
            .iter_mut()
            .find(|(t, e, p)| *t == user_type && *e == change.email && *p == change.old_password)
            .ok_or_else(|| BoardError::from_status(401, "Current password is incorrect"))?;
        account.2 = change.new_password.clone();
        Ok(())
    }

    async fn search_jobs(
        &self,
        criteria: &SearchCriteria,
        page: usize,
        limit: usize,
    ) -> BoardResult<Vec<Job>> {
        let gate = self.search_gates.lock().unwrap().remove(criteria.keyword.trim());
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let state = self.enter("search_jobs")?;
        Ok(state
            .catalogue
            .iter()
            .filter(|job| matches(job, criteria))
            .skip(page.saturating_sub(1) * limit)
            .take(limit)
            .map(|job| Job {
                applied_status: state.applied.contains(&job.id),
                ..job.clone()
            })
            .collect())
    }

    async fn applied_jobs(&self) -> BoardResult<Vec<Job>> {
        let state = self.enter("applied_jobs")?;
        Ok(state
            .catalogue
            .iter()
            .filter(|job| state.applied.contains(&job.id))
            .map(|job| Job {
                applied_status: true,
                ..job.clone()
            })
            .collect())
    }

    async fn saved_jobs(&self) -> BoardResult<Vec<Job>> {
        let state = self.enter("saved_jobs")?;
        let saved = state
            .profiles
            .get(&UserType::JobSeeker)
            .map(|p| p.saved_jobs().to_vec())
            .unwrap_or_default();
        Ok(state
            .catalogue
            .iter()
            .filter(|job| saved.contains(&job.id))
            .cloned()
            .collect())
    }

    async fn job(&self, id: &str) -> BoardResult<Job> {
        let state = self.enter("job")?;
        state
            .catalogue
            .iter()
            .find(|job| job.id == id)
            .cloned()
            .ok_or_else(|| BoardError::NotFound(format!("job {}", id)))
    }

    async fn apply(&self, id: &str) -> BoardResult<()> {
        let mut state = self.enter("apply")?;
        if state.applied.iter().any(|a| a == id) {
            return Err(BoardError::from_status(400, "You have already applied for this job."));
        }
        state.applied.push(id.to_string());
        Ok(())
    }

    async fn post_job(&self, posting: &JobPosting) -> BoardResult<Option<Job>> {
        let mut state = self.enter("post_job")?;
        let created = job_from_posting(format!("p{}", state.roster.len() + 1), posting);
        state.roster.push(created.clone());
        Ok(state.echo_posted.then_some(created))
    }

    async fn update_job(&self, id: &str, posting: &JobPosting) -> BoardResult<Job> {
        let mut state = self.enter("update_job")?;
        let slot = state
            .roster
            .iter_mut()
            .find(|job| job.id == id)
            .ok_or_else(|| BoardError::NotFound(format!("job {}", id)))?;
        *slot = job_from_posting(id.to_string(), posting);
        Ok(slot.clone())
    }

    async fn delete_job(&self, id: &str) -> BoardResult<()> {
        let mut state = self.enter("delete_job")?;
        let before = state.roster.len();
        state.roster.retain(|job| job.id != id);
        if state.roster.len() == before {
            return Err(BoardError::NotFound(format!("job {}", id)));
        }
        Ok(())
    }

    async fn roster(&self) -> BoardResult<Vec<Job>> {
        Ok(self.enter("roster")?.roster.clone())
    }

    async fn employer_job(&self, id: &str) -> BoardResult<Job> {
        let state = self.enter("employer_job")?;
        state
            .roster
            .iter()
            .find(|job| job.id == id)
            .cloned()
            .ok_or_else(|| BoardError::NotFound(format!("job {}", id)))
    }

    async fn applicants(&self, job_id: &str) -> BoardResult<Vec<Applicant>> {
        let state = self.enter("applicants")?;
        Ok(state.applicants.get(job_id).cloned().unwrap_or_default())
    }

    async fn set_applicant_status(
        &self,
        application_id: &str,
        status: ApplicationStatus,
    ) -> BoardResult<()> {
        let mut state = self.enter("set_applicant_status")?;
        let found = state
            .applicants
            .values_mut()
            .flatten()
            .find(|a| a.application_id == application_id)
            .ok_or_else(|| BoardError::NotFound(format!("application {}", application_id)))?;
        found.status = status;
        Ok(())
    }

    async fn applicant_profile(&self, user_id: &str) -> BoardResult<Profile> {
        let state = self.enter("applicant_profile")?;
        state
            .applicant_profiles
            .get(user_id)
            .cloned()
            .ok_or_else(|| BoardError::NotFound(format!("no profile for applicant {}", user_id)))
    }
}
