//! The employer's posted jobs, selection and applicants.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::cache::{CacheKey, ResourceKind, SessionCache};
use crate::error::BoardResult;
use crate::gateway::Backend;
use crate::models::{Applicant, ApplicationStatus, Job, JobPosting, UserType};
use crate::profile::Profile;
use crate::session::SessionController;
use crate::validate::ValidationErrors;

#[derive(Debug, Default)]
struct RosterState {
    jobs: Vec<Job>,
    selected: Option<Job>,
    loaded: bool,
    applicants: HashMap<String, Vec<Applicant>>,
}

pub struct EmployerRoster {
    backend: Arc<dyn Backend>,
    session: Arc<SessionController>,
    cache: Arc<SessionCache>,
    state: Mutex<RosterState>,
}

impl EmployerRoster {
    pub fn new(backend: Arc<dyn Backend>, session: Arc<SessionController>, cache: Arc<SessionCache>) -> Self {
        Self {
            backend,
            session,
            cache,
            state: Mutex::new(RosterState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RosterState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn key() -> CacheKey {
        CacheKey::new(ResourceKind::PostedJobs, UserType::Employer)
    }

    fn require(&self) -> BoardResult<()> {
        self.session.require(UserType::Employer).map(|_| ())
    }

    /// Mirror the in-memory list into the cache, or drop the entry when the
    /// list was never loaded.
    fn write_through(&self, state: &RosterState) {
        if state.loaded {
            self.cache.set(Self::key(), &state.jobs);
        } else {
            self.cache.remove(Self::key());
        }
    }

    #[cfg(test)]
    pub fn jobs(&self) -> Vec<Job> {
        self.lock().jobs.clone()
    }

    pub fn selected(&self) -> Option<Job> {
        self.lock().selected.clone()
    }

    /// Posted jobs; only goes to the backend when neither memory nor the
    /// session cache has them.
    pub async fn fetch_roster(&self) -> BoardResult<Vec<Job>> {
        self.require()?;
        {
            let s = self.lock();
            if s.loaded {
                return Ok(s.jobs.clone());
            }
        }
        let jobs = match self.cache.get::<Vec<Job>>(Self::key()) {
            Some(jobs) => jobs,
            None => {
                let jobs = self.backend.roster().await?;
                self.cache.set(Self::key(), &jobs);
                jobs
            }
        };
        let mut s = self.lock();
        s.jobs = jobs.clone();
        s.loaded = true;
        debug!(count = jobs.len(), "roster loaded");
        Ok(jobs)
    }

    pub async fn refresh(&self) -> BoardResult<Vec<Job>> {
        {
            let mut s = self.lock();
            s.loaded = false;
        }
        self.cache.remove(Self::key());
        self.fetch_roster().await
    }

    pub fn select(&self, job: Job) {
        self.lock().selected = Some(job);
    }

    pub fn clear_selection(&self) {
        self.lock().selected = None;
    }

    /// Select by id, fetching the job when it is not in the list.
    pub async fn select_by_id(&self, job_id: &str) -> BoardResult<Job> {
        let job = self.job_detail(job_id).await?;
        self.select(job.clone());
        Ok(job)
    }

    pub async fn job_detail(&self, job_id: &str) -> BoardResult<Job> {
        self.require()?;
        let known = self.lock().jobs.iter().find(|j| j.id == job_id).cloned();
        match known {
            Some(job) => Ok(job),
            None => self.backend.employer_job(job_id).await,
        }
    }

    /// Replace the entry with the same id and keep the selection current.
    pub fn apply_edit(&self, updated: Job) {
        let mut s = self.lock();
        if let Some(slot) = s.jobs.iter_mut().find(|j| j.id == updated.id) {
            *slot = updated.clone();
        }
        if s.selected.as_ref().is_some_and(|j| j.id == updated.id) {
            s.selected = Some(updated);
        }
        self.write_through(&s);
    }

    /// Remove the entry; a selection pointing at it is cleared first.
    pub fn apply_delete(&self, job_id: &str) {
        let mut s = self.lock();
        if s.selected.as_ref().is_some_and(|j| j.id == job_id) {
            s.selected = None;
        }
        s.jobs.retain(|j| j.id != job_id);
        s.applicants.remove(job_id);
        self.write_through(&s);
    }

    pub async fn post_job(&self, posting: &JobPosting) -> BoardResult<Option<Job>> {
        self.require()?;
        posting.validate()?;
        let created = self.backend.post_job(posting).await?;
        let mut s = self.lock();
        match &created {
            Some(job) => {
                if s.loaded {
                    s.jobs.push(job.clone());
                }
                info!(job_id = %job.id, "job posted");
            }
            None => {
                // Without the new id the list cannot be patched locally.
                s.loaded = false;
                info!("job posted");
            }
        }
        self.write_through(&s);
        Ok(created)
    }

    pub async fn edit_job(&self, job_id: &str, posting: &JobPosting) -> BoardResult<Job> {
        self.require()?;
        posting.validate()?;
        let updated = self.backend.update_job(job_id, posting).await?;
        self.apply_edit(updated.clone());
        info!(job_id, "job updated");
        Ok(updated)
    }

    pub async fn delete_job(&self, job_id: &str) -> BoardResult<()> {
        self.require()?;
        self.backend.delete_job(job_id).await?;
        self.apply_delete(job_id);
        info!(job_id, "job deleted");
        Ok(())
    }

    /// Applicants for one job, always fresh from the backend.
    pub async fn applicants(&self, job_id: &str) -> BoardResult<Vec<Applicant>> {
        self.require()?;
        let applicants = self.backend.applicants(job_id).await?;
        self.lock()
            .applicants
            .insert(job_id.to_string(), applicants.clone());
        Ok(applicants)
    }

    /// Applicants fetched earlier for `job_id`.
    pub fn known_applicants(&self, job_id: &str) -> Option<Vec<Applicant>> {
        self.lock().applicants.get(job_id).cloned()
    }

    /// Move an application to `status`; the local copy follows on success.
    pub async fn set_applicant_status(
        &self,
        application_id: &str,
        status: ApplicationStatus,
    ) -> BoardResult<Option<Applicant>> {
        self.require()?;
        if status == ApplicationStatus::Applied {
            let mut errors = ValidationErrors::new();
            errors.add("status", "Status must be under_review, rejected or accepted");
            return Err(errors.into());
        }
        self.backend.set_applicant_status(application_id, status).await?;
        let mut s = self.lock();
        let updated = s
            .applicants
            .values_mut()
            .flatten()
            .find(|a| a.application_id == application_id)
            .map(|a| {
                a.status = status;
                a.clone()
            });
        info!(application_id, %status, "applicant status changed");
        Ok(updated)
    }

    pub async fn applicant_profile(&self, user_id: &str) -> BoardResult<Profile> {
        self.require()?;
        self.backend.applicant_profile(user_id).await
    }
}
