//! Job search state machine for job seekers.
//!
//! Every fetch is tagged with the generation of the search that issued it.
//! `search` bumps the generation, so a response that lands after a newer
//! search started is dropped instead of touching the results.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::cache::{CacheKey, ResourceKind, SessionCache};
use crate::error::BoardResult;
use crate::gateway::Backend;
use crate::models::{Job, SearchCriteria, UserType};
use crate::profile::Profile;
use crate::session::SessionController;

/// What a page fetch did to the result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Page applied; `added` unseen jobs appended.
    Loaded { added: usize },
    /// First page came back empty.
    NoResults,
    /// Nothing to do: no more pages, or a fetch is already running.
    Skipped,
    /// A newer search started while this fetch was out.
    Superseded,
}

/// Read-only copy of the search state for rendering.
#[derive(Debug, Clone, Default)]
pub struct SearchView {
    pub criteria: SearchCriteria,
    pub page: usize,
    pub results: Vec<Job>,
    pub is_loading: bool,
    pub has_more: bool,
    pub searched: bool,
}

#[derive(Debug, Default)]
struct SearchState {
    criteria: SearchCriteria,
    page: usize,
    results: Vec<Job>,
    seen: HashSet<String>,
    is_loading: bool,
    has_more: bool,
    searched: bool,
    generation: u64,
    saved: HashSet<String>,
    applied: Vec<Job>,
    applied_loaded: bool,
}

fn saved_set(profile: Option<&Profile>) -> HashSet<String> {
    profile
        .map(|p| p.saved_jobs().iter().cloned().collect())
        .unwrap_or_default()
}

/// Rolls the cursor back when a page fetch is dropped before it completes,
/// so an aborted continuation can be retried.
struct InFlight<'a> {
    state: &'a Mutex<SearchState>,
    generation: u64,
    page: usize,
    done: bool,
}

impl InFlight<'_> {
    fn finish(mut self) {
        self.done = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut s = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if s.generation == self.generation && s.is_loading {
            s.is_loading = false;
            s.page = self.page.saturating_sub(1).max(1);
            debug!(page = self.page, "page fetch cancelled");
        }
    }
}

pub struct JobSearch {
    backend: Arc<dyn Backend>,
    session: Arc<SessionController>,
    cache: Arc<SessionCache>,
    page_size: usize,
    state: Mutex<SearchState>,
}

impl JobSearch {
    pub fn new(
        backend: Arc<dyn Backend>,
        session: Arc<SessionController>,
        cache: Arc<SessionCache>,
        page_size: usize,
    ) -> Self {
        let saved = saved_set(session.profile().as_deref());
        Self {
            backend,
            session,
            cache,
            page_size: page_size.max(1),
            state: Mutex::new(SearchState {
                saved,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SearchState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn key(kind: ResourceKind) -> CacheKey {
        CacheKey::new(kind, UserType::JobSeeker)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn view(&self) -> SearchView {
        let s = self.lock();
        SearchView {
            criteria: s.criteria.clone(),
            page: s.page,
            results: s.results.clone(),
            is_loading: s.is_loading,
            has_more: s.has_more,
            searched: s.searched,
        }
    }

    pub fn has_more(&self) -> bool {
        self.lock().has_more
    }

    pub fn is_saved(&self, job_id: &str) -> bool {
        self.lock().saved.contains(job_id)
    }

    pub fn saved_ids(&self) -> HashSet<String> {
        self.lock().saved.clone()
    }

    /// Start over with new filters and fetch page 1.
    pub async fn search(&self, criteria: SearchCriteria) -> BoardResult<PageOutcome> {
        self.session.require(UserType::JobSeeker)?;
        let generation = {
            let mut s = self.lock();
            s.generation += 1;
            s.criteria = criteria.clone();
            s.page = 1;
            s.results.clear();
            s.seen.clear();
            s.has_more = true;
            s.is_loading = true;
            s.searched = true;
            s.generation
        };
        info!(%criteria, generation, "search");
        self.fetch(generation, criteria, 1).await
    }

    /// Fetch the following page. Does nothing (and issues no request) when
    /// there are no more pages or a fetch is already running.
    pub async fn load_next_page(&self) -> BoardResult<PageOutcome> {
        self.session.require(UserType::JobSeeker)?;
        let (generation, criteria, page) = {
            let mut s = self.lock();
            if !s.has_more || s.is_loading {
                return Ok(PageOutcome::Skipped);
            }
            s.page += 1;
            s.is_loading = true;
            (s.generation, s.criteria.clone(), s.page)
        };
        self.fetch(generation, criteria, page).await
    }

    async fn fetch(&self, generation: u64, criteria: SearchCriteria, page: usize) -> BoardResult<PageOutcome> {
        let in_flight = InFlight {
            state: &self.state,
            generation,
            page,
            done: false,
        };
        let result = self.backend.search_jobs(&criteria, page, self.page_size).await;
        in_flight.finish();

        let mut s = self.lock();
        if s.generation != generation {
            debug!(generation, current = s.generation, page, "dropping stale search response");
            return Ok(PageOutcome::Superseded);
        }
        s.is_loading = false;

        let jobs = match result {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(page, status = ?e.status(), error = %e, "search page failed");
                if page == 1 {
                    s.has_more = false;
                } else {
                    s.page -= 1;
                }
                return Err(e);
            }
        };

        let fetched = jobs.len();
        let mut added = 0;
        for job in jobs {
            if s.seen.insert(job.id.clone()) {
                s.results.push(job);
                added += 1;
            }
        }
        s.has_more = fetched >= self.page_size;
        debug!(page, fetched, added, has_more = s.has_more, "search page applied");

        if page == 1 && fetched == 0 {
            return Ok(PageOutcome::NoResults);
        }
        Ok(PageOutcome::Loaded { added })
    }

    /// Flip saved membership, optimistically, then persist the full id list
    /// through a profile update. Returns the new membership. On failure the
    /// set is re-derived from the unchanged profile.
    pub async fn toggle_saved_job(&self, job_id: &str) -> BoardResult<bool> {
        let profile = self.session.require(UserType::JobSeeker)?;
        let now_saved = {
            let mut s = self.lock();
            if s.saved.remove(job_id) {
                false
            } else {
                s.saved.insert(job_id.to_string());
                true
            }
        };

        let mut ids: Vec<String> = profile
            .saved_jobs()
            .iter()
            .filter(|id| id.as_str() != job_id)
            .cloned()
            .collect();
        if now_saved {
            ids.push(job_id.to_string());
        }

        match self.session.update_profile(profile.with_saved_jobs(ids)).await {
            Ok(updated) => {
                self.lock().saved = saved_set(Some(&updated));
                self.cache.remove(Self::key(ResourceKind::SavedJobs));
                debug!(job_id, now_saved, "saved jobs updated");
                Ok(now_saved)
            }
            Err(e) => {
                self.lock().saved = saved_set(self.session.profile().as_deref());
                warn!(job_id, error = %e, "saved job toggle reverted");
                Err(e)
            }
        }
    }

    /// Saved jobs with full details.
    pub async fn saved_jobs(&self) -> BoardResult<Vec<Job>> {
        self.session.require(UserType::JobSeeker)?;
        let key = Self::key(ResourceKind::SavedJobs);
        if let Some(jobs) = self.cache.get::<Vec<Job>>(key) {
            return Ok(jobs);
        }
        let jobs = self.backend.saved_jobs().await?;
        self.cache.set(key, &jobs);
        Ok(jobs)
    }

    pub async fn applied_jobs(&self) -> BoardResult<Vec<Job>> {
        self.session.require(UserType::JobSeeker)?;
        {
            let s = self.lock();
            if s.applied_loaded {
                return Ok(s.applied.clone());
            }
        }
        let key = Self::key(ResourceKind::AppliedJobs);
        let jobs = match self.cache.get::<Vec<Job>>(key) {
            Some(jobs) => jobs,
            None => {
                let jobs = self.backend.applied_jobs().await?;
                self.cache.set(key, &jobs);
                jobs
            }
        };
        let mut s = self.lock();
        s.applied = jobs.clone();
        s.applied_loaded = true;
        Ok(jobs)
    }

    /// Detail for one job: loaded results first, then the backend.
    pub async fn job_detail(&self, job_id: &str) -> BoardResult<Job> {
        self.session.require(UserType::JobSeeker)?;
        let known = {
            let s = self.lock();
            s.results
                .iter()
                .chain(s.applied.iter())
                .find(|j| j.id == job_id)
                .cloned()
        };
        match known {
            Some(job) => Ok(job),
            None => self.backend.job(job_id).await,
        }
    }

    /// Apply to a job. A repeat application fails with `Conflict` and leaves
    /// the state as it was.
    pub async fn apply(&self, job_id: &str) -> BoardResult<Job> {
        let job = self.job_detail(job_id).await?;
        self.backend.apply(job_id).await?;
        info!(job_id, "applied");
        Ok(self.record_application(&job))
    }

    /// Append to the applied list and flag the matching result, in one
    /// state update.
    pub fn record_application(&self, job: &Job) -> Job {
        let applied = Job {
            applied_status: true,
            ..job.clone()
        };
        let mut s = self.lock();
        if let Some(result) = s.results.iter_mut().find(|j| j.id == job.id) {
            result.applied_status = true;
        }
        if !s.applied.iter().any(|j| j.id == job.id) {
            s.applied.push(applied.clone());
        }
        let key = Self::key(ResourceKind::AppliedJobs);
        if s.applied_loaded {
            self.cache.set(key, &s.applied);
        } else {
            self.cache.remove(key);
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoardError;
    use crate::testing::{self, FakeBackend, seeded, seeker_credentials};

    async fn signed_in(backend: &Arc<FakeBackend>) -> (Arc<JobSearch>, Arc<SessionController>, Arc<SessionCache>) {
        let cache = Arc::new(SessionCache::new());
        let dyn_backend: Arc<dyn Backend> = backend.clone();
        let session = Arc::new(SessionController::new(dyn_backend.clone(), cache.clone()));
        session.login(UserType::JobSeeker, &seeker_credentials()).await.unwrap();
        let search = Arc::new(JobSearch::new(dyn_backend, session.clone(), cache.clone(), 5));
        (search, session, cache)
    }

    fn ids(view: &SearchView) -> Vec<String> {
        view.results.iter().map(|j| j.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_short_second_page_ends_continuation() {
        let backend = seeded();
        let (search, _, _) = signed_in(&backend).await;

        let first = search.search(SearchCriteria::new("chef", "NY")).await.unwrap();
        assert_eq!(first, PageOutcome::Loaded { added: 5 });
        assert!(search.has_more());

        let second = search.load_next_page().await.unwrap();
        assert_eq!(second, PageOutcome::Loaded { added: 3 });
        let view = search.view();
        assert_eq!(view.results.len(), 8);
        assert_eq!(view.page, 2);
        assert!(!view.has_more);
    }

    #[tokio::test]
    async fn test_cancelled_page_fetch_can_be_retried() {
        let backend = seeded();
        let (search, _, _) = signed_in(&backend).await;
        search.search(SearchCriteria::new("chef", "")).await.unwrap();

        let release = backend.hold_search("chef");
        let held = {
            let search = search.clone();
            tokio::spawn(async move { search.load_next_page().await })
        };
        while backend.gate_armed("chef") {
            tokio::task::yield_now().await;
        }
        assert!(search.view().is_loading);

        held.abort();
        assert!(held.await.unwrap_err().is_cancelled());
        drop(release);
        let view = search.view();
        assert!(!view.is_loading);
        assert_eq!(view.page, 1);

        assert_eq!(search.load_next_page().await.unwrap(), PageOutcome::Loaded { added: 3 });
    }

    #[tokio::test]
    async fn test_load_next_page_without_more_issues_no_request() {
        let backend = seeded();
        let (search, _, _) = signed_in(&backend).await;
        assert_eq!(search.load_next_page().await.unwrap(), PageOutcome::Skipped);

        search.search(SearchCriteria::new("chef", "")).await.unwrap();
        search.load_next_page().await.unwrap();
        let calls = backend.calls("search_jobs");
        assert_eq!(search.load_next_page().await.unwrap(), PageOutcome::Skipped);
        assert_eq!(backend.calls("search_jobs"), calls);
    }

    #[tokio::test]
    async fn test_pages_never_duplicate_ids() {
        let backend = seeded();
        backend.state().catalogue = testing::jobs("c", "Chef", 12);
        let (search, _, _) = signed_in(&backend).await;
        search.search(SearchCriteria::default()).await.unwrap();

        // A new listing at the top shifts page 2 back by one.
        backend.state().catalogue.insert(0, testing::job("new", "Chef new"));
        let outcome = search.load_next_page().await.unwrap();
        assert_eq!(outcome, PageOutcome::Loaded { added: 4 });

        search.load_next_page().await.unwrap();
        let view = search.view();
        let unique: HashSet<String> = ids(&view).into_iter().collect();
        assert_eq!(unique.len(), view.results.len());
        assert_eq!(view.results.len(), 12);
    }

    #[tokio::test]
    async fn test_empty_first_page_reports_no_results() {
        let backend = seeded();
        let (search, _, _) = signed_in(&backend).await;
        let outcome = search.search(SearchCriteria::new("astronaut", "")).await.unwrap();
        assert_eq!(outcome, PageOutcome::NoResults);
        let view = search.view();
        assert!(view.results.is_empty());
        assert!(!view.has_more);
    }

    #[tokio::test]
    async fn test_stale_search_response_is_discarded() {
        let backend = seeded();
        backend
            .state()
            .catalogue
            .extend(testing::jobs("k", "Line Cook", 2));
        let (search, _, _) = signed_in(&backend).await;

        let release = backend.hold_search("chef");
        let slow = {
            let search = search.clone();
            tokio::spawn(async move { search.search(SearchCriteria::new("chef", "")).await })
        };
        while backend.gate_armed("chef") {
            tokio::task::yield_now().await;
        }

        let fresh = search.search(SearchCriteria::new("cook", "")).await.unwrap();
        assert_eq!(fresh, PageOutcome::Loaded { added: 2 });

        release.send(()).unwrap();
        assert_eq!(slow.await.unwrap().unwrap(), PageOutcome::Superseded);
        let view = search.view();
        assert_eq!(ids(&view), vec!["k1".to_string(), "k2".to_string()]);
        assert_eq!(view.criteria.keyword, "cook");
        assert!(!view.is_loading);
    }

    #[tokio::test]
    async fn test_failed_later_page_can_be_retried() {
        let backend = seeded();
        let (search, _, _) = signed_in(&backend).await;
        search.search(SearchCriteria::default()).await.unwrap();

        backend.fail("search_jobs");
        assert!(search.load_next_page().await.is_err());
        let view = search.view();
        assert_eq!(view.page, 1);
        assert!(view.has_more);
        assert!(!view.is_loading);

        backend.recover("search_jobs");
        assert_eq!(search.load_next_page().await.unwrap(), PageOutcome::Loaded { added: 3 });
    }

    #[tokio::test]
    async fn test_failed_first_page_stops_continuation() {
        let backend = seeded();
        let (search, _, _) = signed_in(&backend).await;
        backend.fail("search_jobs");
        assert!(search.search(SearchCriteria::default()).await.is_err());
        assert!(!search.has_more());
        assert_eq!(search.load_next_page().await.unwrap(), PageOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_toggle_saved_twice_restores_membership() {
        let backend = seeded();
        let (search, session, _) = signed_in(&backend).await;
        let before = search.saved_ids();

        assert!(search.toggle_saved_job("c3").await.unwrap());
        assert!(search.is_saved("c3"));
        assert_eq!(session.profile().unwrap().saved_jobs(), ["c3".to_string()]);

        assert!(!search.toggle_saved_job("c3").await.unwrap());
        assert_eq!(search.saved_ids(), before);
        assert!(session.profile().unwrap().saved_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_failure_reverts_to_profile() {
        let backend = seeded();
        let (search, session, _) = signed_in(&backend).await;
        backend.fail("update_profile");
        let err = search.toggle_saved_job("c1").await.unwrap_err();
        assert!(matches!(err, BoardError::ProfileUpdate(_)));
        assert!(!search.is_saved("c1"));
        assert_eq!(search.saved_ids(), saved_set(session.profile().as_deref()));
    }

    #[tokio::test]
    async fn test_saved_jobs_cache_invalidated_by_toggle() {
        let backend = seeded();
        let (search, _, _) = signed_in(&backend).await;
        assert!(search.saved_jobs().await.unwrap().is_empty());
        assert!(search.saved_jobs().await.unwrap().is_empty());
        assert_eq!(backend.calls("saved_jobs"), 1);

        search.toggle_saved_job("c2").await.unwrap();
        let saved = search.saved_jobs().await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(backend.calls("saved_jobs"), 2);
    }

    #[tokio::test]
    async fn test_apply_marks_results_and_applied_list() {
        let backend = seeded();
        let (search, _, cache) = signed_in(&backend).await;
        search.search(SearchCriteria::new("chef", "")).await.unwrap();
        assert!(search.applied_jobs().await.unwrap().is_empty());

        let applied = search.apply("c2").await.unwrap();
        assert!(applied.applied_status);
        let view = search.view();
        assert!(view.results.iter().find(|j| j.id == "c2").unwrap().applied_status);
        let list = search.applied_jobs().await.unwrap();
        assert_eq!(list.len(), 1);
        assert!(list[0].applied_status);
        let cached: Vec<Job> = cache.get(JobSearch::key(ResourceKind::AppliedJobs)).unwrap();
        assert_eq!(cached.len(), 1);

        let err = search.apply("c2").await.unwrap_err();
        assert!(matches!(err, BoardError::Conflict(_)));
        assert_eq!(search.applied_jobs().await.unwrap().len(), 1);
        assert_eq!(search.view().results, view.results);
    }

    #[tokio::test]
    async fn test_job_detail_falls_back_to_backend() {
        let backend = seeded();
        let (search, _, _) = signed_in(&backend).await;
        assert_eq!(search.job_detail("c7").await.unwrap().title, "Chef 7");
        assert_eq!(backend.calls("job"), 1);

        search.search(SearchCriteria::default()).await.unwrap();
        search.job_detail("c1").await.unwrap();
        assert_eq!(backend.calls("job"), 1);
    }

    #[tokio::test]
    async fn test_requires_job_seeker_session() {
        let backend = seeded();
        let cache = Arc::new(SessionCache::new());
        let dyn_backend: Arc<dyn Backend> = backend.clone();
        let session = Arc::new(SessionController::new(dyn_backend.clone(), cache.clone()));
        session
            .login(UserType::Employer, &testing::employer_credentials())
            .await
            .unwrap();
        let search = JobSearch::new(dyn_backend, session, cache, 5);
        assert!(matches!(
            search.search(SearchCriteria::default()).await,
            Err(BoardError::Auth(_))
        ));
        assert_eq!(backend.calls("search_jobs"), 0);
    }
}
