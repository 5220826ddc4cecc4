//! Authentication state and the signed-in user's profile.
//!
//! [`SessionController`] owns the [`Session`] and the profile document.
//! Readers get an `Arc<Profile>` snapshot; a successful update swaps the
//! `Arc`, a failed one leaves the previous snapshot in place.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{info, warn};

use crate::cache::{CacheKey, ResourceKind, SessionCache};
use crate::error::{BoardError, BoardResult};
use crate::gateway::Backend;
use crate::models::{Credentials, PasswordChange, Registration, Session, SignUp, UserType};
use crate::profile::{Education, Person, Profile, WorkExperience};
use crate::validate;

#[derive(Debug, Default)]
struct AuthState {
    session: Session,
    profile: Option<Arc<Profile>>,
}

pub struct SessionController {
    backend: Arc<dyn Backend>,
    cache: Arc<SessionCache>,
    state: RwLock<AuthState>,
}

impl SessionController {
    pub fn new(backend: Arc<dyn Backend>, cache: Arc<SessionCache>) -> Self {
        Self {
            backend,
            cache,
            state: RwLock::new(AuthState::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, AuthState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, AuthState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn session(&self) -> Session {
        self.read().session
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().session.authenticated
    }

    pub fn user_type(&self) -> Option<UserType> {
        self.read().session.user_type
    }

    pub fn profile(&self) -> Option<Arc<Profile>> {
        self.read().profile.clone()
    }

    /// The signed-in profile, provided the account is of `user_type`.
    pub fn require(&self, user_type: UserType) -> BoardResult<Arc<Profile>> {
        let state = self.read();
        match (&state.session, &state.profile) {
            (Session { authenticated: true, user_type: Some(t) }, Some(profile)) if *t == user_type => {
                Ok(Arc::clone(profile))
            }
            (Session { authenticated: true, .. }, _) => Err(BoardError::auth(format!(
                "this action needs a {} account",
                user_type
            ))),
            _ => Err(BoardError::auth("please log in first")),
        }
    }

    fn set_signed_in(&self, user_type: UserType, profile: Arc<Profile>) {
        let mut state = self.write();
        state.session = Session::signed_in(user_type);
        state.profile = Some(profile);
    }

    fn set_signed_out(&self) {
        let mut state = self.write();
        state.session = Session::anonymous();
        state.profile = None;
    }

    /// Profile from the session cache, falling back to the backend.
    async fn load_profile(&self, user_type: UserType) -> BoardResult<Arc<Profile>> {
        let key = CacheKey::new(ResourceKind::Profile, user_type);
        if let Some(value) = self.cache.get_value(key) {
            match Profile::from_wire(user_type, value) {
                Ok(profile) => return Ok(Arc::new(profile)),
                Err(e) => {
                    warn!(%key, error = %e, "cached profile unreadable, refetching");
                    self.cache.remove(key);
                }
            }
        }
        let profile = self.backend.fetch_profile(user_type).await?;
        self.cache.set_value(key, profile.to_wire()?);
        Ok(Arc::new(profile))
    }

    /// Probe the backend for an existing cookie session. Never fails; any
    /// problem leaves the controller signed out.
    pub async fn initialize(&self) -> Session {
        let session = match self.backend.current_user().await {
            Ok(session) => session,
            Err(e) => {
                warn!(status = ?e.status(), error = %e, "session probe failed");
                Session::anonymous()
            }
        };
        let Some(user_type) = session.user_type.filter(|_| session.authenticated) else {
            self.set_signed_out();
            return Session::anonymous();
        };
        match self.load_profile(user_type).await {
            Ok(profile) => {
                self.set_signed_in(user_type, profile);
                info!(%user_type, "resumed session");
                Session::signed_in(user_type)
            }
            Err(e) => {
                warn!(error = %e, "profile load failed, treating session as signed out");
                self.cache.clear();
                self.set_signed_out();
                Session::anonymous()
            }
        }
    }

    /// Session and profile become visible together, or not at all. A
    /// rejected attempt leaves the current session and cache untouched.
    pub async fn login(&self, user_type: UserType, credentials: &Credentials) -> BoardResult<Session> {
        credentials.validate()?;
        let session = self.backend.login(user_type, credentials).await?;
        self.cache.clear();
        let confirmed = session.user_type.unwrap_or(user_type);
        match self.load_profile(confirmed).await {
            Ok(profile) => {
                self.set_signed_in(confirmed, profile);
                info!(user_type = %confirmed, "logged in");
                Ok(Session::signed_in(confirmed))
            }
            Err(e) => {
                warn!(error = %e, "login succeeded but profile did not load");
                self.cache.clear();
                self.set_signed_out();
                Err(e)
            }
        }
    }

    /// Create an account; the caller logs in separately.
    pub async fn register(&self, user_type: UserType, sign_up: &SignUp) -> BoardResult<Registration> {
        sign_up.validate()?;
        let registration = self.backend.register(user_type, sign_up).await?;
        info!(%user_type, "registered");
        Ok(registration)
    }

    /// Always ends signed out; backend failures are only logged.
    pub async fn logout(&self) {
        if let Some(user_type) = self.user_type() {
            if let Err(e) = self.backend.logout(user_type).await {
                warn!(status = ?e.status(), error = %e, "logout request failed, clearing local session anyway");
            }
        }
        self.cache.clear();
        self.set_signed_out();
        info!("logged out");
    }

    /// Send the whole document. On success the local copy and its cache
    /// entry are replaced; on failure nothing changes.
    pub async fn update_profile(&self, next: Profile) -> BoardResult<Arc<Profile>> {
        let user_type = next.user_type();
        self.require(user_type)?;
        let stored = self
            .backend
            .update_profile(&next)
            .await
            .map_err(|e| BoardError::ProfileUpdate(Box::new(e)))?;
        let key = CacheKey::new(ResourceKind::Profile, user_type);
        let wire = stored.to_wire()?;
        let stored = Arc::new(stored);
        {
            let mut state = self.write();
            // A logout or account switch while the request was out wins.
            if state.session.user_type != Some(user_type) || !state.session.authenticated {
                return Err(BoardError::auth("session ended during profile update"));
            }
            state.profile = Some(Arc::clone(&stored));
        }
        self.cache.set_value(key, wire);
        Ok(stored)
    }

    /// Read-modify-write against the current document.
    async fn modify_profile<F>(&self, edit: F) -> BoardResult<Arc<Profile>>
    where
        F: FnOnce(&mut Person),
    {
        let user_type = self.user_type().ok_or_else(|| BoardError::auth("please log in first"))?;
        let current = self.require(user_type)?;
        let mut next = (*current).clone();
        edit(next.person_mut());
        next.person().validate_entries(validate::current_year())?;
        self.update_profile(next).await
    }

    /// Replace the personal-information fields.
    pub async fn update_personal(&self, personal: Person) -> BoardResult<Arc<Profile>> {
        personal.validate_personal()?;
        self.modify_profile(|person| {
            person.first_name = personal.first_name;
            person.last_name = personal.last_name;
            person.role = personal.role;
            person.email = personal.email;
            person.phone_number = personal.phone_number;
            person.location = personal.location;
        })
        .await
    }

    pub async fn save_education(&self, entry: Education) -> BoardResult<Arc<Profile>> {
        entry.validate(validate::current_year())?;
        self.modify_profile(|person| person.upsert_education(entry)).await
    }

    pub async fn remove_education(&self, id: &str) -> BoardResult<Arc<Profile>> {
        self.ensure_entry(|p| p.education.iter().any(|e| e.id == id), id)?;
        self.modify_profile(|person| {
            person.remove_education(id);
        })
        .await
    }

    pub async fn save_work_experience(&self, entry: WorkExperience) -> BoardResult<Arc<Profile>> {
        entry.validate(validate::current_year())?;
        self.modify_profile(|person| person.upsert_work_experience(entry)).await
    }

    pub async fn remove_work_experience(&self, id: &str) -> BoardResult<Arc<Profile>> {
        self.ensure_entry(|p| p.work_experience.iter().any(|e| e.id == id), id)?;
        self.modify_profile(|person| {
            person.remove_work_experience(id);
        })
        .await
    }

    fn ensure_entry(&self, exists: impl Fn(&Person) -> bool, id: &str) -> BoardResult<()> {
        match self.profile() {
            Some(profile) if exists(profile.person()) => Ok(()),
            Some(_) => Err(BoardError::NotFound(format!("no entry with id {}", id))),
            None => Err(BoardError::auth("please log in first")),
        }
    }

    /// Change the password; the account email defaults to the profile's.
    pub async fn update_password(&self, mut change: PasswordChange) -> BoardResult<()> {
        let user_type = self.user_type().ok_or_else(|| BoardError::auth("please log in first"))?;
        let profile = self.require(user_type)?;
        change.validate()?;
        if change.email.trim().is_empty() {
            change.email = profile.person().email.clone();
        }
        self.backend.update_password(user_type, &change).await?;
        info!(%user_type, "password updated");
        Ok(())
    }

    /// Drop the cached document and fetch it again.
    pub async fn reload_profile(&self) -> BoardResult<Arc<Profile>> {
        let user_type = self.user_type().ok_or_else(|| BoardError::auth("please log in first"))?;
        self.cache.remove(CacheKey::new(ResourceKind::Profile, user_type));
        let profile = self.load_profile(user_type).await?;
        let mut state = self.write();
        if state.session.user_type == Some(user_type) {
            state.profile = Some(Arc::clone(&profile));
        }
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeBackend, seeded, seeker_credentials};

    fn controller(backend: &Arc<FakeBackend>) -> (SessionController, Arc<SessionCache>) {
        let cache = Arc::new(SessionCache::new());
        let backend: Arc<dyn Backend> = backend.clone();
        (SessionController::new(backend, Arc::clone(&cache)), cache)
    }

    #[tokio::test]
    async fn test_initialize_without_session() {
        let backend = seeded();
        let (ctl, _) = controller(&backend);
        assert_eq!(ctl.initialize().await, Session::anonymous());
        assert!(ctl.profile().is_none());
    }

    #[tokio::test]
    async fn test_initialize_failure_degrades_to_signed_out() {
        let backend = seeded();
        backend.fail("current_user");
        let (ctl, _) = controller(&backend);
        assert!(!ctl.initialize().await.authenticated);
        assert!(!ctl.is_authenticated());
    }

    #[tokio::test]
    async fn test_initialize_resumes_cookie_session() {
        let backend = seeded();
        backend.state().session = Session::signed_in(UserType::Employer);
        let (ctl, cache) = controller(&backend);
        let session = ctl.initialize().await;
        assert_eq!(session, Session::signed_in(UserType::Employer));
        assert_eq!(ctl.profile().unwrap().person().first_name, "Grace");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_login_sets_session_and_profile_together() {
        let backend = seeded();
        let (ctl, cache) = controller(&backend);
        ctl.login(UserType::JobSeeker, &seeker_credentials()).await.unwrap();
        assert!(ctl.is_authenticated());
        assert_eq!(ctl.user_type(), Some(UserType::JobSeeker));
        assert_eq!(ctl.profile().unwrap().person().first_name, "Ada");
        assert!(
            cache
                .get_value(CacheKey::new(ResourceKind::Profile, UserType::JobSeeker))
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_login_bad_password() {
        let backend = seeded();
        let (ctl, _) = controller(&backend);
        let bad = Credentials {
            email: "ada@example.com".into(),
            password: "wrong".into(),
        };
        let err = ctl.login(UserType::JobSeeker, &bad).await.unwrap_err();
        assert!(matches!(err, BoardError::Auth(_)));
        assert!(!ctl.is_authenticated());
    }

    #[tokio::test]
    async fn test_rejected_relogin_keeps_current_session_and_cache() {
        let backend = seeded();
        let (ctl, cache) = controller(&backend);
        ctl.login(UserType::JobSeeker, &seeker_credentials()).await.unwrap();
        let before = ctl.profile().unwrap();
        let entries = cache.len();

        let bad = Credentials {
            email: "ada@example.com".into(),
            password: "wrongpass".into(),
        };
        assert!(ctl.login(UserType::JobSeeker, &bad).await.is_err());
        assert_eq!(ctl.session(), Session::signed_in(UserType::JobSeeker));
        assert!(Arc::ptr_eq(&before, &ctl.profile().unwrap()));
        assert_eq!(cache.len(), entries);
    }

    #[tokio::test]
    async fn test_entry_edit_rejects_invalid_existing_entries() {
        let backend = seeded();
        let (ctl, _) = controller(&backend);
        ctl.login(UserType::JobSeeker, &seeker_credentials()).await.unwrap();
        let mut broken = (*ctl.profile().unwrap()).clone();
        broken.person_mut().upsert_education(Education::new("", "BSc", "Maths"));
        ctl.update_profile(broken).await.unwrap();

        let err = ctl
            .update_personal(ctl.profile().unwrap().person().clone())
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::Validation(ref v) if v.has("eduSchoolName")));
        assert_eq!(backend.calls("update_profile"), 1);
    }

    #[tokio::test]
    async fn test_login_validation_never_reaches_backend() {
        let backend = seeded();
        let (ctl, _) = controller(&backend);
        let bad = Credentials {
            email: "not-an-email".into(),
            password: String::new(),
        };
        let err = ctl.login(UserType::JobSeeker, &bad).await.unwrap_err();
        assert!(matches!(err, BoardError::Validation(ref v) if v.has("email") && v.has("password")));
        assert_eq!(backend.calls("login"), 0);
    }

    #[tokio::test]
    async fn test_login_requires_profile() {
        let backend = seeded();
        backend.fail("fetch_profile");
        let (ctl, _) = controller(&backend);
        assert!(ctl.login(UserType::JobSeeker, &seeker_credentials()).await.is_err());
        assert!(!ctl.is_authenticated());
        assert!(ctl.profile().is_none());
    }

    #[tokio::test]
    async fn test_register_does_not_sign_in() {
        let backend = seeded();
        let (ctl, _) = controller(&backend);
        let sign_up = SignUp {
            first_name: "Alan".into(),
            last_name: "Turing".into(),
            email: "alan@example.com".into(),
            password: "enigma1912".into(),
            confirm_password: "enigma1912".into(),
        };
        ctl.register(UserType::JobSeeker, &sign_up).await.unwrap();
        assert!(!ctl.is_authenticated());
        ctl.login(UserType::JobSeeker, &sign_up.credentials()).await.unwrap();
        assert!(ctl.is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_clears_state_even_when_backend_fails() {
        let backend = seeded();
        let (ctl, cache) = controller(&backend);
        ctl.login(UserType::JobSeeker, &seeker_credentials()).await.unwrap();
        backend.fail("logout");
        ctl.logout().await;
        assert_eq!(ctl.session(), Session::anonymous());
        assert!(ctl.profile().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_update_profile_failure_keeps_previous_snapshot() {
        let backend = seeded();
        let (ctl, _) = controller(&backend);
        ctl.login(UserType::JobSeeker, &seeker_credentials()).await.unwrap();
        let before = ctl.profile().unwrap();

        backend.fail("update_profile");
        let next = before.with_saved_jobs(vec!["c1".into()]);
        let err = ctl.update_profile(next).await.unwrap_err();
        assert!(matches!(err, BoardError::ProfileUpdate(_)));
        assert!(Arc::ptr_eq(&before, &ctl.profile().unwrap()));
    }

    #[tokio::test]
    async fn test_update_profile_replaces_snapshot_and_cache() {
        let backend = seeded();
        let (ctl, cache) = controller(&backend);
        ctl.login(UserType::JobSeeker, &seeker_credentials()).await.unwrap();
        let before = ctl.profile().unwrap();

        let updated = ctl
            .update_profile(before.with_saved_jobs(vec!["c2".into()]))
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&before, &updated));
        assert_eq!(ctl.profile().unwrap().saved_jobs(), ["c2".to_string()]);
        let cached = cache
            .get_value(CacheKey::new(ResourceKind::Profile, UserType::JobSeeker))
            .unwrap();
        assert_eq!(cached["jobSeekerSavedJobs"], serde_json::json!(["c2"]));
    }

    #[tokio::test]
    async fn test_update_profile_wrong_account_kind() {
        let backend = seeded();
        let (ctl, _) = controller(&backend);
        ctl.login(UserType::JobSeeker, &seeker_credentials()).await.unwrap();
        let err = ctl.update_profile(testing::employer_profile()).await.unwrap_err();
        assert!(matches!(err, BoardError::Auth(_)));
        assert_eq!(backend.calls("update_profile"), 0);
    }

    #[tokio::test]
    async fn test_education_entries_by_id() {
        let backend = seeded();
        let (ctl, _) = controller(&backend);
        ctl.login(UserType::JobSeeker, &seeker_credentials()).await.unwrap();

        let mut edu = Education::new("UCL", "BSc", "Maths");
        edu.start_month = "September".into();
        edu.start_year = Some(2015);
        ctl.save_education(edu.clone()).await.unwrap();
        assert_eq!(ctl.profile().unwrap().person().education.len(), 1);

        ctl.remove_education(&edu.id).await.unwrap();
        assert!(ctl.profile().unwrap().person().education.is_empty());
        assert!(matches!(
            ctl.remove_education(&edu.id).await,
            Err(BoardError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_work_entry_is_rejected_locally() {
        let backend = seeded();
        let (ctl, _) = controller(&backend);
        ctl.login(UserType::JobSeeker, &seeker_credentials()).await.unwrap();
        let work = WorkExperience::new("Acme", "", "Remote");
        assert!(matches!(
            ctl.save_work_experience(work).await,
            Err(BoardError::Validation(_))
        ));
        assert_eq!(backend.calls("update_profile"), 0);
    }

    #[tokio::test]
    async fn test_update_password_uses_profile_email() {
        let backend = seeded();
        let (ctl, _) = controller(&backend);
        ctl.login(UserType::JobSeeker, &seeker_credentials()).await.unwrap();
        ctl.update_password(PasswordChange {
            email: String::new(),
            old_password: "hunter22".into(),
            new_password: "correct horse".into(),
        })
        .await
        .unwrap();
        ctl.logout().await;
        let fresh = Credentials {
            email: "ada@example.com".into(),
            password: "correct horse".into(),
        };
        ctl.login(UserType::JobSeeker, &fresh).await.unwrap();
    }

    #[tokio::test]
    async fn test_reload_profile_bypasses_cache() {
        let backend = seeded();
        let (ctl, _) = controller(&backend);
        ctl.login(UserType::JobSeeker, &seeker_credentials()).await.unwrap();
        backend
            .state()
            .profiles
            .insert(UserType::JobSeeker, testing::seeker_profile(&["c5"]));
        ctl.reload_profile().await.unwrap();
        assert_eq!(ctl.profile().unwrap().saved_jobs(), ["c5".to_string()]);
        assert_eq!(backend.calls("fetch_profile"), 2);
    }
}
