//! HTTP gateway to the job board backend.
//!
//! [`Backend`] is the seam the controllers depend on; [`HttpGateway`] is the
//! production implementation. A single `reqwest` client with a cookie jar
//! carries the session cookie on every call.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{BoardError, BoardResult};
use crate::models::{
    Applicant, ApplicationStatus, Credentials, Job, JobPosting, PasswordChange, Registration,
    SearchCriteria, Session, SignUp, UserType,
};
use crate::profile::Profile;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Probe the cookie session.
    async fn current_user(&self) -> BoardResult<Session>;
    async fn login(&self, user_type: UserType, credentials: &Credentials) -> BoardResult<Session>;
    async fn register(&self, user_type: UserType, sign_up: &SignUp) -> BoardResult<Registration>;
    async fn logout(&self, user_type: UserType) -> BoardResult<()>;
    async fn fetch_profile(&self, user_type: UserType) -> BoardResult<Profile>;
    /// Replace the whole document; returns what the backend stored.
    async fn update_profile(&self, profile: &Profile) -> BoardResult<Profile>;
    async fn update_password(&self, user_type: UserType, change: &PasswordChange) -> BoardResult<()>;

    async fn search_jobs(
        &self,
        criteria: &SearchCriteria,
        page: usize,
        limit: usize,
    ) -> BoardResult<Vec<Job>>;
    async fn applied_jobs(&self) -> BoardResult<Vec<Job>>;
    async fn saved_jobs(&self) -> BoardResult<Vec<Job>>;
    async fn job(&self, id: &str) -> BoardResult<Job>;
    /// Fails with `Conflict` when already applied.
    async fn apply(&self, id: &str) -> BoardResult<()>;

    /// The backend may or may not echo the created job.
    async fn post_job(&self, posting: &JobPosting) -> BoardResult<Option<Job>>;
    async fn update_job(&self, id: &str, posting: &JobPosting) -> BoardResult<Job>;
    async fn delete_job(&self, id: &str) -> BoardResult<()>;
    async fn roster(&self) -> BoardResult<Vec<Job>>;
    async fn employer_job(&self, id: &str) -> BoardResult<Job>;
    async fn applicants(&self, job_id: &str) -> BoardResult<Vec<Applicant>>;
    async fn set_applicant_status(
        &self,
        application_id: &str,
        status: ApplicationStatus,
    ) -> BoardResult<()>;
    async fn applicant_profile(&self, user_id: &str) -> BoardResult<Profile>;
}

#[derive(Debug, Deserialize)]
struct CurrentUser {
    #[serde(default)]
    authenticated: bool,
    #[serde(rename = "currentUserType", default)]
    user_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginReply {
    #[serde(default)]
    authenticated: bool,
    #[serde(rename = "userType", default)]
    user_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchReply {
    #[serde(default)]
    search_job_data: Vec<Job>,
}

#[derive(Debug, Deserialize)]
struct AppliedReply {
    #[serde(default)]
    jobs_applied: Vec<Job>,
}

#[derive(Debug, Deserialize)]
struct RosterReply {
    #[serde(default)]
    jobs: Vec<Job>,
}

#[derive(Debug, Deserialize)]
struct JobReply {
    #[serde(default)]
    job: Option<Job>,
}

#[derive(Debug, Deserialize)]
struct ApplicantsReply {
    #[serde(default)]
    applicants: Vec<Applicant>,
}

/// Production [`Backend`] over HTTP.
#[derive(Clone)]
pub struct HttpGateway {
    http: Client,
    base: Url,
}

impl HttpGateway {
    pub fn new(config: &Config) -> BoardResult<Self> {
        let http = Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .user_agent(concat!("jobboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(BoardError::Http)?;
        let base = Url::parse(config.api_url.trim_end_matches('/'))
            .map_err(|e| BoardError::Config(format!("invalid API URL {}: {}", config.api_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(BoardError::Config(format!("invalid API URL {}", config.api_url)));
        }

        Ok(Self { http, base })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base.as_str().trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    /// Request to `segments` under the base URL. Each segment is
    /// percent-encoded, so ids cannot add path parts, a query or a fragment.
    fn resource(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        self.http.request(method, url)
    }

    /// Send and return the JSON body (Null when empty). Non-2xx statuses are
    /// mapped onto [`BoardError`] using the body's `error`/`message` text.
    async fn send(&self, op: &'static str, request: RequestBuilder) -> BoardResult<Value> {
        debug!(op, "backend request");
        let response = request.send().await.map_err(|e| {
            warn!(op, error = %e, "backend unreachable");
            BoardError::network(e.to_string())
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| BoardError::network(e.to_string()))?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if status.is_success() {
            return Ok(body);
        }

        let message = ["error", "message"]
            .iter()
            .find_map(|k| body.get(k).and_then(Value::as_str))
            .map(str::to_string)
            .or_else(|| body.as_str().map(str::to_string))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        warn!(op, status = status.as_u16(), %message, "backend rejected request");
        Err(BoardError::from_status(status.as_u16(), message))
    }

    async fn send_as<T: DeserializeOwned>(&self, op: &'static str, request: RequestBuilder) -> BoardResult<T> {
        let body = self.send(op, request).await?;
        serde_json::from_value(body).map_err(|e| BoardError::InvalidResponse(format!("{}: {}", op, e)))
    }

    fn decode_profile(op: &str, user_type: UserType, body: Value) -> BoardResult<Profile> {
        if !body.is_object() {
            return Err(BoardError::InvalidResponse(format!("{}: no profile data", op)));
        }
        Profile::from_wire(user_type, body).map_err(|e| BoardError::InvalidResponse(format!("{}: {}", op, e)))
    }
}

fn parse_user_type(raw: Option<&str>) -> Option<UserType> {
    raw.and_then(|s| s.parse().ok())
}

#[async_trait]
impl Backend for HttpGateway {
    async fn current_user(&self) -> BoardResult<Session> {
        let reply: CurrentUser = self
            .send_as("current_user", self.request(Method::GET, "/current_user"))
            .await?;
        match parse_user_type(reply.user_type.as_deref()) {
            Some(user_type) if reply.authenticated => Ok(Session::signed_in(user_type)),
            _ => Ok(Session::anonymous()),
        }
    }

    async fn login(&self, user_type: UserType, credentials: &Credentials) -> BoardResult<Session> {
        let path = format!("/{}/login", user_type.route());
        let reply: LoginReply = self
            .send_as(
                "login",
                self.request(Method::POST, &path).json(&credentials.to_wire(user_type)),
            )
            .await?;
        if !reply.authenticated {
            return Err(BoardError::auth("Invalid credentials"));
        }
        let confirmed = parse_user_type(reply.user_type.as_deref()).unwrap_or(user_type);
        Ok(Session::signed_in(confirmed))
    }

    async fn register(&self, user_type: UserType, sign_up: &SignUp) -> BoardResult<Registration> {
        let path = format!("/{}/register", user_type.route());
        let body = self
            .send(
                "register",
                self.request(Method::POST, &path).json(&sign_up.to_wire(user_type)),
            )
            .await?;
        Ok(serde_json::from_value(body).unwrap_or_default())
    }

    async fn logout(&self, user_type: UserType) -> BoardResult<()> {
        let path = format!("/{}/logout", user_type.route());
        self.send("logout", self.request(Method::POST, &path)).await?;
        Ok(())
    }

    async fn fetch_profile(&self, user_type: UserType) -> BoardResult<Profile> {
        let path = format!("/{}/profile", user_type.route());
        let body = self.send("fetch_profile", self.request(Method::GET, &path)).await?;
        Self::decode_profile("fetch_profile", user_type, body)
    }

    async fn update_profile(&self, profile: &Profile) -> BoardResult<Profile> {
        let user_type = profile.user_type();
        let path = format!("/{}/profile", user_type.route());
        let reply: ProfileReply = self
            .send_as(
                "update_profile",
                self.request(Method::PUT, &path).json(&profile.to_wire()?),
            )
            .await?;
        match reply.data {
            Some(data) if reply.success => Self::decode_profile("update_profile", user_type, data),
            _ => Err(BoardError::InvalidResponse(
                reply
                    .message
                    .unwrap_or_else(|| "No response received from the server.".to_string()),
            )),
        }
    }

    async fn update_password(&self, user_type: UserType, change: &PasswordChange) -> BoardResult<()> {
        let path = format!("/{}/updatepassword", user_type.route());
        self.send(
            "update_password",
            self.request(Method::PUT, &path).json(&change.to_wire(user_type)),
        )
        .await?;
        Ok(())
    }

    async fn search_jobs(
        &self,
        criteria: &SearchCriteria,
        page: usize,
        limit: usize,
    ) -> BoardResult<Vec<Job>> {
        let request = self.request(Method::GET, "/user/searchjobs").query(&[
            ("page", page.to_string()),
            ("limit", limit.to_string()),
            ("keyword", criteria.keyword.trim().to_string()),
            ("location", criteria.location.trim().to_string()),
        ]);
        let reply: SearchReply = self.send_as("search_jobs", request).await?;
        Ok(reply.search_job_data)
    }

    async fn applied_jobs(&self) -> BoardResult<Vec<Job>> {
        let reply: AppliedReply = self
            .send_as("applied_jobs", self.request(Method::GET, "/user/appliedjobs"))
            .await?;
        Ok(reply.jobs_applied)
    }

    async fn saved_jobs(&self) -> BoardResult<Vec<Job>> {
        let body = self
            .send("saved_jobs", self.request(Method::GET, "/user/saved-jobs"))
            .await?;
        if body.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(body).map_err(|e| BoardError::InvalidResponse(format!("saved_jobs: {}", e)))
    }

    async fn job(&self, id: &str) -> BoardResult<Job> {
        self.send_as("job", self.resource(Method::GET, &["user", "job", id]))
            .await
    }

    async fn apply(&self, id: &str) -> BoardResult<()> {
        self.send("apply", self.resource(Method::POST, &["user", "applyjobs", id]))
            .await?;
        Ok(())
    }

    async fn post_job(&self, posting: &JobPosting) -> BoardResult<Option<Job>> {
        let body = self
            .send("post_job", self.request(Method::POST, "/employer/postjob").json(posting))
            .await?;
        Ok(body
            .get("job")
            .cloned()
            .and_then(|job| serde_json::from_value(job).ok()))
    }

    async fn update_job(&self, id: &str, posting: &JobPosting) -> BoardResult<Job> {
        let request = self.resource(Method::PATCH, &["employer", "updatejob", id]).json(posting);
        let reply: JobReply = self
            .send_as("update_job", request)
            .await?;
        reply
            .job
            .ok_or_else(|| BoardError::InvalidResponse("update_job: no job in response".into()))
    }

    async fn delete_job(&self, id: &str) -> BoardResult<()> {
        self.send("delete_job", self.resource(Method::DELETE, &["employer", "deletejob", id]))
            .await?;
        Ok(())
    }

    async fn roster(&self) -> BoardResult<Vec<Job>> {
        let reply: RosterReply = self
            .send_as("roster", self.request(Method::GET, "/employer/viewjobs"))
            .await?;
        Ok(reply.jobs)
    }

    async fn employer_job(&self, id: &str) -> BoardResult<Job> {
        let body = self
            .send("employer_job", self.resource(Method::GET, &["employer", "job", id]))
            .await?;
        // Served both wrapped in `{job}` and bare.
        let job = match body.get("job") {
            Some(inner) if inner.is_object() => inner.clone(),
            _ => body,
        };
        serde_json::from_value(job).map_err(|e| BoardError::InvalidResponse(format!("employer_job: {}", e)))
    }

    async fn applicants(&self, job_id: &str) -> BoardResult<Vec<Applicant>> {
        let request = self.resource(Method::GET, &["employer", "job", job_id, "applicants"]);
        let reply: ApplicantsReply = self.send_as("applicants", request).await?;
        Ok(reply.applicants)
    }

    async fn set_applicant_status(
        &self,
        application_id: &str,
        status: ApplicationStatus,
    ) -> BoardResult<()> {
        let request = self
            .resource(Method::PUT, &["employer", "applicant", application_id, "status"])
            .json(&json!({ "status": status.as_str() }));
        self.send("set_applicant_status", request)
        .await?;
        Ok(())
    }

    async fn applicant_profile(&self, user_id: &str) -> BoardResult<Profile> {
        let body = self
            .send("applicant_profile", self.resource(Method::GET, &["employer", "user_profile", user_id]))
            .await?;
        if body.as_object().is_none_or(|m| m.is_empty()) {
            return Err(BoardError::NotFound(format!("no profile for applicant {}", user_id)));
        }
        Self::decode_profile("applicant_profile", UserType::JobSeeker, body)
    }
}
