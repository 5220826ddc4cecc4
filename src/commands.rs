//! Interactive command tree and its dispatcher.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};

use crate::cache::SessionCache;
use crate::config::Config;
use crate::error::BoardError;
use crate::gateway::Backend;
use crate::models::{
    Applicant, ApplicationStatus, Credentials, Job, JobPosting, PasswordChange, SearchCriteria, Session,
    SignUp, UserType,
};
use crate::profile::{Education, Person, Profile, WorkExperience};
use crate::roster::EmployerRoster;
use crate::search::{JobSearch, PageOutcome};
use crate::session::SessionController;
use crate::tui::{self, truncate};

#[derive(Parser, Debug)]
#[command(name = "jobboard", no_binary_name = true, disable_version_flag = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: ShellCommand,
}

#[derive(Subcommand, Debug)]
pub enum ShellCommand {
    /// Log in (user type: seeker or employer)
    Login {
        user_type: UserType,
        email: String,
        password: String,
    },

    /// Create an account, then log in with it
    Register {
        user_type: UserType,
        first_name: String,
        last_name: String,
        email: String,
        password: String,
        confirm_password: String,
    },

    /// End the session
    Logout,

    /// Show the current session
    Whoami,

    /// Drop cached data for this account and reload the profile
    Refresh,

    /// Change the account password
    Password { old_password: String, new_password: String },

    /// View or edit the profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Search jobs (starts a new result list)
    Search {
        #[arg(short, long, default_value = "")]
        keyword: String,

        #[arg(short, long, default_value = "")]
        location: String,
    },

    /// Load the next page of results
    More,

    /// Browse results full-screen
    Browse,

    /// Show job details
    Job { id: String },

    /// Save or unsave a job
    Save { id: String },

    /// List saved jobs
    Saved,

    /// List jobs applied to
    Applied,

    /// Apply to a job
    Apply { id: String },

    /// List posted jobs
    Roster {
        /// Ignore cached data
        #[arg(long)]
        refresh: bool,
    },

    /// Select a posted job
    Select { id: String },

    /// Clear the selection
    Deselect,

    /// Post a new job
    Post(PostingArgs),

    /// Edit a posted job
    Edit {
        id: String,
        #[command(flatten)]
        fields: PostingArgs,
    },

    /// Delete a posted job
    Delete { id: String },

    /// List applicants for a job
    Applicants {
        job_id: String,

        /// Show the last fetched list without a request
        #[arg(long)]
        cached: bool,
    },

    /// Move an application to under_review, rejected or accepted
    Status {
        application_id: String,
        status: ApplicationStatus,
    },

    /// Show an applicant's profile
    Applicant { user_id: String },

    /// Leave
    #[command(alias = "exit")]
    Quit,
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// Print the profile
    Show,

    /// Update personal information
    Set {
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        location: Option<String>,
    },

    /// Add an education entry, or replace one with --id
    AddEdu {
        school: String,
        degree: String,
        major: String,
        #[arg(long)]
        start_month: String,
        #[arg(long)]
        start_year: i32,
        #[arg(long)]
        end_month: Option<String>,
        #[arg(long)]
        end_year: Option<i32>,
        #[arg(long)]
        gpa: Option<f64>,
        #[arg(long)]
        id: Option<String>,
    },

    /// Remove an education entry
    RmEdu { id: String },

    /// Add a work experience entry, or replace one with --id
    AddWork {
        company: String,
        position: String,
        location: String,
        /// Full Time, Part Time or Internship
        #[arg(long = "type")]
        kind: String,
        #[arg(long)]
        start_month: String,
        #[arg(long)]
        start_year: i32,
        #[arg(long)]
        end_month: Option<String>,
        #[arg(long)]
        end_year: Option<i32>,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        id: Option<String>,
    },

    /// Remove a work experience entry
    RmWork { id: String },
}

/// Job form fields; unset flags keep their current value.
#[derive(Args, Debug, Default)]
pub struct PostingArgs {
    #[arg(long)]
    req_id: Option<String>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    employment_type: Option<String>,
    #[arg(long)]
    openings: Option<u32>,
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    state: Option<String>,
    #[arg(long)]
    zip: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    qualifications: Option<String>,
    #[arg(long)]
    skills: Option<String>,
    #[arg(long)]
    salary: Option<String>,
    #[arg(long)]
    company: Option<String>,
    #[arg(long)]
    company_description: Option<String>,
    #[arg(long)]
    industry: Option<String>,
    /// YYYY-MM-DD
    #[arg(long)]
    start_date: Option<String>,
    /// YYYY-MM-DD
    #[arg(long)]
    deadline: Option<String>,
}

impl PostingArgs {
    fn apply_to(self, posting: &mut JobPosting) {
        let fields = [
            (self.req_id, &mut posting.req_id),
            (self.title, &mut posting.title),
            (self.category, &mut posting.category),
            (self.employment_type, &mut posting.employment_type),
            (self.address, &mut posting.address),
            (self.city, &mut posting.city),
            (self.state, &mut posting.state),
            (self.zip, &mut posting.zip),
            (self.description, &mut posting.description),
            (self.qualifications, &mut posting.qualifications),
            (self.skills, &mut posting.skills),
            (self.salary, &mut posting.salary),
            (self.company, &mut posting.company_name),
            (self.company_description, &mut posting.company_description),
            (self.industry, &mut posting.company_industry),
            (self.start_date, &mut posting.start_date),
            (self.deadline, &mut posting.app_deadline),
        ];
        for (value, slot) in fields {
            if let Some(value) = value {
                *slot = value;
            }
        }
        if let Some(openings) = self.openings {
            posting.openings = openings;
        }
    }
}

/// Split a line into words; single or double quotes group words.
pub fn split_line(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_word = false;

    for c in line.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if quote.is_some() {
        return Err(anyhow!("unterminated quote"));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Controllers for one terminal session. Job seeker and employer
/// controllers exist only while such an account is signed in.
pub struct App {
    config: Config,
    backend: Arc<dyn Backend>,
    cache: Arc<SessionCache>,
    session: Arc<SessionController>,
    search: Option<Arc<JobSearch>>,
    roster: Option<EmployerRoster>,
}

impl App {
    pub fn new(config: Config, backend: Arc<dyn Backend>) -> Self {
        let cache = Arc::new(SessionCache::new());
        let session = Arc::new(SessionController::new(Arc::clone(&backend), Arc::clone(&cache)));
        Self {
            config,
            backend,
            cache,
            session,
            search: None,
            roster: None,
        }
    }

    pub async fn start(&mut self) {
        let session = self.session.initialize().await;
        self.rebuild();
        match session.user_type {
            Some(user_type) => println!("Resumed session as {}.", user_type),
            None => println!("Not logged in. Type 'help' for commands."),
        }
    }

    /// Recreate the per-account controllers after a session change.
    fn rebuild(&mut self) {
        self.search = None;
        self.roster = None;
        if !self.session.is_authenticated() {
            return;
        }
        match self.session.user_type() {
            Some(UserType::JobSeeker) => {
                self.search = Some(Arc::new(JobSearch::new(
                    Arc::clone(&self.backend),
                    Arc::clone(&self.session),
                    Arc::clone(&self.cache),
                    self.config.page_size,
                )));
            }
            Some(UserType::Employer) => {
                self.roster = Some(EmployerRoster::new(
                    Arc::clone(&self.backend),
                    Arc::clone(&self.session),
                    Arc::clone(&self.cache),
                ));
            }
            None => {}
        }
    }

    fn search(&self) -> Result<&Arc<JobSearch>, BoardError> {
        self.search
            .as_ref()
            .ok_or_else(|| BoardError::auth("log in as a job seeker first"))
    }

    fn roster(&self) -> Result<&EmployerRoster, BoardError> {
        self.roster
            .as_ref()
            .ok_or_else(|| BoardError::auth("log in as an employer first"))
    }

    /// Log in; controllers are only rebuilt when the session moved, so a
    /// rejected attempt keeps the current results.
    async fn sign_in(&mut self, user_type: UserType, credentials: &Credentials) -> Result<Session, BoardError> {
        let before = self.session.session();
        let result = self.session.login(user_type, credentials).await;
        if result.is_ok() || self.session.session() != before {
            self.rebuild();
        }
        result
    }

    pub async fn dispatch(&mut self, command: ShellCommand) -> Result<Flow> {
        match command {
            ShellCommand::Login {
                user_type,
                email,
                password,
            } => {
                let session = self.sign_in(user_type, &Credentials { email, password }).await?;
                if let Some(profile) = self.session.profile() {
                    println!("Logged in as {} ({}).", profile.person().full_name(), user_type);
                } else if let Some(user_type) = session.user_type {
                    println!("Logged in as {}.", user_type);
                }
            }

            ShellCommand::Register {
                user_type,
                first_name,
                last_name,
                email,
                password,
                confirm_password,
            } => {
                let sign_up = SignUp {
                    first_name,
                    last_name,
                    email,
                    password,
                    confirm_password,
                };
                let registration = self.session.register(user_type, &sign_up).await?;
                println!(
                    "{}",
                    registration
                        .message
                        .unwrap_or_else(|| "Registration successful.".to_string())
                );
                self.sign_in(user_type, &sign_up.credentials()).await?;
                println!("Logged in as {}.", user_type);
            }

            ShellCommand::Logout => {
                self.session.logout().await;
                self.rebuild();
                println!("Logged out.");
            }

            ShellCommand::Whoami => match (self.session.user_type(), self.session.profile()) {
                (Some(user_type), Some(profile)) => {
                    println!("{} <{}> ({})", profile.person().full_name(), profile.person().email, user_type);
                    if !self.cache.is_empty() {
                        println!("{} cached resource(s)", self.cache.len());
                    }
                }
                _ => println!("Not logged in."),
            },

            ShellCommand::Refresh => {
                let user_type = self
                    .session
                    .user_type()
                    .ok_or_else(|| BoardError::auth("please log in first"))?;
                let before = self.cache.len();
                self.cache.invalidate(user_type);
                let dropped = before - self.cache.len();
                self.session.reload_profile().await?;
                self.rebuild();
                println!("Dropped {} cached entries; profile reloaded.", dropped);
            }

            ShellCommand::Password {
                old_password,
                new_password,
            } => {
                self.session
                    .update_password(PasswordChange {
                        email: String::new(),
                        old_password,
                        new_password,
                    })
                    .await?;
                println!("Password updated successfully.");
            }

            ShellCommand::Profile { command } => self.profile(command).await?,

            ShellCommand::Search { keyword, location } => {
                let search = self.search()?;
                let outcome = search.search(SearchCriteria::new(keyword, location)).await?;
                if outcome == PageOutcome::NoResults {
                    println!("No jobs found.");
                } else {
                    self.print_results(0);
                }
            }

            ShellCommand::More => {
                let search = self.search()?;
                let before = search.view().results.len();
                match search.load_next_page().await? {
                    PageOutcome::Loaded { added: 0 } | PageOutcome::Skipped if !search.has_more() => {
                        println!("No more jobs available.")
                    }
                    PageOutcome::Skipped => println!("Still loading."),
                    _ => self.print_results(before),
                }
            }

            ShellCommand::Browse => {
                let search = Arc::clone(self.search()?);
                tui::run_browse(search, &self.config).await?;
            }

            ShellCommand::Job { id } => {
                let job = match (&self.search, &self.roster) {
                    (Some(search), _) => search.job_detail(&id).await?,
                    (None, Some(roster)) => roster.job_detail(&id).await?,
                    (None, None) => return Err(BoardError::auth("please log in first").into()),
                };
                let saved = self.search.as_ref().is_some_and(|s| s.is_saved(&job.id));
                print_job(&job, saved);
            }

            ShellCommand::Save { id } => {
                if self.search()?.toggle_saved_job(&id).await? {
                    println!("Job {} saved.", id);
                } else {
                    println!("Job {} removed from saved jobs.", id);
                }
            }

            ShellCommand::Saved => {
                let jobs = self.search()?.saved_jobs().await?;
                print_jobs(&jobs, "No saved jobs.", |job| {
                    job.application_stage()
                        .map(|s| s.label())
                        .unwrap_or_else(|| "SAVED".into())
                });
            }

            ShellCommand::Applied => {
                let jobs = self.search()?.applied_jobs().await?;
                print_jobs(&jobs, "No applications yet.", |job| {
                    job.application_stage()
                        .unwrap_or(ApplicationStatus::Applied)
                        .label()
                });
            }

            ShellCommand::Apply { id } => {
                let job = self.search()?.apply(&id).await?;
                println!("Applied to {} at {}.", job.title, job.company.name);
            }

            ShellCommand::Roster { refresh } => {
                let roster = self.roster()?;
                let jobs = if refresh {
                    roster.refresh().await?
                } else {
                    roster.fetch_roster().await?
                };
                let selected = roster.selected().map(|j| j.id);
                print_jobs(&jobs, "No jobs posted yet.", |job| {
                    if selected.as_deref() == Some(job.id.as_str()) {
                        "SELECTED".into()
                    } else {
                        format!("{} open", job.openings.unwrap_or(0))
                    }
                });
            }

            ShellCommand::Select { id } => {
                let job = self.roster()?.select_by_id(&id).await?;
                print_job(&job, false);
            }

            ShellCommand::Deselect => {
                self.roster()?.clear_selection();
                println!("Selection cleared.");
            }

            ShellCommand::Post(fields) => {
                let mut posting = JobPosting::default();
                fields.apply_to(&mut posting);
                match self.roster()?.post_job(&posting).await? {
                    Some(job) => println!("Job posted successfully! ({})", job.id),
                    None => println!("Job posted successfully!"),
                }
            }

            ShellCommand::Edit { id, fields } => {
                let roster = self.roster()?;
                let current = roster.job_detail(&id).await?;
                let mut posting = JobPosting::from_job(&current);
                fields.apply_to(&mut posting);
                let job = roster.edit_job(&id, &posting).await?;
                println!("Job updated successfully!");
                print_job(&job, false);
            }

            ShellCommand::Delete { id } => {
                self.roster()?.delete_job(&id).await?;
                println!("Job deleted successfully!");
            }

            ShellCommand::Applicants { job_id, cached } => {
                let roster = self.roster()?;
                let known = if cached { roster.known_applicants(&job_id) } else { None };
                let applicants = match known {
                    Some(applicants) => applicants,
                    None => roster.applicants(&job_id).await?,
                };
                print_applicants(&applicants);
            }

            ShellCommand::Status {
                application_id,
                status,
            } => {
                let updated = self
                    .roster()?
                    .set_applicant_status(&application_id, status)
                    .await?;
                match updated {
                    Some(applicant) => println!("{} is now {}.", applicant.name, status.label()),
                    None => println!("Application {} is now {}.", application_id, status.label()),
                }
            }

            ShellCommand::Applicant { user_id } => {
                let profile = self.roster()?.applicant_profile(&user_id).await?;
                print_profile(&profile);
            }

            ShellCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    async fn profile(&mut self, command: ProfileCommands) -> Result<()> {
        let session = &self.session;
        match command {
            ProfileCommands::Show => {
                let profile = session
                    .profile()
                    .ok_or_else(|| BoardError::auth("please log in first"))?;
                print_profile(&profile);
            }

            ProfileCommands::Set {
                first_name,
                last_name,
                role,
                email,
                phone,
                location,
            } => {
                let current = session
                    .profile()
                    .ok_or_else(|| BoardError::auth("please log in first"))?;
                let mut person: Person = current.person().clone();
                let updates = [
                    (first_name, &mut person.first_name),
                    (last_name, &mut person.last_name),
                    (role, &mut person.role),
                    (email, &mut person.email),
                    (phone, &mut person.phone_number),
                    (location, &mut person.location),
                ];
                for (value, slot) in updates {
                    if let Some(value) = value {
                        *slot = value;
                    }
                }
                session.update_personal(person).await?;
                println!("Profile updated.");
            }

            ProfileCommands::AddEdu {
                school,
                degree,
                major,
                start_month,
                start_year,
                end_month,
                end_year,
                gpa,
                id,
            } => {
                let mut entry = Education::new(&school, &degree, &major);
                if let Some(id) = id {
                    entry.id = id;
                }
                entry.start_month = start_month;
                entry.start_year = Some(start_year);
                entry.end_month = end_month;
                entry.end_year = end_year;
                entry.gpa = gpa;
                let entry_id = entry.id.clone();
                session.save_education(entry).await?;
                println!("Education saved ({}).", entry_id);
            }

            ProfileCommands::RmEdu { id } => {
                session.remove_education(&id).await?;
                println!("Education removed.");
            }

            ProfileCommands::AddWork {
                company,
                position,
                location,
                kind,
                start_month,
                start_year,
                end_month,
                end_year,
                description,
                id,
            } => {
                let mut entry = WorkExperience::new(&company, &position, &location);
                if let Some(id) = id {
                    entry.id = id;
                }
                entry.kind = kind;
                entry.start_month = start_month;
                entry.start_year = Some(start_year);
                entry.end_month = end_month;
                entry.end_year = end_year;
                entry.description = description;
                let entry_id = entry.id.clone();
                session.save_work_experience(entry).await?;
                println!("Work experience saved ({}).", entry_id);
            }

            ProfileCommands::RmWork { id } => {
                session.remove_work_experience(&id).await?;
                println!("Work experience removed.");
            }
        }
        Ok(())
    }

    /// Print results from index `from` on, plus the continuation hint.
    fn print_results(&self, from: usize) {
        let Some(search) = &self.search else { return };
        let view = search.view();
        let saved = search.saved_ids();
        let page: Vec<Job> = view.results.iter().skip(from).cloned().collect();
        print_jobs(&page, "No jobs found.", |job| {
            match (job.applied_status, saved.contains(&job.id)) {
                (true, _) => "APPLIED".into(),
                (false, true) => "SAVED".into(),
                (false, false) => String::new(),
            }
        });
        if view.has_more {
            println!(
                "\n{} jobs shown. Type 'more' for the next {}.",
                view.results.len(),
                search.page_size()
            );
        } else {
            println!("\n{} jobs shown. No more jobs available.", view.results.len());
        }
    }
}

/// Print a user-visible notice for a failed command.
pub fn report(err: &anyhow::Error) {
    match err.downcast_ref::<BoardError>() {
        Some(BoardError::Validation(errors)) => {
            for e in errors.errors() {
                println!("error: {}: {}", e.field, e.message);
            }
        }
        Some(BoardError::Conflict(msg)) => println!("error: {}", msg),
        Some(e) if e.is_transient() => println!("error: {} (temporary, try again)", e),
        _ => println!("error: {}", err),
    }
}

fn print_jobs(jobs: &[Job], empty: &str, status: impl Fn(&Job) -> String) {
    if jobs.is_empty() {
        println!("{}", empty);
        return;
    }
    println!("{:<26} {:<30} {:<20} {:<18} {:<12}", "ID", "TITLE", "COMPANY", "LOCATION", "STATUS");
    println!("{}", "-".repeat(110));
    for job in jobs {
        println!(
            "{:<26} {:<30} {:<20} {:<18} {:<12}",
            truncate(&job.id, 26),
            truncate(&job.title, 28),
            truncate(&job.company.name, 18),
            truncate(&job.place(), 16),
            status(job)
        );
    }
}

fn print_job(job: &Job, saved: bool) {
    println!("Job {}", job.id);
    println!("Title: {}", job.title);
    if !job.company.name.is_empty() {
        println!("Company: {}", job.company.name);
    }
    let place = job.place();
    if !place.is_empty() {
        println!("Location: {}", place);
    }
    if let Some(kind) = &job.employment_type {
        println!("Type: {}", kind);
    }
    if let Some(salary) = &job.salary {
        println!("Salary: ${}", salary);
    }
    if let Some(openings) = job.openings {
        println!("Openings: {}", openings);
    }
    if let Some(start) = &job.start_date {
        println!("Start date: {}", start);
    }
    if let Some(deadline) = &job.app_deadline {
        println!("Apply by: {}", deadline);
    }
    if let Some(stage) = job.application_stage() {
        println!("Status: {}", stage.label());
    }
    if saved {
        println!("Saved: yes");
    }
    if !job.description.is_empty() {
        println!("\n--- Description ---\n{}", textwrap::fill(&job.description, 80));
    }
    let qualifications = job.qualification_list();
    if !qualifications.is_empty() {
        println!("\n--- Qualifications ---");
        for q in qualifications {
            println!("  - {}", q);
        }
    }
    if !job.skills.is_empty() {
        println!("\n--- Skills ---\n{}", job.skills);
    }
}

fn print_applicants(applicants: &[Applicant]) {
    if applicants.is_empty() {
        println!("No applicants yet.");
        return;
    }
    println!(
        "{:<26} {:<26} {:<22} {:<26} {:<14} {:<14}",
        "APPLICATION", "USER", "NAME", "EMAIL", "STATUS", "APPLIED"
    );
    println!("{}", "-".repeat(132));
    for a in applicants {
        println!(
            "{:<26} {:<26} {:<22} {:<26} {:<14} {:<14}",
            truncate(&a.application_id, 26),
            truncate(&a.user_id, 26),
            truncate(&a.name, 20),
            truncate(&a.email, 24),
            a.status.label(),
            a.applied_ago().unwrap_or_else(|| "-".into())
        );
    }
}

fn print_profile(profile: &Profile) {
    let person = profile.person();
    println!("{} ({})", person.full_name(), profile.user_type());
    for (label, value) in [
        ("Role", &person.role),
        ("Email", &person.email),
        ("Phone", &person.phone_number),
        ("Location", &person.location),
    ] {
        if !value.is_empty() {
            println!("{}: {}", label, value);
        }
    }

    if !person.education.is_empty() {
        println!("\nEducation:");
        for e in &person.education {
            let end = match (&e.end_month, e.end_year) {
                (Some(m), Some(y)) => format!("{} {}", m, y),
                (None, Some(y)) => y.to_string(),
                _ => "present".to_string(),
            };
            let start = e.start_year.map(|y| format!("{} {}", e.start_month, y)).unwrap_or_default();
            println!("  [{}] {} {}, {} ({} - {})", e.id, e.degree_type, e.major, e.school_name, start, end);
            if let Some(gpa) = e.gpa {
                println!("      GPA {:.2}", gpa);
            }
        }
    }

    if !person.work_experience.is_empty() {
        println!("\nWork experience:");
        for w in &person.work_experience {
            let end = match (&w.end_month, w.end_year) {
                (Some(m), Some(y)) => format!("{} {}", m, y),
                (None, Some(y)) => y.to_string(),
                _ => "present".to_string(),
            };
            let start = w.start_year.map(|y| format!("{} {}", w.start_month, y)).unwrap_or_default();
            println!(
                "  [{}] {} at {}, {} ({}; {} - {})",
                w.id, w.position, w.company, w.location, w.kind, start, end
            );
            if !w.description.is_empty() {
                for line in textwrap::fill(&w.description, 72).lines() {
                    println!("      {}", line);
                }
            }
        }
    }

    let saved = profile.saved_jobs();
    if !saved.is_empty() {
        println!("\nSaved jobs: {}", saved.join(", "));
    }
}
