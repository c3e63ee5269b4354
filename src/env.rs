//! Environment and course identity for one sync pass.
//!
//! Every operation in the engine resolves its API host, login session, and
//! offline directory layout from an [`Environment`], which is itself a pure
//! function of a [`CourseSyncId`] via [`EnvironmentResolver`]. Resolution
//! happens once per operation; nothing is read from globals mid-pass.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use url::Url;

use crate::error::SyncError;

/// Connect timeout for API and download requests, in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Read timeout, in seconds. Generous because video attachments can be large.
const READ_TIMEOUT_SECS: u64 = 300;

/// Identifies a course bound to the environment it must be fetched from.
///
/// Every downstream fetch within one sync pass for this course uses the same
/// `CourseSyncId`. The optional host covers cross-tenant courses whose API
/// lives on a different instance than the login session's default.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CourseSyncId {
    /// The course identifier as the API knows it.
    pub value: String,
    /// API host override for cross-tenant courses.
    pub host: Option<String>,
}

impl CourseSyncId {
    /// Creates a course identity on the resolver's default environment.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            host: None,
        }
    }

    /// Creates a course identity pinned to a specific API host.
    pub fn with_host(value: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            host: Some(host.into()),
        }
    }
}

impl std::fmt::Display for CourseSyncId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

/// The login session a course's content is downloaded under.
#[derive(Debug, Clone)]
pub struct LoginSession {
    /// Unique session identifier, namespacing the offline directory tree.
    pub unique_id: String,
}

/// API host, session, and offline storage root for one course environment.
///
/// The embedded HTTP client is created once and shared (reqwest clients are
/// cheap to clone and pool connections internally).
#[derive(Debug, Clone)]
pub struct Environment {
    base_url: Url,
    session: Option<LoginSession>,
    offline_root: PathBuf,
    http: Client,
}

impl Environment {
    /// Creates an environment for the given API base URL.
    ///
    /// `offline_root` is the directory all offline content for this
    /// environment is stored under (the app's documents directory).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(base_url: Url, session: Option<LoginSession>, offline_root: PathBuf) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            base_url,
            session,
            offline_root,
            http,
        }
    }

    /// The API base URL of this environment.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The API host, used to decide which embedded references are ours.
    #[must_use]
    pub fn api_host(&self) -> Option<&str> {
        self.base_url.host_str()
    }

    /// The current login session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&LoginSession> {
        self.session.as_ref()
    }

    /// The session's unique identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoSession`] when no session is available; this is
    /// checked before any download starts.
    pub fn session_id(&self) -> Result<&str, SyncError> {
        self.session
            .as_ref()
            .map(|s| s.unique_id.as_str())
            .ok_or(SyncError::NoSession)
    }

    /// The shared HTTP client.
    #[must_use]
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Resolves a possibly-relative path or URL against the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidUrl`] if the value cannot be resolved.
    pub fn absolute_url(&self, value: &str) -> Result<Url, SyncError> {
        self.base_url
            .join(value)
            .map_err(|_| SyncError::invalid_url(value))
    }

    // Offline directory layout. All paths are namespaced by the session so
    // that switching users never mixes cached content.

    /// Root of all offline content for one course:
    /// `{root}/{sessionId}/Offline/course-{courseId}`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoSession`] when no session is available.
    pub fn course_root(&self, course: &CourseSyncId) -> Result<PathBuf, SyncError> {
        let session_id = self.session_id()?;
        Ok(self
            .offline_root
            .join(session_id)
            .join("Offline")
            .join(format!("course-{}", course.value)))
    }

    /// Root of a content section within a course, e.g. `.../pages`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoSession`] when no session is available.
    pub fn section_root(&self, course: &CourseSyncId, section: &str) -> Result<PathBuf, SyncError> {
        Ok(self.course_root(course)?.join(section))
    }

    /// Folder holding one record's localized assets and rewritten body:
    /// `.../{section}/{section}-{resourceId}`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoSession`] when no session is available.
    pub fn resource_folder(
        &self,
        course: &CourseSyncId,
        section: &str,
        resource_id: &str,
    ) -> Result<PathBuf, SyncError> {
        Ok(self
            .section_root(course, section)?
            .join(format!("{section}-{resource_id}")))
    }

    /// Root of a course's downloaded files:
    /// `{root}/{sessionId}/Offline/Files/course-{courseId}`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoSession`] when no session is available.
    pub fn files_root(&self, course: &CourseSyncId) -> Result<PathBuf, SyncError> {
        let session_id = self.session_id()?;
        Ok(self
            .offline_root
            .join(session_id)
            .join("Offline")
            .join("Files")
            .join(format!("course-{}", course.value)))
    }

    /// Folder holding one downloaded file: `.../file-{fileId}`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoSession`] when no session is available.
    pub fn file_folder(&self, course: &CourseSyncId, file_id: &str) -> Result<PathBuf, SyncError> {
        Ok(self.files_root(course)?.join(format!("file-{file_id}")))
    }

    /// Studio video storage shared by every course in this environment:
    /// `{root}/{sessionId}/Offline/studio`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoSession`] when no session is available.
    pub fn studio_directory(&self) -> Result<PathBuf, SyncError> {
        let session_id = self.session_id()?;
        Ok(self
            .offline_root
            .join(session_id)
            .join("Offline")
            .join("studio"))
    }
}

/// Resolves the environment a course must be fetched from.
///
/// Implementations are pure lookups: resolving the same [`CourseSyncId`]
/// twice within one pass yields the same environment.
pub trait EnvironmentResolver: Send + Sync {
    /// Returns the environment for the given course.
    fn environment(&self, course: &CourseSyncId) -> Environment;
}

/// Resolver for the common single-tenant case: every course lives on one
/// environment.
#[derive(Debug, Clone)]
pub struct StaticEnvironmentResolver {
    environment: Environment,
}

impl StaticEnvironmentResolver {
    /// Wraps a single environment.
    #[must_use]
    pub fn new(environment: Environment) -> Self {
        Self { environment }
    }

    /// Convenience constructor returning the resolver ready for trait-object
    /// dispatch.
    #[must_use]
    pub fn shared(environment: Environment) -> Arc<dyn EnvironmentResolver> {
        Arc::new(Self::new(environment))
    }
}

impl EnvironmentResolver for StaticEnvironmentResolver {
    fn environment(&self, _course: &CourseSyncId) -> Environment {
        self.environment.clone()
    }
}
