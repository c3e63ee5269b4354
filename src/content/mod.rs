//! Per-content-type downloaders.
//!
//! Each course content type (pages, discussions, quizzes, ...) has one
//! downloader behind the [`ContentDownloader`] trait. A sync pass
//! instantiates downloaders for the types the course has enabled and runs
//! `get_content` on each; `clean_content` wipes the type's offline section
//! and never fails.

pub mod announcements;
pub mod assignments;
pub mod conferences;
pub mod discussions;
pub mod grades;
pub mod modules;
pub mod pages;
pub mod people;
pub mod quizzes;
pub mod syllabus;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::env::{CourseSyncId, Environment, EnvironmentResolver};
use crate::error::SyncError;

pub use announcements::AnnouncementsDownloader;
pub use assignments::AssignmentsDownloader;
pub use conferences::ConferencesDownloader;
pub use discussions::DiscussionsDownloader;
pub use grades::GradesDownloader;
pub use modules::ModulesDownloader;
pub use pages::PagesDownloader;
pub use people::PeopleDownloader;
pub use quizzes::QuizzesDownloader;
pub use syllabus::SyllabusDownloader;

/// The course content types the engine can sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Announcements,
    Assignments,
    Conferences,
    Discussions,
    Grades,
    Modules,
    Pages,
    People,
    Quizzes,
    Syllabus,
}

impl ContentType {
    /// Every supported content type, in sync order.
    pub const ALL: [ContentType; 10] = [
        ContentType::Announcements,
        ContentType::Assignments,
        ContentType::Conferences,
        ContentType::Discussions,
        ContentType::Grades,
        ContentType::Modules,
        ContentType::Pages,
        ContentType::People,
        ContentType::Quizzes,
        ContentType::Syllabus,
    ];

    /// The section namespace this type's offline content lives under.
    #[must_use]
    pub fn section_name(self) -> &'static str {
        match self {
            ContentType::Announcements => "announcements",
            ContentType::Assignments => "assignments",
            ContentType::Conferences => "conferences",
            ContentType::Discussions => "discussions",
            ContentType::Grades => "grades",
            ContentType::Modules => "modules",
            ContentType::Pages => "pages",
            ContentType::People => "people",
            ContentType::Quizzes => "quizzes",
            ContentType::Syllabus => "syllabus",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.section_name())
    }
}

/// One content type's sync behavior.
///
/// `get_content` surfaces errors so the orchestrator can mark the course's
/// sync as failed; `clean_content` is best-effort and always completes.
#[async_trait]
pub trait ContentDownloader: Send + Sync {
    /// The content type this downloader handles.
    fn content_type(&self) -> ContentType;

    /// Fetches and localizes every record of this content type.
    async fn get_content(&self, course: &CourseSyncId) -> Result<(), SyncError>;

    /// Removes this content type's offline section for the course.
    async fn clean_content(&self, course: &CourseSyncId);
}

/// Builds one downloader per requested content type.
#[must_use]
pub fn downloaders_for(
    resolver: &Arc<dyn EnvironmentResolver>,
    types: &[ContentType],
) -> Vec<Box<dyn ContentDownloader>> {
    types
        .iter()
        .map(|ty| downloader_for(Arc::clone(resolver), *ty))
        .collect()
}

fn downloader_for(
    resolver: Arc<dyn EnvironmentResolver>,
    ty: ContentType,
) -> Box<dyn ContentDownloader> {
    match ty {
        ContentType::Announcements => Box::new(AnnouncementsDownloader::new(resolver)),
        ContentType::Assignments => Box::new(AssignmentsDownloader::new(resolver)),
        ContentType::Conferences => Box::new(ConferencesDownloader::new(resolver)),
        ContentType::Discussions => Box::new(DiscussionsDownloader::new(resolver)),
        ContentType::Grades => Box::new(GradesDownloader::new(resolver)),
        ContentType::Modules => Box::new(ModulesDownloader::new(resolver)),
        ContentType::Pages => Box::new(PagesDownloader::new(resolver)),
        ContentType::People => Box::new(PeopleDownloader::new(resolver)),
        ContentType::Quizzes => Box::new(QuizzesDownloader::new(resolver)),
        ContentType::Syllabus => Box::new(SyllabusDownloader::new(resolver)),
    }
}

/// Shared `clean_content` implementation: removes one section's directory.
///
/// Deletion errors are logged and swallowed; cleanup always completes.
pub(crate) async fn remove_section(env: &Environment, course: &CourseSyncId, section: &str) {
    let root = match env.section_root(course, section) {
        Ok(root) => root,
        Err(error) => {
            warn!(course = %course, section, error = %error, "skipping section cleanup");
            return;
        }
    };
    match tokio::fs::remove_dir_all(&root).await {
        Ok(()) => debug!(course = %course, section, "section removed"),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => {
            warn!(path = %root.display(), error = %error, "section cleanup failed");
        }
    }
}
