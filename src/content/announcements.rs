//! Announcement sync.
//!
//! Announcements are discussion topics behind a filtered listing, so the
//! whole topic pipeline (body, attachments, gated reply views) is reused;
//! only the listing path and the offline section differ.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::content::discussions::sync_topics;
use crate::content::{ContentDownloader, ContentType, remove_section};
use crate::env::{CourseSyncId, EnvironmentResolver};
use crate::error::SyncError;
use crate::html::HtmlLocalizer;

pub struct AnnouncementsDownloader {
    resolver: Arc<dyn EnvironmentResolver>,
    localizer: HtmlLocalizer,
}

impl AnnouncementsDownloader {
    #[must_use]
    pub fn new(resolver: Arc<dyn EnvironmentResolver>) -> Self {
        Self {
            resolver,
            localizer: HtmlLocalizer::new(ContentType::Announcements.section_name()),
        }
    }
}

#[async_trait]
impl ContentDownloader for AnnouncementsDownloader {
    fn content_type(&self) -> ContentType {
        ContentType::Announcements
    }

    #[instrument(skip(self), fields(course = %course))]
    async fn get_content(&self, course: &CourseSyncId) -> Result<(), SyncError> {
        let env = self.resolver.environment(course);
        let path = format!(
            "/api/v1/courses/{}/discussion_topics?only_announcements=true",
            course.value
        );
        sync_topics(&env, course, &self.localizer, &path).await
    }

    async fn clean_content(&self, course: &CourseSyncId) {
        let env = self.resolver.environment(course);
        remove_section(&env, course, self.content_type().section_name()).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::env::{Environment, LoginSession, StaticEnvironmentResolver};

    #[tokio::test]
    async fn test_announcements_use_filtered_listing_and_own_section() {
        let server = MockServer::start().await;
        let temp = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/api/v1/courses/1/discussion_topics"))
            .and(query_param("only_announcements", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": 3, "message": "<p>snow day</p>", "discussion_subentry_count": 0 }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let env = Environment::new(
            url::Url::parse(&server.uri()).unwrap(),
            Some(LoginSession {
                unique_id: "s".into(),
            }),
            temp.path().to_path_buf(),
        );
        AnnouncementsDownloader::new(StaticEnvironmentResolver::shared(env))
            .get_content(&CourseSyncId::new("1"))
            .await
            .unwrap();

        let body = temp
            .path()
            .join("s/Offline/course-1/announcements/announcements-3/body.html");
        assert_eq!(std::fs::read_to_string(body).unwrap(), "<p>snow day</p>");
    }
}
