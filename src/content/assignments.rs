//! Assignment sync: each assignment's description is localized like any
//! other rich-text body.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::content::{ContentDownloader, ContentType, remove_section};
use crate::env::{CourseSyncId, EnvironmentResolver};
use crate::error::SyncError;
use crate::fetch::fetch_all;
use crate::html::HtmlLocalizer;
use crate::model::ApiAssignment;

pub struct AssignmentsDownloader {
    resolver: Arc<dyn EnvironmentResolver>,
    localizer: HtmlLocalizer,
}

impl AssignmentsDownloader {
    #[must_use]
    pub fn new(resolver: Arc<dyn EnvironmentResolver>) -> Self {
        Self {
            resolver,
            localizer: HtmlLocalizer::new(ContentType::Assignments.section_name()),
        }
    }
}

#[async_trait]
impl ContentDownloader for AssignmentsDownloader {
    fn content_type(&self) -> ContentType {
        ContentType::Assignments
    }

    #[instrument(skip(self), fields(course = %course))]
    async fn get_content(&self, course: &CourseSyncId) -> Result<(), SyncError> {
        let env = self.resolver.environment(course);
        let assignments: Vec<ApiAssignment> =
            fetch_all(&env, &format!("/api/v1/courses/{}/assignments", course.value)).await?;
        debug!(course = %course, count = assignments.len(), "assignments fetched");

        for assignment in &assignments {
            if let Some(description) = &assignment.description {
                self.localizer
                    .localize_and_save(
                        &env,
                        course,
                        &assignment.id.to_string(),
                        description,
                        Some(env.base_url()),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn clean_content(&self, course: &CourseSyncId) {
        let env = self.resolver.environment(course);
        remove_section(&env, course, self.content_type().section_name()).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::env::{Environment, LoginSession, StaticEnvironmentResolver};

    #[tokio::test]
    async fn test_assignment_descriptions_are_persisted_per_assignment() {
        let server = MockServer::start().await;
        let temp = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/api/v1/courses/1/assignments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": 8, "name": "Essay", "description": "<p>write it</p>" },
                { "id": 9, "name": "No handout" }
            ])))
            .mount(&server)
            .await;

        let env = Environment::new(
            url::Url::parse(&server.uri()).unwrap(),
            Some(LoginSession {
                unique_id: "s".into(),
            }),
            temp.path().to_path_buf(),
        );
        AssignmentsDownloader::new(StaticEnvironmentResolver::shared(env))
            .get_content(&CourseSyncId::new("1"))
            .await
            .unwrap();

        let body = temp
            .path()
            .join("s/Offline/course-1/assignments/assignments-8/body.html");
        assert_eq!(std::fs::read_to_string(body).unwrap(), "<p>write it</p>");
        // Description-less assignments write nothing.
        assert!(
            !temp
                .path()
                .join("s/Offline/course-1/assignments/assignments-9")
                .exists()
        );
    }
}
