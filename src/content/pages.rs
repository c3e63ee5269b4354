//! Wiki page sync.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::content::{ContentDownloader, ContentType, remove_section};
use crate::env::{CourseSyncId, EnvironmentResolver};
use crate::error::SyncError;
use crate::fetch::fetch_all;
use crate::html::HtmlLocalizer;
use crate::model::ApiPage;

pub struct PagesDownloader {
    resolver: Arc<dyn EnvironmentResolver>,
    localizer: HtmlLocalizer,
}

impl PagesDownloader {
    #[must_use]
    pub fn new(resolver: Arc<dyn EnvironmentResolver>) -> Self {
        Self {
            resolver,
            localizer: HtmlLocalizer::new(ContentType::Pages.section_name()),
        }
    }
}

#[async_trait]
impl ContentDownloader for PagesDownloader {
    fn content_type(&self) -> ContentType {
        ContentType::Pages
    }

    #[instrument(skip(self), fields(course = %course))]
    async fn get_content(&self, course: &CourseSyncId) -> Result<(), SyncError> {
        let env = self.resolver.environment(course);
        let pages: Vec<ApiPage> = fetch_all(
            &env,
            &format!("/api/v1/courses/{}/pages?include[]=body", course.value),
        )
        .await?;
        debug!(course = %course, count = pages.len(), "pages fetched");

        for page in &pages {
            if let Some(body) = &page.body {
                self.localizer
                    .localize_and_save(
                        &env,
                        course,
                        &page.page_id.to_string(),
                        body,
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
    async fn test_page_bodies_are_persisted_per_page() {
        let server = MockServer::start().await;
        let temp = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/api/v1/courses/1/pages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "page_id": 5, "url": "week-1", "body": "<p>week one</p>" },
                { "page_id": 6, "url": "week-2" }
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
        PagesDownloader::new(StaticEnvironmentResolver::shared(env))
            .get_content(&CourseSyncId::new("1"))
            .await
            .unwrap();

        let body = temp.path().join("s/Offline/course-1/pages/pages-5/body.html");
        assert_eq!(std::fs::read_to_string(body).unwrap(), "<p>week one</p>");
        // Body-less pages write nothing.
        assert!(!temp.path().join("s/Offline/course-1/pages/pages-6").exists());
    }
}
