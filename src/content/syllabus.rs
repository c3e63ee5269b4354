//! Syllabus sync: one rich-text body per course, stored under the course's
//! own id.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::content::{ContentDownloader, ContentType, remove_section};
use crate::env::{CourseSyncId, EnvironmentResolver};
use crate::error::SyncError;
use crate::fetch::fetch_one;
use crate::html::HtmlLocalizer;
use crate::model::ApiCourse;

pub struct SyllabusDownloader {
    resolver: Arc<dyn EnvironmentResolver>,
    localizer: HtmlLocalizer,
}

impl SyllabusDownloader {
    #[must_use]
    pub fn new(resolver: Arc<dyn EnvironmentResolver>) -> Self {
        Self {
            resolver,
            localizer: HtmlLocalizer::new(ContentType::Syllabus.section_name()),
        }
    }
}

#[async_trait]
impl ContentDownloader for SyllabusDownloader {
    fn content_type(&self) -> ContentType {
        ContentType::Syllabus
    }

    #[instrument(skip(self), fields(course = %course))]
    async fn get_content(&self, course: &CourseSyncId) -> Result<(), SyncError> {
        let env = self.resolver.environment(course);
        let record: ApiCourse = fetch_one(
            &env,
            &format!(
                "/api/v1/courses/{}?include[]=syllabus_body",
                course.value
            ),
        )
        .await?;

        if let Some(body) = &record.syllabus_body {
            self.localizer
                .localize_and_save(&env, course, &course.value, body, Some(env.base_url()))
                .await?;
        } else {
            debug!(course = %course, "course has no syllabus body");
        }
        Ok(())
    }

    async fn clean_content(&self, course: &CourseSyncId) {
        let env = self.resolver.environment(course);
        remove_section(&env, course, self.content_type().section_name()).await;
    }
}
