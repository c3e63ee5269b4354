//! Quiz sync: quiz descriptions are the only rich text to localize; taking
//! a quiz stays online-only.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::content::{ContentDownloader, ContentType, remove_section};
use crate::env::{CourseSyncId, EnvironmentResolver};
use crate::error::SyncError;
use crate::fetch::fetch_all;
use crate::html::HtmlLocalizer;
use crate::model::ApiQuiz;

pub struct QuizzesDownloader {
    resolver: Arc<dyn EnvironmentResolver>,
    localizer: HtmlLocalizer,
}

impl QuizzesDownloader {
    #[must_use]
    pub fn new(resolver: Arc<dyn EnvironmentResolver>) -> Self {
        Self {
            resolver,
            localizer: HtmlLocalizer::new(ContentType::Quizzes.section_name()),
        }
    }
}

#[async_trait]
impl ContentDownloader for QuizzesDownloader {
    fn content_type(&self) -> ContentType {
        ContentType::Quizzes
    }

    #[instrument(skip(self), fields(course = %course))]
    async fn get_content(&self, course: &CourseSyncId) -> Result<(), SyncError> {
        let env = self.resolver.environment(course);
        let quizzes: Vec<ApiQuiz> =
            fetch_all(&env, &format!("/api/v1/courses/{}/all_quizzes", course.value)).await?;
        debug!(course = %course, count = quizzes.len(), "quizzes fetched");

        for quiz in &quizzes {
            if let Some(description) = &quiz.description {
                self.localizer
                    .localize_and_save(
                        &env,
                        course,
                        &quiz.id.to_string(),
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
