//! Conference sync. The listing endpoint wraps its records in a
//! `conferences` envelope instead of returning a bare array.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::content::{ContentDownloader, ContentType, remove_section};
use crate::env::{CourseSyncId, EnvironmentResolver};
use crate::error::SyncError;
use crate::fetch::fetch_one;
use crate::html::HtmlLocalizer;
use crate::model::ApiConferenceList;

pub struct ConferencesDownloader {
    resolver: Arc<dyn EnvironmentResolver>,
    localizer: HtmlLocalizer,
}

impl ConferencesDownloader {
    #[must_use]
    pub fn new(resolver: Arc<dyn EnvironmentResolver>) -> Self {
        Self {
            resolver,
            localizer: HtmlLocalizer::new(ContentType::Conferences.section_name()),
        }
    }
}

#[async_trait]
impl ContentDownloader for ConferencesDownloader {
    fn content_type(&self) -> ContentType {
        ContentType::Conferences
    }

    #[instrument(skip(self), fields(course = %course))]
    async fn get_content(&self, course: &CourseSyncId) -> Result<(), SyncError> {
        let env = self.resolver.environment(course);
        let list: ApiConferenceList =
            fetch_one(&env, &format!("/api/v1/courses/{}/conferences", course.value)).await?;
        debug!(course = %course, count = list.conferences.len(), "conferences fetched");

        for conference in &list.conferences {
            if let Some(description) = &conference.description {
                self.localizer
                    .localize_and_save(
                        &env,
                        course,
                        &conference.id.to_string(),
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
