//! Roster sync: people are plain records for the read-side cache; avatars
//! are not localized.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::content::{ContentDownloader, ContentType, remove_section};
use crate::env::{CourseSyncId, EnvironmentResolver};
use crate::error::SyncError;
use crate::fetch::fetch_all;
use crate::model::ApiUser;

pub struct PeopleDownloader {
    resolver: Arc<dyn EnvironmentResolver>,
}

impl PeopleDownloader {
    #[must_use]
    pub fn new(resolver: Arc<dyn EnvironmentResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl ContentDownloader for PeopleDownloader {
    fn content_type(&self) -> ContentType {
        ContentType::People
    }

    #[instrument(skip(self), fields(course = %course))]
    async fn get_content(&self, course: &CourseSyncId) -> Result<(), SyncError> {
        let env = self.resolver.environment(course);
        let users: Vec<ApiUser> = fetch_all(
            &env,
            &format!(
                "/api/v1/courses/{}/users?include[]=avatar_url&include[]=enrollments",
                course.value
            ),
        )
        .await?;
        debug!(course = %course, count = users.len(), "roster fetched");
        Ok(())
    }

    async fn clean_content(&self, course: &CourseSyncId) {
        let env = self.resolver.environment(course);
        remove_section(&env, course, self.content_type().section_name()).await;
    }
}
