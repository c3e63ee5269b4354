//! Grade sync.
//!
//! Grades carry no rich text; the work here is grading-period resolution.
//! The course is fetched first (with enrollments) to find the viewing
//! user's current grading period, then enrollments and graded assignment
//! groups are fetched concurrently, both parameterized by the optional
//! period id. A course without grading periods is a valid state, not an
//! error.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::try_join;
use tracing::{debug, instrument};

use crate::content::{ContentDownloader, ContentType, remove_section};
use crate::env::{CourseSyncId, EnvironmentResolver};
use crate::error::SyncError;
use crate::fetch::{fetch_all, fetch_one};
use crate::model::{ApiAssignmentGroup, ApiCourse, ApiEnrollment};

pub struct GradesDownloader {
    resolver: Arc<dyn EnvironmentResolver>,
}

impl GradesDownloader {
    #[must_use]
    pub fn new(resolver: Arc<dyn EnvironmentResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl ContentDownloader for GradesDownloader {
    fn content_type(&self) -> ContentType {
        ContentType::Grades
    }

    #[instrument(skip(self), fields(course = %course))]
    async fn get_content(&self, course: &CourseSyncId) -> Result<(), SyncError> {
        let env = self.resolver.environment(course);
        let record: ApiCourse = fetch_one(
            &env,
            &format!(
                "/api/v1/courses/{}?include[]=current_grading_period_scores",
                course.value
            ),
        )
        .await?;
        let period_id = record.current_grading_period_id();

        let mut enrollments_path = format!(
            "/api/v1/courses/{}/enrollments?include[]=current_grading_period_scores",
            course.value
        );
        let mut groups_path = format!(
            "/api/v1/courses/{}/assignment_groups?include[]=assignments&include[]=submission",
            course.value
        );
        if let Some(period_id) = period_id {
            enrollments_path.push_str(&format!("&grading_period_id={period_id}"));
            groups_path.push_str(&format!("&grading_period_id={period_id}"));
        }

        let (enrollments, groups) = try_join!(
            fetch_all::<ApiEnrollment>(&env, &enrollments_path),
            fetch_all::<ApiAssignmentGroup>(&env, &groups_path),
        )?;

        debug!(
            course = %course,
            grading_period = ?period_id,
            enrollments = enrollments.len(),
            assignment_groups = groups.len(),
            "grades fetched"
        );
        Ok(())
    }

    async fn clean_content(&self, course: &CourseSyncId) {
        let env = self.resolver.environment(course);
        remove_section(&env, course, self.content_type().section_name()).await;
    }
}
