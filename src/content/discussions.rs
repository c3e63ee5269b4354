//! Discussion topic sync, shared with announcements.
//!
//! Topics are fetched as a collection; each topic's body and attachments
//! are localized, and topics that actually have replies (and are not
//! anonymous) additionally get their full view fetched and every nested
//! entry localized. Topics are processed one at a time; the per-record
//! asset downloads inside the localizer provide the concurrency.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::content::{ContentDownloader, ContentType, remove_section};
use crate::env::{CourseSyncId, Environment, EnvironmentResolver};
use crate::error::SyncError;
use crate::fetch::{fetch_all, fetch_one};
use crate::html::HtmlLocalizer;
use crate::model::{ApiDiscussionEntry, ApiDiscussionTopic, ApiDiscussionView};

pub struct DiscussionsDownloader {
    resolver: Arc<dyn EnvironmentResolver>,
    localizer: HtmlLocalizer,
}

impl DiscussionsDownloader {
    #[must_use]
    pub fn new(resolver: Arc<dyn EnvironmentResolver>) -> Self {
        Self {
            resolver,
            localizer: HtmlLocalizer::new(ContentType::Discussions.section_name()),
        }
    }
}

#[async_trait]
impl ContentDownloader for DiscussionsDownloader {
    fn content_type(&self) -> ContentType {
        ContentType::Discussions
    }

    #[instrument(skip(self), fields(course = %course))]
    async fn get_content(&self, course: &CourseSyncId) -> Result<(), SyncError> {
        let env = self.resolver.environment(course);
        let path = format!("/api/v1/courses/{}/discussion_topics", course.value);
        sync_topics(&env, course, &self.localizer, &path).await
    }

    async fn clean_content(&self, course: &CourseSyncId) {
        let env = self.resolver.environment(course);
        remove_section(&env, course, self.content_type().section_name()).await;
    }
}

/// Fetches and localizes every topic behind `path`.
///
/// Announcements reuse this with their own listing path and section.
pub(crate) async fn sync_topics(
    env: &Environment,
    course: &CourseSyncId,
    localizer: &HtmlLocalizer,
    path: &str,
) -> Result<(), SyncError> {
    let topics: Vec<ApiDiscussionTopic> = fetch_all(env, path).await?;
    debug!(course = %course, count = topics.len(), section = localizer.section_name(), "topics fetched");

    for topic in &topics {
        sync_topic(env, course, localizer, topic).await?;
    }
    Ok(())
}

async fn sync_topic(
    env: &Environment,
    course: &CourseSyncId,
    localizer: &HtmlLocalizer,
    topic: &ApiDiscussionTopic,
) -> Result<(), SyncError> {
    let topic_id = topic.id.to_string();

    if let Some(message) = &topic.message {
        localizer
            .localize_and_save(env, course, &topic_id, message, Some(env.base_url()))
            .await?;
    }
    for attachment in &topic.attachments {
        if let Some(url) = &attachment.url {
            localizer
                .download_attachment(env, course, &topic_id, url)
                .await?;
        }
    }

    // Reply fetches are gated: empty topics and anonymous topics never hit
    // the view endpoint.
    if topic.wants_full_view() {
        let view: ApiDiscussionView = fetch_one(
            env,
            &format!(
                "/api/v1/courses/{}/discussion_topics/{topic_id}/view",
                course.value
            ),
        )
        .await?;
        localize_entries(env, course, localizer, &topic_id, &view.view).await?;
    }
    Ok(())
}

/// Localizes entry messages and attachments, recursing through nested
/// replies. Rewritten entry bodies flow to the read-side cache, which is an
/// external collaborator; the point here is caching their assets.
fn localize_entries<'a>(
    env: &'a Environment,
    course: &'a CourseSyncId,
    localizer: &'a HtmlLocalizer,
    topic_id: &'a str,
    entries: &'a [ApiDiscussionEntry],
) -> Pin<Box<dyn Future<Output = Result<(), SyncError>> + Send + 'a>> {
    Box::pin(async move {
        for entry in entries {
            if let Some(message) = &entry.message {
                localizer
                    .localize(env, course, topic_id, message, Some(env.base_url()))
                    .await?;
            }
            if let Some(attachment) = &entry.attachment {
                if let Some(url) = &attachment.url {
                    localizer
                        .download_attachment(env, course, topic_id, url)
                        .await?;
                }
            }
            localize_entries(env, course, localizer, topic_id, &entry.replies).await?;
        }
        Ok(())
    })
}
