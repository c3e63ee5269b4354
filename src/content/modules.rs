//! Module sync and associated-content resolution.
//!
//! Module records only carry pointers; the content they reference (pages,
//! quizzes, files) is fetched by exactly one handler per asset type that is
//! actually present among the items. Each handler first collects the
//! distinct identifiers of its type across all modules, so no referenced
//! asset is fetched twice, then works through them one at a time — the
//! per-item chain is a deliberate throttle against the backend.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, instrument};

use crate::content::{ContentDownloader, ContentType, remove_section};
use crate::env::{CourseSyncId, Environment, EnvironmentResolver};
use crate::error::SyncError;
use crate::fetch::{fetch_all, fetch_one};
use crate::files::FileSync;
use crate::html::HtmlLocalizer;
use crate::model::{ApiFile, ApiModule, ApiModuleItem, ApiPage, ApiQuiz, ModuleItemType};

pub struct ModulesDownloader {
    resolver: Arc<dyn EnvironmentResolver>,
    file_sync: FileSync,
}

impl ModulesDownloader {
    #[must_use]
    pub fn new(resolver: Arc<dyn EnvironmentResolver>) -> Self {
        let file_sync = FileSync::new(Arc::clone(&resolver));
        Self { resolver, file_sync }
    }

    /// Fetches the content referenced by page items, into the shared pages
    /// section so the result is indistinguishable from a page sync.
    async fn sync_page_items(
        &self,
        env: &Environment,
        course: &CourseSyncId,
        items: &[&ApiModuleItem],
    ) -> Result<(), SyncError> {
        let localizer = HtmlLocalizer::new(ContentType::Pages.section_name());
        let slugs = distinct(items.iter().filter_map(|item| {
            (item.item_type == ModuleItemType::Page)
                .then(|| item.page_url.clone())
                .flatten()
        }));

        for slug in slugs {
            let page: ApiPage = fetch_one(
                env,
                &format!("/api/v1/courses/{}/pages/{slug}", course.value),
            )
            .await?;
            if let Some(body) = &page.body {
                localizer
                    .localize_and_save(
                        env,
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

    async fn sync_quiz_items(
        &self,
        env: &Environment,
        course: &CourseSyncId,
        items: &[&ApiModuleItem],
    ) -> Result<(), SyncError> {
        let localizer = HtmlLocalizer::new(ContentType::Quizzes.section_name());
        let ids = distinct(items.iter().filter_map(|item| {
            (item.item_type == ModuleItemType::Quiz)
                .then(|| item.content_id.clone())
                .flatten()
        }));

        for id in ids {
            let quiz: ApiQuiz = fetch_one(
                env,
                &format!("/api/v1/courses/{}/quizzes/{id}", course.value),
            )
            .await?;
            if let Some(description) = &quiz.description {
                localizer
                    .localize_and_save(
                        env,
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

    async fn sync_file_items(
        &self,
        env: &Environment,
        course: &CourseSyncId,
        items: &[&ApiModuleItem],
    ) -> Result<(), SyncError> {
        let ids = distinct(items.iter().filter_map(|item| {
            (item.item_type == ModuleItemType::File)
                .then(|| item.content_id.clone())
                .flatten()
        }));

        for id in ids {
            let file: ApiFile = fetch_one(
                env,
                &format!("/api/v1/courses/{}/files/{id}", course.value),
            )
            .await?;
            let (Some(url), Some(mime_class)) = (&file.url, &file.mime_class) else {
                debug!(course = %course, file_id = %file.id, "module file has no download URL, skipping");
                continue;
            };
            let mut progress = self.file_sync.download_file(
                course,
                url,
                &file.id.to_string(),
                &file.file_name(),
                mime_class,
                file.updated_at,
            );
            while let Some(step) = progress.next().await {
                step?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ContentDownloader for ModulesDownloader {
    fn content_type(&self) -> ContentType {
        ContentType::Modules
    }

    #[instrument(skip(self), fields(course = %course))]
    async fn get_content(&self, course: &CourseSyncId) -> Result<(), SyncError> {
        let env = self.resolver.environment(course);
        let modules: Vec<ApiModule> = fetch_all(
            &env,
            &format!("/api/v1/courses/{}/modules?include[]=items", course.value),
        )
        .await?;

        let items: Vec<&ApiModuleItem> = modules.iter().flat_map(|m| &m.items).collect();
        let present: HashSet<ModuleItemType> = items.iter().map(|item| item.item_type).collect();
        debug!(
            course = %course,
            modules = modules.len(),
            items = items.len(),
            "modules fetched"
        );

        // Exactly one handler per asset type actually present. Sub-headers
        // are structural, and "other" items (external tools, URLs) have no
        // offline content of their own.
        if present.contains(&ModuleItemType::Page) {
            self.sync_page_items(&env, course, &items).await?;
        }
        if present.contains(&ModuleItemType::Quiz) {
            self.sync_quiz_items(&env, course, &items).await?;
        }
        if present.contains(&ModuleItemType::File) {
            self.sync_file_items(&env, course, &items).await?;
        }
        Ok(())
    }

    async fn clean_content(&self, course: &CourseSyncId) {
        let env = self.resolver.environment(course);
        remove_section(&env, course, self.content_type().section_name()).await;
    }
}

/// First-occurrence deduplication preserving item order.
fn distinct<T: std::hash::Hash + Eq + Clone>(values: impl Iterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    values.filter(|value| seen.insert(value.clone())).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::env::{Environment, LoginSession, StaticEnvironmentResolver};

    fn downloader(server: &MockServer, root: &std::path::Path) -> ModulesDownloader {
        let env = Environment::new(
            url::Url::parse(&server.uri()).unwrap(),
            Some(LoginSession {
                unique_id: "s".into(),
            }),
            root.to_path_buf(),
        );
        ModulesDownloader::new(StaticEnvironmentResolver::shared(env))
    }

    #[test]
    fn test_distinct_preserves_first_occurrence_order() {
        let values = distinct(vec!["b", "a", "b", "c", "a"].into_iter());
        assert_eq!(values, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_quiz_handler_not_invoked_without_quiz_items() {
        let server = MockServer::start().await;
        let temp = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/api/v1/courses/1/modules"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "id": 1,
                    "items": [
                        { "id": 10, "type": "Page", "page_url": "week-1" },
                        { "id": 11, "type": "File", "content_id": 77 },
                        { "id": 12, "type": "SubHeader" }
                    ]
                }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/1/pages/week-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(
                { "page_id": 5, "url": "week-1", "body": "<p>w1</p>" }
            )))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/1/files/77"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(
                { "id": 77, "display_name": "notes.pdf", "url": format!("{}/dl/77", server.uri()), "mime_class": "pdf" }
            )))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/dl/77"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"pdf bytes".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/api/v1/courses/1/quizzes/.*$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(0)
            .mount(&server)
            .await;

        downloader(&server, temp.path())
            .get_content(&CourseSyncId::new("1"))
            .await
            .unwrap();

        let file = temp
            .path()
            .join("s/Offline/Files/course-1/file-77/notes.pdf");
        assert_eq!(std::fs::read(file).unwrap(), b"pdf bytes");
    }

    #[tokio::test]
    async fn test_duplicate_item_references_fetch_once() {
        let server = MockServer::start().await;
        let temp = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/api/v1/courses/1/modules"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": 1, "items": [ { "id": 10, "type": "Page", "page_url": "week-1" } ] },
                { "id": 2, "items": [ { "id": 20, "type": "Page", "page_url": "week-1" } ] }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/1/pages/week-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(
                { "page_id": 5, "url": "week-1", "body": "<p>w1</p>" }
            )))
            .expect(1)
            .mount(&server)
            .await;

        downloader(&server, temp.path())
            .get_content(&CourseSyncId::new("1"))
            .await
            .unwrap();
    }
}
