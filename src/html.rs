//! HTML asset localization.
//!
//! Rich-text bodies reference images, file links, and attachments on the API
//! host. For offline use every such reference is downloaded into the
//! record's course-scoped folder and the HTML is rewritten to point at the
//! local copy. A single failed asset fails the whole record — a page
//! referencing a half-downloaded image is worse than a page that isn't
//! synced at all — so nothing is persisted until every download succeeded.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::LazyLock;

use futures_util::{StreamExt, TryStreamExt, stream};
use regex::Regex;
use tracing::{debug, instrument};
use url::Url;

use crate::env::{CourseSyncId, Environment};
use crate::error::SyncError;
use crate::fetch::fetch_one;
use crate::model::ApiFile;

/// Upper bound on concurrent asset downloads per record.
const MAX_CONCURRENT_ASSETS: usize = 5;

/// Name the rewritten body is persisted under inside the resource folder.
const BASE_CONTENT_FILE: &str = "body.html";

#[allow(clippy::expect_used)]
static IMAGE_SRC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<img[^>]*src="([^"]*)"[^>]*>"#).expect("image src regex is valid")
});

/// File links inserted by the rich content editor carry this class.
#[allow(clippy::expect_used)]
static FILE_LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a[^>]*class="instructure_file_link[^>]*href="([^"]*)"[^>]*>"#)
        .expect("file link regex is valid")
});

/// Host-less `src`/`href` values, normalized against the record's base URL
/// before the absolute-URL rewrite step.
#[allow(clippy::expect_used)]
static RELATIVE_REF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:src|href)="(/[^"]+)""#).expect("relative ref regex is valid")
});

/// How a discovered reference was found; file links get URL normalization
/// that plain image sources do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefKind {
    Image,
    FileLink,
}

/// Localizes the embedded assets of one content section's records.
///
/// The section name namespaces the destination folders so that writers for
/// distinct content types never touch the same sub-path.
#[derive(Debug, Clone)]
pub struct HtmlLocalizer {
    section_name: String,
}

impl HtmlLocalizer {
    /// Creates a localizer writing under the given section namespace.
    pub fn new(section_name: impl Into<String>) -> Self {
        Self {
            section_name: section_name.into(),
        }
    }

    /// The section namespace this localizer writes under.
    #[must_use]
    pub fn section_name(&self) -> &str {
        &self.section_name
    }

    /// Downloads every embedded asset of `html` and rewrites the references
    /// to course-root-relative local paths, returning the rewritten string.
    ///
    /// The caller is responsible for persisting the result (see
    /// [`save_base_content`](Self::save_base_content)).
    ///
    /// # Errors
    ///
    /// Propagates the first asset download failure; the record is then
    /// treated as not synced.
    #[instrument(skip(self, env, html), fields(section = %self.section_name, course = %course, resource_id))]
    pub async fn localize(
        &self,
        env: &Environment,
        course: &CourseSyncId,
        resource_id: &str,
        html: &str,
        base_url: Option<&Url>,
    ) -> Result<String, SyncError> {
        let image_refs = capture_refs(&IMAGE_SRC_PATTERN, html);
        let file_refs = dedup(capture_refs(&FILE_LINK_PATTERN, html));
        let targets: Vec<(String, RefKind)> = file_refs
            .into_iter()
            .map(|raw| (raw, RefKind::FileLink))
            .chain(image_refs.into_iter().map(|raw| (raw, RefKind::Image)))
            .filter(|(raw, _)| is_on_api_host(env, raw))
            .collect();

        // Host-less references not already claimed as downloadable assets are
        // only absolutized, never downloaded.
        let relative_refs: Vec<String> = capture_refs(&RELATIVE_REF_PATTERN, html)
            .into_iter()
            .filter(|raw| Url::parse(raw).is_err())
            .filter(|raw| !targets.iter().any(|(target, _)| target == raw))
            .collect();

        debug!(
            assets = targets.len(),
            relative = relative_refs.len(),
            "embedded references discovered"
        );

        let replacements: Vec<(String, String)> = stream::iter(targets)
            .map(|(raw, kind)| async move {
                let url = env.absolute_url(&raw)?;
                let download_url = match kind {
                    RefKind::FileLink => normalize_file_link(env, url).await?,
                    RefKind::Image => url,
                };
                let local = self
                    .download_asset(env, course, resource_id, &download_url)
                    .await?;
                Ok::<_, SyncError>((raw, local))
            })
            .buffered(MAX_CONCURRENT_ASSETS)
            .try_collect()
            .await?;

        let mut content = html.to_string();
        if let Some(base) = base_url {
            for relative in &relative_refs {
                if let Ok(absolute) = base.join(relative) {
                    content = content.replace(relative.as_str(), absolute.as_str());
                }
            }
        }
        for (original, local) in &replacements {
            content = content.replace(original.as_str(), local.as_str());
        }

        Ok(content)
    }

    /// Localizes a body and persists the rewritten HTML in one step.
    ///
    /// # Errors
    ///
    /// Same as [`localize`](Self::localize), plus IO errors while writing
    /// the base content.
    pub async fn localize_and_save(
        &self,
        env: &Environment,
        course: &CourseSyncId,
        resource_id: &str,
        html: &str,
        base_url: Option<&Url>,
    ) -> Result<String, SyncError> {
        let content = self
            .localize(env, course, resource_id, html, base_url)
            .await?;
        self.save_base_content(env, course, resource_id, &content)
            .await?;
        Ok(content)
    }

    /// Downloads one attachment into the record's folder, returning the
    /// course-root-relative local path.
    ///
    /// # Errors
    ///
    /// Propagates download and IO failures; attachment failures fail the
    /// owning record's sync.
    pub async fn download_attachment(
        &self,
        env: &Environment,
        course: &CourseSyncId,
        resource_id: &str,
        url: &str,
    ) -> Result<String, SyncError> {
        let absolute = env.absolute_url(url)?;
        self.download_asset(env, course, resource_id, &absolute)
            .await
    }

    /// Persists a rewritten body as `body.html` inside the resource folder,
    /// to be loaded by the presentation layer in offline mode.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] on write failure.
    pub async fn save_base_content(
        &self,
        env: &Environment,
        course: &CourseSyncId,
        resource_id: &str,
        content: &str,
    ) -> Result<PathBuf, SyncError> {
        let folder = env.resource_folder(course, &self.section_name, resource_id)?;
        tokio::fs::create_dir_all(&folder)
            .await
            .map_err(|e| SyncError::io(&folder, e))?;
        let path = folder.join(BASE_CONTENT_FILE);
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| SyncError::io(&path, e))?;
        Ok(path)
    }

    /// Downloads one asset if it is not already present locally.
    ///
    /// Embedded assets carry no remote timestamp, so "already current"
    /// degrades to "file exists" here; `download_file` keeps the full
    /// mtime comparison for tree files.
    async fn download_asset(
        &self,
        env: &Environment,
        course: &CourseSyncId,
        resource_id: &str,
        url: &Url,
    ) -> Result<String, SyncError> {
        let folder = env.resource_folder(course, &self.section_name, resource_id)?;
        let name = asset_basename(url);
        let dest = folder.join(&name);
        let local_path = format!(
            "{section}/{section}-{resource_id}/{name}",
            section = self.section_name
        );

        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            debug!(path = %dest.display(), "asset already cached");
            return Ok(local_path);
        }

        tokio::fs::create_dir_all(&folder)
            .await
            .map_err(|e| SyncError::io(&folder, e))?;

        let response = env
            .http()
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SyncError::network(url.as_str(), e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::http_status(url.as_str(), status.as_u16()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SyncError::network(url.as_str(), e))?;

        // Write to a partial path and rename so a cancelled sync never
        // leaves a half-written asset behind.
        let partial = folder.join(format!("{name}.partial"));
        if let Err(e) = tokio::fs::write(&partial, &bytes).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(SyncError::io(&partial, e));
        }
        tokio::fs::rename(&partial, &dest)
            .await
            .map_err(|e| SyncError::io(&dest, e))?;

        debug!(url = %url, path = %dest.display(), bytes = bytes.len(), "asset downloaded");
        Ok(local_path)
    }
}

/// Normalizes a file link to a durable download URL.
///
/// `/files/{id}` links without a `verifier` query item are resolved through
/// the file-metadata endpoint; verifier-carrying links get a `/download`
/// suffix when missing. Anything else passes through unchanged.
async fn normalize_file_link(env: &Environment, url: Url) -> Result<Url, SyncError> {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();
    let Some(files_index) = segments.iter().position(|s| *s == "files") else {
        return Ok(url);
    };
    let Some(file_id) = segments.get(files_index + 1) else {
        return Ok(url);
    };

    let has_verifier = url.query_pairs().any(|(key, _)| key == "verifier");
    if !has_verifier {
        let file: ApiFile = fetch_one(env, &format!("/api/v1/files/{file_id}")).await?;
        return match file.url {
            Some(durable) => env.absolute_url(&durable),
            None => Ok(url),
        };
    }

    if segments.contains(&"download") {
        Ok(url)
    } else {
        let mut with_download = url.clone();
        if let Ok(mut path) = with_download.path_segments_mut() {
            path.pop_if_empty().push("download");
        }
        Ok(with_download)
    }
}

/// Whether a reference targets the current API host (relative references
/// count as ours).
fn is_on_api_host(env: &Environment, raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => url.host_str() == env.api_host(),
        // Host-less reference, resolves against the API base.
        Err(_) => raw.starts_with('/'),
    }
}

fn capture_refs(pattern: &Regex, html: &str) -> Vec<String> {
    pattern
        .captures_iter(html)
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|raw| !raw.is_empty())
        .collect()
}

fn dedup(refs: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    refs.into_iter().filter(|r| seen.insert(r.clone())).collect()
}

/// Derives the local file name for an asset from its URL.
fn asset_basename(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back().map(std::string::ToString::to_string))
        .filter(|s| !s.is_empty() && s != "download");
    if let Some(segment) = segment {
        let decoded = urlencoding::decode(&segment)
            .map(|s| s.into_owned())
            .unwrap_or(segment);
        let sanitized: String = decoded
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
            .collect();
        if !sanitized.is_empty() {
            return sanitized;
        }
    }

    // No usable basename; fall back to a stable hash of the URL.
    use std::hash::{DefaultHasher, Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    url.as_str().hash(&mut hasher);
    format!("asset-{:016x}", hasher.finish())
}
