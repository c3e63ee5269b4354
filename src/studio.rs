//! Cross-course Studio media aggregation.
//!
//! Studio videos are embedded through LTI iframes in course HTML and are
//! stored once per environment, in a studio directory shared by every
//! course on that environment. A sync pass therefore works on a batch of
//! courses: discover each course's iframe references and media catalog
//! concurrently, group courses by their shared directory, prune videos no
//! group member references anymore, download each referenced video at most
//! once, and rewrite every course's iframes to the local copy. One
//! course's failure never blocks its siblings.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use futures_util::StreamExt;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::env::{CourseSyncId, Environment, EnvironmentResolver};
use crate::error::SyncError;
use crate::fetch::fetch_all;
use crate::model::ApiStudioMediaItem;

/// Upper bound on concurrent per-course discovery work.
const MAX_CONCURRENT_COURSES: usize = 5;

/// Studio embed iframes carry the media identifier in their launch URL.
#[allow(clippy::expect_used)]
static STUDIO_IFRAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<iframe[^>]*custom_arc_media_id(?:%3D|=)([A-Za-z0-9_\-]+)[^>]*>\s*</iframe>"#)
        .expect("studio iframe regex is valid")
});

/// One iframe occurrence inside a course's saved offline HTML.
#[derive(Debug, Clone)]
struct StudioIframe {
    /// The full iframe tag as it appears in the file.
    source_html: String,
    /// The HTML file the occurrence lives in.
    file: PathBuf,
}

/// Everything Studio-related discovered for one course.
struct CourseMedia {
    course: CourseSyncId,
    env: Environment,
    studio_directory: PathBuf,
    media_items: Vec<ApiStudioMediaItem>,
    /// Media id → every iframe occurrence referencing it.
    iframes: HashMap<String, Vec<StudioIframe>>,
}

/// Per-directory aggregation of every course sharing one studio store.
struct MediaGroup {
    courses: Vec<CourseMedia>,
}

/// Aggregates and downloads Studio media across a batch of courses.
pub struct StudioMediaSync {
    resolver: Arc<dyn EnvironmentResolver>,
}

impl StudioMediaSync {
    #[must_use]
    pub fn new(resolver: Arc<dyn EnvironmentResolver>) -> Self {
        Self { resolver }
    }

    /// Runs the whole aggregation pipeline for a batch of courses.
    ///
    /// Infallible: a failing course is logged to the diagnostics sink and
    /// skipped; the remaining courses still sync.
    pub async fn get_content(&self, courses: &[CourseSyncId]) {
        let discovered: Vec<CourseMedia> = futures_util::stream::iter(courses)
            .map(|course| async move {
                match self.course_media(course).await {
                    Ok(media) => Some(media),
                    Err(err) => {
                        error!(
                            target: "course_sync::studio",
                            course = %course,
                            error = %err,
                            "studio sync failed for course"
                        );
                        None
                    }
                }
            })
            .buffer_unordered(MAX_CONCURRENT_COURSES)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect();

        // Courses sharing a studio directory form one dedup domain.
        let mut groups: HashMap<PathBuf, MediaGroup> = HashMap::new();
        for media in discovered {
            groups
                .entry(media.studio_directory.clone())
                .or_insert_with(|| MediaGroup {
                    courses: Vec::new(),
                })
                .courses
                .push(media);
        }

        for (directory, group) in groups {
            if let Err(err) = self.sync_group(&directory, &group).await {
                error!(
                    target: "course_sync::studio",
                    directory = %directory.display(),
                    error = %err,
                    "studio group sync failed"
                );
            }
        }
    }

    /// Deletes cached videos whose media id is not in `referenced_ids`.
    ///
    /// Best-effort: deletion errors are logged and swallowed.
    pub async fn remove_unavailable_media(&self, course: &CourseSyncId, referenced_ids: &[String]) {
        let env = self.resolver.environment(course);
        let directory = match env.studio_directory() {
            Ok(directory) => directory,
            Err(err) => {
                warn!(course = %course, error = %err, "skipping studio cleanup");
                return;
            }
        };
        let referenced: HashSet<&str> = referenced_ids.iter().map(String::as_str).collect();
        prune_directory(&directory, &referenced).await;
    }

    /// Concurrent per-course discovery: saved-HTML iframe scan and media
    /// catalog fetch.
    async fn course_media(&self, course: &CourseSyncId) -> Result<CourseMedia, SyncError> {
        let env = self.resolver.environment(course);
        let studio_directory = env.studio_directory()?;
        let course_root = env.course_root(course)?;

        let catalog_path = format!("/api/v1/courses/{}/studio_media", course.value);
        let catalog = fetch_all::<ApiStudioMediaItem>(&env, &catalog_path);
        let scan = scan_iframes(course_root);
        let (media_items, iframes) = futures_util::try_join!(catalog, scan)?;

        debug!(
            course = %course,
            media = media_items.len(),
            referenced = iframes.len(),
            "studio media discovered"
        );
        Ok(CourseMedia {
            course: course.clone(),
            env,
            studio_directory,
            media_items,
            iframes,
        })
    }

    /// Cleanup, dedup download, and iframe rewrite for one directory group.
    async fn sync_group(&self, directory: &Path, group: &MediaGroup) -> Result<(), SyncError> {
        let referenced: HashSet<&str> = group
            .courses
            .iter()
            .flat_map(|c| c.iframes.keys())
            .map(String::as_str)
            .collect();

        // Stale videos go first so a re-referenced id gets a fresh copy
        // rather than surviving from an old catalog entry.
        prune_directory(directory, &referenced).await;

        // One download per referenced id across the whole group. The loop
        // is deliberately sequential; videos are large.
        let mut local_paths: HashMap<String, PathBuf> = HashMap::new();
        for course in &group.courses {
            for item in &course.media_items {
                if !referenced.contains(item.lti_launch_id.as_str())
                    || local_paths.contains_key(&item.lti_launch_id)
                {
                    continue;
                }
                let path = download_video(&course.env, directory, item).await?;
                local_paths.insert(item.lti_launch_id.clone(), path);
            }
        }

        for course in &group.courses {
            rewrite_iframes(&course.course, &course.iframes, &local_paths).await;
        }

        info!(
            directory = %directory.display(),
            courses = group.courses.len(),
            videos = local_paths.len(),
            "studio group synced"
        );
        Ok(())
    }
}

/// Walks a course's offline tree and collects every Studio iframe in its
/// saved HTML, keyed by media id.
async fn scan_iframes(
    course_root: PathBuf,
) -> Result<HashMap<String, Vec<StudioIframe>>, SyncError> {
    let mut iframes: HashMap<String, Vec<StudioIframe>> = HashMap::new();
    let mut pending = vec![course_root];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            // A course with no saved HTML yet has no references.
            Err(_) => continue,
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SyncError::io(&dir, e))?
        {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "html") {
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| SyncError::io(&path, e))?;
                for capture in STUDIO_IFRAME_PATTERN.captures_iter(&content) {
                    let media_id = capture[1].to_string();
                    iframes.entry(media_id).or_default().push(StudioIframe {
                        source_html: capture[0].to_string(),
                        file: path.clone(),
                    });
                }
            }
        }
    }
    Ok(iframes)
}

/// Downloads one video into the studio directory, unless already cached.
async fn download_video(
    env: &Environment,
    directory: &Path,
    item: &ApiStudioMediaItem,
) -> Result<PathBuf, SyncError> {
    let name = format!(
        "{}.{}",
        item.lti_launch_id,
        media_extension(item.mime_type.as_deref())
    );
    let dest = directory.join(&name);
    if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
        debug!(media_id = %item.lti_launch_id, "studio video already cached");
        return Ok(dest);
    }

    tokio::fs::create_dir_all(directory)
        .await
        .map_err(|e| SyncError::io(directory, e))?;

    let url = env.absolute_url(&item.url)?;
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

    let partial = directory.join(format!("{name}.partial"));
    let mut file = tokio::fs::File::create(&partial)
        .await
        .map_err(|e| SyncError::io(&partial, e))?;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(SyncError::network(url.as_str(), err));
            }
        };
        if let Err(err) = file.write_all(&chunk).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(SyncError::io(&partial, err));
        }
    }
    if let Err(err) = file.flush().await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(SyncError::io(&partial, err));
    }
    drop(file);
    tokio::fs::rename(&partial, &dest)
        .await
        .map_err(|e| SyncError::io(&dest, e))?;

    info!(media_id = %item.lti_launch_id, path = %dest.display(), "studio video downloaded");
    Ok(dest)
}

/// Replaces every iframe occurrence in a course's HTML with an offline
/// video element. Rewrite failures only affect the file they occur in.
async fn rewrite_iframes(
    course: &CourseSyncId,
    iframes: &HashMap<String, Vec<StudioIframe>>,
    local_paths: &HashMap<String, PathBuf>,
) {
    // Group occurrences by file so each file is read and written once.
    let mut per_file: HashMap<&PathBuf, Vec<(&StudioIframe, &PathBuf)>> = HashMap::new();
    for (media_id, occurrences) in iframes {
        let Some(local) = local_paths.get(media_id) else {
            // Referenced but absent from every catalog in the group.
            warn!(course = %course, media_id, "no studio video available for iframe");
            continue;
        };
        for iframe in occurrences {
            per_file.entry(&iframe.file).or_default().push((iframe, local));
        }
    }

    for (file, replacements) in per_file {
        let mut content = match tokio::fs::read_to_string(file).await {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %file.display(), error = %err, "iframe rewrite skipped");
                continue;
            }
        };
        for (iframe, local) in replacements {
            let video_tag = format!(
                r#"<video controls src="{}"></video>"#,
                local.display()
            );
            content = content.replace(&iframe.source_html, &video_tag);
        }
        if let Err(err) = tokio::fs::write(file, content).await {
            warn!(path = %file.display(), error = %err, "iframe rewrite failed");
        }
    }
}

/// Prunes cached videos not referenced by any course in the group.
async fn prune_directory(directory: &Path, referenced: &HashSet<&str>) {
    let mut entries = match tokio::fs::read_dir(directory).await {
        Ok(entries) => entries,
        // No studio directory means nothing cached.
        Err(_) => return,
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let stem = path.file_stem().and_then(|s| s.to_str());
        if stem.is_some_and(|s| referenced.contains(s)) {
            continue;
        }
        debug!(path = %path.display(), "removing unreferenced studio video");
        if let Err(err) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %err, "studio cleanup failed");
        }
    }
}

fn media_extension(mime_type: Option<&str>) -> &'static str {
    match mime_type {
        Some("video/webm") => "webm",
        Some("video/quicktime") => "mov",
        _ => "mp4",
    }
}
