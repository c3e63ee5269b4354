//! Course file tree synchronization.
//!
//! Walks a course's folder/file hierarchy depth-first, downloads surviving
//! leaf files with a freshness check, and prunes local files whose remote
//! counterpart no longer exists. Folder recursion is deliberately
//! sequential — one folder's children are processed before the next
//! sibling — to bound request concurrency against the backend.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use futures_util::{StreamExt, TryStreamExt, stream};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, instrument, warn};

use crate::env::{CourseSyncId, Environment, EnvironmentResolver};
use crate::error::SyncError;
use crate::fetch::{fetch_all_or_empty_on_forbidden, fetch_one};
use crate::model::{ApiFile, ApiFolder, ApiId, FolderEntry};

/// Upper bound on concurrent leaf-file downloads during a full tree sync.
const MAX_CONCURRENT_FILE_DOWNLOADS: usize = 5;

/// Progress channel depth; downloads apply backpressure past this.
const PROGRESS_CHANNEL_CAPACITY: usize = 16;

/// Synchronizes a course's file tree into the offline store.
#[derive(Clone)]
pub struct FileSync {
    resolver: Arc<dyn EnvironmentResolver>,
}

impl FileSync {
    /// Creates a synchronizer resolving environments through `resolver`.
    #[must_use]
    pub fn new(resolver: Arc<dyn EnvironmentResolver>) -> Self {
        Self { resolver }
    }

    /// Returns every downloadable file in the course's folder tree.
    ///
    /// Hidden or locked nodes are dropped together with their entire
    /// subtree. Folder listings answering 403 are treated as empty (the
    /// documented narrow exception); `use_cache` lets read paths reuse
    /// cached listings, while sync passes always bypass.
    ///
    /// # Errors
    ///
    /// Returns fetch errors other than the folder-listing 403 case.
    #[instrument(skip(self), fields(course = %course))]
    pub async fn get_files(
        &self,
        course: &CourseSyncId,
        use_cache: bool,
    ) -> Result<Vec<ApiFile>, SyncError> {
        let env = self.resolver.environment(course);
        let root: ApiFolder = fetch_one(
            &env,
            &format!("/api/v1/courses/{}/folders/root", course.value),
        )
        .await?;

        if FolderEntry::Folder(root.clone()).is_excluded() {
            debug!(course = %course, "root folder hidden or locked, nothing to sync");
            return Ok(Vec::new());
        }

        let files = self
            .folder_items(&env, root.id.to_string(), use_cache, Vec::new())
            .await?;
        debug!(course = %course, count = files.len(), "file tree traversed");
        Ok(files)
    }

    /// Depth-first traversal of one folder.
    ///
    /// The accumulator is threaded through the recursion as a return value;
    /// concurrent branches never share mutable state.
    fn folder_items<'a>(
        &'a self,
        env: &'a Environment,
        folder_id: String,
        use_cache: bool,
        acc: Vec<ApiFile>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ApiFile>, SyncError>> + Send + 'a>> {
        Box::pin(async move {
            let files: Vec<ApiFile> = fetch_all_or_empty_on_forbidden(
                env,
                &format!("/api/v1/folders/{folder_id}/files"),
                use_cache,
            )
            .await?;
            let folders: Vec<ApiFolder> = fetch_all_or_empty_on_forbidden(
                env,
                &format!("/api/v1/folders/{folder_id}/folders"),
                use_cache,
            )
            .await?;

            let entries = files
                .into_iter()
                .map(FolderEntry::File)
                .chain(folders.into_iter().map(FolderEntry::Folder))
                .filter(|entry| !entry.is_excluded());

            let mut acc = acc;
            for entry in entries {
                match entry {
                    FolderEntry::File(file) => acc.push(file),
                    // One folder at a time; the recursion is the throttle.
                    FolderEntry::Folder(folder) => {
                        acc = self
                            .folder_items(env, folder.id.to_string(), use_cache, acc)
                            .await?;
                    }
                }
            }
            Ok(acc)
        })
    }

    /// Downloads one file, streaming progress in `0.0..=1.0`.
    ///
    /// If a file already exists at the deterministic local path and its
    /// on-disk modification time is at least `updated_at`, the stream emits
    /// `1.0` exactly once and completes without any network call. This fast
    /// path is part of the contract, not merely an optimization.
    ///
    /// A missing session is a hard, immediately-terminal error; transport
    /// failures surface as the final stream item. Dropping the stream
    /// cancels the download and removes any partially-written file.
    #[must_use = "the download only runs while the progress stream is consumed"]
    pub fn download_file(
        &self,
        course: &CourseSyncId,
        url: &str,
        file_id: &str,
        file_name: &str,
        mime_class: &str,
        updated_at: Option<DateTime<Utc>>,
    ) -> ReceiverStream<Result<f32, SyncError>> {
        let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let env = self.resolver.environment(course);
        let course = course.clone();
        let url = url.to_string();
        let file_id = file_id.to_string();
        let file_name = file_name.to_string();
        let mime_class = mime_class.to_string();

        tokio::spawn(async move {
            let result = run_download(
                &env, &course, &url, &file_id, &file_name, &mime_class, updated_at, &tx,
            )
            .await;
            if let Err(error) = result {
                warn!(course = %course, file_id, error = %error, "file download failed");
                let _ = tx.send(Err(error)).await;
            }
        });

        ReceiverStream::new(rx)
    }

    /// Full tree sync: traverse, download every surviving leaf that has
    /// both a URL and a mime class, then prune files no longer referenced
    /// remotely.
    ///
    /// # Errors
    ///
    /// Fails fast on the first traversal or download error; cleanup only
    /// runs after every download succeeded.
    #[instrument(skip(self), fields(course = %course))]
    pub async fn sync_files(&self, course: &CourseSyncId) -> Result<Vec<ApiFile>, SyncError> {
        let files = self.get_files(course, false).await?;

        stream::iter(
            files
                .iter()
                .filter(|f| f.url.is_some() && f.mime_class.is_some()),
        )
        .map(|file| async move {
            let url = file.url.as_deref().unwrap_or_default();
            let mime_class = file.mime_class.as_deref().unwrap_or_default();
            let mut progress = self.download_file(
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
            Ok::<_, SyncError>(())
        })
        .buffer_unordered(MAX_CONCURRENT_FILE_DOWNLOADS)
        .try_collect::<Vec<()>>()
        .await?;

        let new_ids: Vec<ApiId> = files.iter().map(|f| f.id.clone()).collect();
        self.remove_unavailable_files(course, &new_ids).await;

        info!(course = %course, count = files.len(), "file tree synced");
        Ok(files)
    }

    /// Deletes local file folders whose ID no longer appears remotely.
    ///
    /// This is the eviction policy: referential staleness only, no LRU or
    /// size pressure. Deletion is best-effort and never fails the pipeline.
    #[instrument(skip(self, new_file_ids), fields(course = %course))]
    pub async fn remove_unavailable_files(&self, course: &CourseSyncId, new_file_ids: &[ApiId]) {
        let env = self.resolver.environment(course);
        let files_root = match env.files_root(course) {
            Ok(root) => root,
            Err(error) => {
                warn!(course = %course, error = %error, "skipping file cleanup");
                return;
            }
        };

        let mut entries = match tokio::fs::read_dir(&files_root).await {
            Ok(entries) => entries,
            // Nothing downloaded yet.
            Err(_) => return,
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(local_id) = name.to_str().and_then(|n| n.strip_prefix("file-")) else {
                continue;
            };
            if new_file_ids.iter().any(|id| id.0 == local_id) {
                continue;
            }
            debug!(course = %course, file_id = local_id, "removing unavailable file");
            if let Err(error) = tokio::fs::remove_dir_all(entry.path()).await {
                warn!(path = %entry.path().display(), error = %error, "file cleanup failed");
            }
        }
    }
}

/// The download body behind [`FileSync::download_file`].
#[allow(clippy::too_many_arguments)]
async fn run_download(
    env: &Environment,
    course: &CourseSyncId,
    url: &str,
    file_id: &str,
    file_name: &str,
    mime_class: &str,
    updated_at: Option<DateTime<Utc>>,
    tx: &mpsc::Sender<Result<f32, SyncError>>,
) -> Result<(), SyncError> {
    // Precondition: downloads never start without a session.
    env.session_id()?;

    let folder = env.file_folder(course, file_id)?;
    let dest = folder.join(file_name);

    if is_up_to_date(&dest, updated_at).await {
        debug!(course = %course, file_id, "local file is fresh, skipping download");
        let _ = tx.send(Ok(1.0)).await;
        return Ok(());
    }

    let absolute = env.absolute_url(url)?;
    tokio::fs::create_dir_all(&folder)
        .await
        .map_err(|e| SyncError::io(&folder, e))?;

    debug!(course = %course, file_id, mime_class, url = %absolute, "starting file download");
    let response = env
        .http()
        .get(absolute.clone())
        .send()
        .await
        .map_err(|e| SyncError::network(absolute.as_str(), e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(SyncError::http_status(absolute.as_str(), status.as_u16()));
    }
    let total = response.content_length().filter(|t| *t > 0);

    if tx.send(Ok(0.0)).await.is_err() {
        // Consumer cancelled before any bytes arrived.
        return Ok(());
    }

    let partial = folder.join(format!("{file_name}.partial"));
    let mut file = tokio::fs::File::create(&partial)
        .await
        .map_err(|e| SyncError::io(&partial, e))?;
    let mut body = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = body.next().await {
        // Without a Content-Length no progress is sent mid-stream, so a
        // dropped receiver must be checked explicitly or the download
        // would run to completion unobserved.
        if tx.is_closed() {
            discard_partial(&partial).await;
            return Ok(());
        }
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(error) => {
                discard_partial(&partial).await;
                return Err(SyncError::network(absolute.as_str(), error));
            }
        };
        if let Err(error) = file.write_all(&chunk).await {
            discard_partial(&partial).await;
            return Err(SyncError::io(&partial, error));
        }
        written += chunk.len() as u64;

        if let Some(total) = total {
            #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
            let progress = (written as f64 / total as f64) as f32;
            if progress < 1.0 && tx.send(Ok(progress)).await.is_err() {
                // Cancelled mid-stream; leave no partial file behind.
                discard_partial(&partial).await;
                return Ok(());
            }
        }
    }

    if let Err(error) = file.flush().await {
        discard_partial(&partial).await;
        return Err(SyncError::io(&partial, error));
    }
    drop(file);

    if tx.is_closed() {
        discard_partial(&partial).await;
        return Ok(());
    }

    // Atomic publish: the destination only ever holds complete files.
    tokio::fs::rename(&partial, &dest)
        .await
        .map_err(|e| SyncError::io(&dest, e))?;

    info!(course = %course, file_id, bytes = written, path = %dest.display(), "file downloaded");
    let _ = tx.send(Ok(1.0)).await;
    Ok(())
}

async fn discard_partial(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
}

/// Freshness check: the local copy is current when its modification time is
/// at least the remote `updated_at`. No timestamp means never fresh.
async fn is_up_to_date(path: &Path, updated_at: Option<DateTime<Utc>>) -> bool {
    let Some(updated_at) = updated_at else {
        return false;
    };
    let Ok(metadata) = tokio::fs::metadata(path).await else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    modified >= SystemTime::from(updated_at)
}

/// Computes the local folder a downloaded file lives in, for callers that
/// need to resolve offline content without touching the network.
///
/// # Errors
///
/// Returns [`SyncError::NoSession`] when no session is available.
pub fn local_file_path(
    env: &Environment,
    course: &CourseSyncId,
    file_id: &str,
    file_name: &str,
) -> Result<PathBuf, SyncError> {
    Ok(env.file_folder(course, file_id)?.join(file_name))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_local_file_path_matches_download_destination() {
        let env = Environment::new(
            url::Url::parse("https://canvas.test").unwrap(),
            Some(crate::env::LoginSession {
                unique_id: "s".into(),
            }),
            PathBuf::from("/data"),
        );
        let path = local_file_path(&env, &CourseSyncId::new("1"), "10", "a.pdf").unwrap();
        assert_eq!(
            path,
            PathBuf::from("/data/s/Offline/Files/course-1/file-10/a.pdf")
        );
    }

    #[tokio::test]
    async fn test_is_up_to_date_missing_file() {
        let updated_at = Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        assert!(!is_up_to_date(Path::new("/nonexistent/file"), updated_at).await);
    }

    #[tokio::test]
    async fn test_is_up_to_date_no_remote_timestamp() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("f");
        std::fs::write(&path, b"x").unwrap();
        assert!(!is_up_to_date(&path, None).await);
    }

    #[tokio::test]
    async fn test_is_up_to_date_old_remote_timestamp() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("f");
        std::fs::write(&path, b"x").unwrap();

        // File written just now, remote last modified decades ago.
        let updated_at = Some(Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap());
        assert!(is_up_to_date(&path, updated_at).await);
    }

    #[tokio::test]
    async fn test_is_up_to_date_newer_remote_timestamp() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("f");
        std::fs::write(&path, b"x").unwrap();

        let updated_at = Some(Utc::now() + chrono::Duration::days(1));
        assert!(!is_up_to_date(&path, updated_at).await);
    }
}
