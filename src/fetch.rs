//! Fetch primitive: a page-of-records GET against a course environment.
//!
//! Everything else in the engine is built on these functions. They always
//! bypass the read-side cache by default — this subsystem's job is to
//! populate the cache, not read from it — and follow RFC 5988 `Link`
//! pagination until the collection is exhausted.

use reqwest::header::{CACHE_CONTROL, LINK};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::env::Environment;
use crate::error::SyncError;

/// Page size requested from collection endpoints.
const PER_PAGE: u32 = 100;

/// Fetches every page of a collection, bypassing any read cache.
///
/// `path` is resolved against the environment's base URL and may carry its
/// own query string.
///
/// # Errors
///
/// Returns [`SyncError::Network`]/[`SyncError::Timeout`] on transport
/// failure, [`SyncError::HttpStatus`] on a non-success response, and
/// [`SyncError::Json`] when a page does not decode as `Vec<T>`.
pub async fn fetch_all<T: DeserializeOwned>(
    env: &Environment,
    path: &str,
) -> Result<Vec<T>, SyncError> {
    fetch_all_with_cache(env, path, false).await
}

/// Fetches every page of a collection, optionally allowing cached reads.
///
/// `use_cache == false` (the sync default) sends `Cache-Control: no-cache`
/// so intermediaries cannot serve a stale page.
///
/// # Errors
///
/// Same as [`fetch_all`].
pub async fn fetch_all_with_cache<T: DeserializeOwned>(
    env: &Environment,
    path: &str,
    use_cache: bool,
) -> Result<Vec<T>, SyncError> {
    let mut url = page_url(env, path)?;
    let mut records: Vec<T> = Vec::new();
    let mut pages = 0u32;

    loop {
        let response = send(env, url.clone(), use_cache).await?;
        let next = next_page_url(response.headers());
        let page: Vec<T> = decode(url.as_str(), response).await?;
        pages += 1;
        records.extend(page);

        match next {
            Some(next_url) => url = next_url,
            None => break,
        }
    }

    debug!(path, pages, count = records.len(), "collection fetched");
    Ok(records)
}

/// Fetches a collection, treating a forbidden response as empty.
///
/// This is a documented narrow exception used only for folder-item listings,
/// where a locked folder answers 403 but the traversal must carry on with
/// the remaining tree. It is deliberately NOT the default for other fetches.
///
/// # Errors
///
/// Same as [`fetch_all`], except that HTTP 403 yields `Ok(vec![])`.
pub async fn fetch_all_or_empty_on_forbidden<T: DeserializeOwned>(
    env: &Environment,
    path: &str,
    use_cache: bool,
) -> Result<Vec<T>, SyncError> {
    match fetch_all_with_cache(env, path, use_cache).await {
        Err(e) if e.is_forbidden() => {
            debug!(path, "forbidden collection treated as empty");
            Ok(Vec::new())
        }
        other => other,
    }
}

/// Fetches a single record from an object endpoint, bypassing any read cache.
///
/// # Errors
///
/// Same as [`fetch_all`].
pub async fn fetch_one<T: DeserializeOwned>(env: &Environment, path: &str) -> Result<T, SyncError> {
    let url = env.absolute_url(path)?;
    let response = send(env, url.clone(), false).await?;
    decode(url.as_str(), response).await
}

async fn send(
    env: &Environment,
    url: Url,
    use_cache: bool,
) -> Result<reqwest::Response, SyncError> {
    let mut request = env.http().get(url.clone());
    if !use_cache {
        request = request.header(CACHE_CONTROL, "no-cache");
    }

    let response = request
        .send()
        .await
        .map_err(|e| SyncError::network(url.as_str(), e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SyncError::http_status(url.as_str(), status.as_u16()));
    }
    Ok(response)
}

async fn decode<T: DeserializeOwned>(
    url: &str,
    response: reqwest::Response,
) -> Result<T, SyncError> {
    let body = response
        .text()
        .await
        .map_err(|e| SyncError::network(url, e))?;
    serde_json::from_str(&body).map_err(|e| SyncError::json(url, e))
}

/// Resolves `path` against the base URL and ensures a page size is set.
fn page_url(env: &Environment, path: &str) -> Result<Url, SyncError> {
    let mut url = env.absolute_url(path)?;
    let has_per_page = url.query_pairs().any(|(key, _)| key == "per_page");
    if !has_per_page {
        url.query_pairs_mut()
            .append_pair("per_page", &PER_PAGE.to_string());
    }
    Ok(url)
}

/// Extracts the `rel="next"` target from a `Link` response header.
fn next_page_url(headers: &reqwest::header::HeaderMap) -> Option<Url> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if !params.contains(r#"rel="next""#) {
            return None;
        }
        let target = target.trim().trim_start_matches('<').trim_end_matches('>');
        Url::parse(target).ok()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use serde::Deserialize;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Record {
        id: u64,
    }

    fn mock_environment(server: &MockServer) -> Environment {
        Environment::new(
            Url::parse(&server.uri()).unwrap(),
            None,
            PathBuf::from("/tmp/unused"),
        )
    }

    #[tokio::test]
    async fn test_fetch_all_single_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/1/pages"))
            .and(query_param("per_page", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": 1 }, { "id": 2 }
            ])))
            .mount(&server)
            .await;

        let env = mock_environment(&server);
        let records: Vec<Record> = fetch_all(&env, "/api/v1/courses/1/pages").await.unwrap();
        assert_eq!(records, vec![Record { id: 1 }, Record { id: 2 }]);
    }

    #[tokio::test]
    async fn test_fetch_all_follows_link_next() {
        let server = MockServer::start().await;
        let next = format!("{}/api/v1/courses/1/files?page=2&per_page=100", server.uri());

        Mock::given(method("GET"))
            .and(path("/api/v1/courses/1/files"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([{ "id": 3 }])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/1/files"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Link", format!(r#"<{next}>; rel="next""#).as_str())
                    .set_body_json(serde_json::json!([{ "id": 1 }, { "id": 2 }])),
            )
            .mount(&server)
            .await;

        let env = mock_environment(&server);
        let records: Vec<Record> = fetch_all(&env, "/api/v1/courses/1/files").await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2], Record { id: 3 });
    }

    #[tokio::test]
    async fn test_fetch_all_sends_cache_bypass_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/1/users"))
            .and(header("Cache-Control", "no-cache"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let env = mock_environment(&server);
        let records: Vec<Record> = fetch_all(&env, "/api/v1/courses/1/users").await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_all_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/1/quizzes"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let env = mock_environment(&server);
        let result: Result<Vec<Record>, _> = fetch_all(&env, "/api/v1/courses/1/quizzes").await;
        match result {
            Err(SyncError::HttpStatus { status: 500, .. }) => {}
            other => panic!("Expected HttpStatus 500, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_forbidden_treated_as_empty_only_via_wrapper() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/folders/9/files"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let env = mock_environment(&server);

        // The plain fetch surfaces the 403.
        let plain: Result<Vec<Record>, _> = fetch_all(&env, "/api/v1/folders/9/files").await;
        assert!(matches!(
            plain,
            Err(SyncError::HttpStatus { status: 403, .. })
        ));

        // The wrapper recovers it as an empty collection.
        let recovered: Vec<Record> =
            fetch_all_or_empty_on_forbidden(&env, "/api/v1/folders/9/files", false)
                .await
                .unwrap();
        assert!(recovered.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_one_decodes_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": 1 })))
            .mount(&server)
            .await;

        let env = mock_environment(&server);
        let record: Record = fetch_one(&env, "/api/v1/courses/1").await.unwrap();
        assert_eq!(record, Record { id: 1 });
    }

    #[tokio::test]
    async fn test_fetch_one_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let env = mock_environment(&server);
        let result: Result<Record, _> = fetch_one(&env, "/api/v1/courses/1").await;
        assert!(matches!(result, Err(SyncError::Json { .. })));
    }

    #[test]
    fn test_next_page_url_parses_link_header() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            LINK,
            r#"<https://canvas.test/api/v1/x?page=1>; rel="current", <https://canvas.test/api/v1/x?page=2>; rel="next""#
                .parse()
                .unwrap(),
        );
        let next = next_page_url(&headers).unwrap();
        assert_eq!(next.as_str(), "https://canvas.test/api/v1/x?page=2");
    }

    #[test]
    fn test_next_page_url_absent_on_last_page() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            LINK,
            r#"<https://canvas.test/api/v1/x?page=2>; rel="current""#
                .parse()
                .unwrap(),
        );
        assert!(next_page_url(&headers).is_none());
    }
}
