//! End-to-end tests running content downloaders through the trait surface,
//! the way a sync orchestrator drives them.

#![allow(clippy::unwrap_used)]

mod support;

use course_sync::{ContentType, CourseSyncId, downloaders_for};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::SESSION_ID;

#[tokio::test]
async fn selected_types_sync_and_clean_independently() {
    let server = MockServer::start().await;
    let temp = tempfile::tempdir().unwrap();
    let course = CourseSyncId::new("1");

    Mock::given(method("GET"))
        .and(path("/api/v1/courses/1/pages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "page_id": 5, "url": "week-1", "body": "<p>week one</p>" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(
            { "id": 1, "syllabus_body": "<p>rules</p>" }
        )))
        .mount(&server)
        .await;

    let resolver = support::resolver(&server, temp.path());
    let downloaders = downloaders_for(&resolver, &[ContentType::Pages, ContentType::Syllabus]);
    for downloader in &downloaders {
        downloader.get_content(&course).await.unwrap();
    }

    let course_root = temp.path().join(format!("{SESSION_ID}/Offline/course-1"));
    assert!(course_root.join("pages/pages-5/body.html").exists());
    assert!(course_root.join("syllabus/syllabus-1/body.html").exists());

    // Cleaning one section leaves the other intact.
    downloaders[0].clean_content(&course).await;
    assert!(!course_root.join("pages").exists());
    assert!(course_root.join("syllabus/syllabus-1/body.html").exists());
}

#[tokio::test]
async fn embedded_assets_are_localized_through_get_content() {
    let server = MockServer::start().await;
    let temp = tempfile::tempdir().unwrap();
    let course = CourseSyncId::new("1");

    let image_url = format!("{}/courses/1/files/9/preview/photo.png", server.uri());
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/1/pages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "page_id": 5,
                "url": "week-1",
                "body": format!(r#"<img src="{image_url}">"#)
            }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/courses/1/files/9/preview/photo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = support::resolver(&server, temp.path());
    let downloaders = downloaders_for(&resolver, &[ContentType::Pages]);
    downloaders[0].get_content(&course).await.unwrap();

    let folder = temp
        .path()
        .join(format!("{SESSION_ID}/Offline/course-1/pages/pages-5"));
    assert_eq!(std::fs::read(folder.join("photo.png")).unwrap(), b"png");
    let body = std::fs::read_to_string(folder.join("body.html")).unwrap();
    assert_eq!(body, r#"<img src="pages/pages-5/photo.png">"#);
}

#[tokio::test]
async fn failing_fetch_surfaces_as_the_downloader_failing() {
    let server = MockServer::start().await;
    let temp = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v1/courses/1/all_quizzes"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let resolver = support::resolver(&server, temp.path());
    let downloaders = downloaders_for(&resolver, &[ContentType::Quizzes]);
    let result = downloaders[0].get_content(&CourseSyncId::new("1")).await;
    assert!(matches!(
        result,
        Err(course_sync::SyncError::HttpStatus { status: 500, .. })
    ));
}
