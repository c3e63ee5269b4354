//! API record shapes consumed by the sync engine.
//!
//! Only the fields the engine acts on are modeled; every record is created
//! by a fetch, handed to the HTML localizer or file downloader, and
//! discarded. Long-term storage belongs to the read-side cache, which is an
//! external collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// A remote record identifier.
///
/// The API is inconsistent about id types (numbers in most payloads,
/// strings in a few), so this accepts either and normalizes to a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiId(pub String);

impl<'de> Deserialize<'de> for ApiId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(i64),
            Str(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Num(n) => ApiId(n.to_string()),
            Raw::Str(s) => ApiId(s),
        })
    }
}

impl std::fmt::Display for ApiId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ApiId {
    fn from(value: &str) -> Self {
        ApiId(value.to_string())
    }
}

/// A file record, either a folder leaf or an attachment.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiFile {
    pub id: ApiId,
    pub display_name: Option<String>,
    pub filename: Option<String>,
    /// Download URL; absent on files the user cannot access.
    pub url: Option<String>,
    /// Coarse media classification ("image", "pdf", "video", ...).
    pub mime_class: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub locked_for_user: bool,
    #[serde(default)]
    pub hidden_for_user: bool,
}

impl ApiFile {
    /// The name the file is stored under locally.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.filename.clone())
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// A folder node in a course's file tree.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiFolder {
    pub id: ApiId,
    pub name: Option<String>,
    #[serde(default)]
    pub locked_for_user: bool,
    #[serde(default)]
    pub hidden_for_user: bool,
}

/// One node of the folder/file tree during traversal.
///
/// A hidden or locked node and its entire subtree are excluded from
/// traversal and from the download set.
#[derive(Debug, Clone)]
pub enum FolderEntry {
    File(ApiFile),
    Folder(ApiFolder),
}

impl FolderEntry {
    /// Whether this node (and therefore its subtree) is excluded from sync.
    #[must_use]
    pub fn is_excluded(&self) -> bool {
        match self {
            FolderEntry::File(f) => f.locked_for_user || f.hidden_for_user,
            FolderEntry::Folder(f) => f.locked_for_user || f.hidden_for_user,
        }
    }
}

/// A discussion topic or announcement.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiDiscussionTopic {
    pub id: ApiId,
    pub title: Option<String>,
    /// Rich-text body.
    pub message: Option<String>,
    #[serde(default)]
    pub attachments: Vec<ApiFile>,
    /// Number of entries below the topic; replies are only fetched when > 0.
    #[serde(default)]
    pub discussion_subentry_count: i64,
    /// Present on anonymous discussions, whose replies must not be fetched.
    pub anonymous_state: Option<String>,
}

impl ApiDiscussionTopic {
    /// Whether the topic's full view (replies) should be fetched.
    #[must_use]
    pub fn wants_full_view(&self) -> bool {
        self.discussion_subentry_count > 0 && self.anonymous_state.is_none()
    }
}

/// The full view of one discussion topic.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiDiscussionView {
    #[serde(default)]
    pub view: Vec<ApiDiscussionEntry>,
}

/// One entry (reply) inside a discussion view; replies nest.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiDiscussionEntry {
    pub id: ApiId,
    pub message: Option<String>,
    pub attachment: Option<ApiFile>,
    #[serde(default)]
    pub replies: Vec<ApiDiscussionEntry>,
}

/// A wiki page.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiPage {
    pub page_id: ApiId,
    /// URL slug, the identifier used by module items.
    pub url: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiAssignment {
    pub id: ApiId,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiAssignmentGroup {
    pub id: ApiId,
    pub name: Option<String>,
    #[serde(default)]
    pub assignments: Vec<ApiAssignment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiQuiz {
    pub id: ApiId,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// A course, fetched for its syllabus body and grading-period resolution.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiCourse {
    pub id: ApiId,
    pub syllabus_body: Option<String>,
    #[serde(default)]
    pub enrollments: Vec<ApiEnrollment>,
}

impl ApiCourse {
    /// The viewing user's current grading period, when one applies.
    ///
    /// Absence is a valid state (courses without grading periods), not an
    /// error.
    #[must_use]
    pub fn current_grading_period_id(&self) -> Option<&ApiId> {
        self.enrollments
            .iter()
            .find_map(|e| e.current_grading_period_id.as_ref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnrollment {
    pub user_id: Option<ApiId>,
    #[serde(rename = "type")]
    pub enrollment_type: Option<String>,
    pub current_grading_period_id: Option<ApiId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiUser {
    pub id: ApiId,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConference {
    pub id: ApiId,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Wrapper shape of the conferences endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConferenceList {
    #[serde(default)]
    pub conferences: Vec<ApiConference>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiModule {
    pub id: ApiId,
    pub name: Option<String>,
    #[serde(default)]
    pub items: Vec<ApiModuleItem>,
}

/// One item inside a course module, pointing at downstream content.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiModuleItem {
    pub id: ApiId,
    #[serde(rename = "type", default)]
    pub item_type: ModuleItemType,
    /// Identifier of the referenced content for file/quiz items.
    pub content_id: Option<ApiId>,
    /// Page slug for page items.
    pub page_url: Option<String>,
}

/// Asset type a module item references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum ModuleItemType {
    Page,
    Quiz,
    File,
    SubHeader,
    /// Item types with no offline content of their own (external URLs,
    /// tools, assignments and discussions synced by their own downloaders).
    #[serde(other)]
    #[default]
    Other,
}

/// A video hosted on the Studio media service.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiStudioMediaItem {
    pub id: ApiId,
    /// The identifier iframes embed; downloads are deduplicated on this.
    pub lti_launch_id: String,
    pub url: String,
    pub mime_type: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_api_id_accepts_number_and_string() {
        let from_num: ApiId = serde_json::from_str("42").unwrap();
        let from_str: ApiId = serde_json::from_str(r#""42""#).unwrap();
        assert_eq!(from_num, from_str);
        assert_eq!(from_num.to_string(), "42");
    }

    #[test]
    fn test_file_name_prefers_display_name() {
        let file: ApiFile = serde_json::from_str(
            r#"{ "id": 1, "display_name": "Week 1.pdf", "filename": "week1.pdf" }"#,
        )
        .unwrap();
        assert_eq!(file.file_name(), "Week 1.pdf");

        let file: ApiFile = serde_json::from_str(r#"{ "id": 1, "filename": "week1.pdf" }"#).unwrap();
        assert_eq!(file.file_name(), "week1.pdf");

        let file: ApiFile = serde_json::from_str(r#"{ "id": 7 }"#).unwrap();
        assert_eq!(file.file_name(), "7");
    }

    #[test]
    fn test_folder_entry_exclusion() {
        let locked: ApiFolder =
            serde_json::from_str(r#"{ "id": 1, "locked_for_user": true }"#).unwrap();
        let hidden: ApiFile =
            serde_json::from_str(r#"{ "id": 2, "hidden_for_user": true }"#).unwrap();
        let plain: ApiFolder = serde_json::from_str(r#"{ "id": 3 }"#).unwrap();

        assert!(FolderEntry::Folder(locked).is_excluded());
        assert!(FolderEntry::File(hidden).is_excluded());
        assert!(!FolderEntry::Folder(plain).is_excluded());
    }

    #[test]
    fn test_topic_full_view_filter() {
        let wants: ApiDiscussionTopic =
            serde_json::from_str(r#"{ "id": 1, "discussion_subentry_count": 3 }"#).unwrap();
        assert!(wants.wants_full_view());

        let empty: ApiDiscussionTopic =
            serde_json::from_str(r#"{ "id": 2, "discussion_subentry_count": 0 }"#).unwrap();
        assert!(!empty.wants_full_view());

        let anonymous: ApiDiscussionTopic = serde_json::from_str(
            r#"{ "id": 3, "discussion_subentry_count": 5, "anonymous_state": "full_anonymity" }"#,
        )
        .unwrap();
        assert!(!anonymous.wants_full_view());
    }

    #[test]
    fn test_module_item_type_parses_known_and_other() {
        let item: ApiModuleItem = serde_json::from_str(
            r#"{ "id": 1, "type": "Page", "page_url": "week-1" }"#,
        )
        .unwrap();
        assert_eq!(item.item_type, ModuleItemType::Page);

        let item: ApiModuleItem =
            serde_json::from_str(r#"{ "id": 2, "type": "ExternalUrl" }"#).unwrap();
        assert_eq!(item.item_type, ModuleItemType::Other);

        let item: ApiModuleItem =
            serde_json::from_str(r#"{ "id": 3, "type": "SubHeader" }"#).unwrap();
        assert_eq!(item.item_type, ModuleItemType::SubHeader);
    }

    #[test]
    fn test_grading_period_resolution_may_be_absent() {
        let course: ApiCourse = serde_json::from_str(
            r#"{ "id": 1, "enrollments": [ { "user_id": 5 }, { "user_id": 5, "current_grading_period_id": 9 } ] }"#,
        )
        .unwrap();
        assert_eq!(course.current_grading_period_id(), Some(&ApiId("9".into())));

        let course: ApiCourse =
            serde_json::from_str(r#"{ "id": 1, "enrollments": [ { "user_id": 5 } ] }"#).unwrap();
        assert_eq!(course.current_grading_period_id(), None);
    }
}
