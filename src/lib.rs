//! Course Sync Library
//!
//! This library implements the offline synchronization engine of a
//! learning-management client: per-content-type downloaders that fetch a
//! course's content, rewrite embedded HTML to reference locally-cached
//! assets, download attachments with freshness checks, and prune local
//! files no longer referenced remotely.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`env`] - Course identity, session, and offline directory layout
//! - [`fetch`] - Paginated collection fetches against the course API
//! - [`html`] - HTML asset localization and rewriting
//! - [`files`] - File tree traversal and freshness-checked downloads
//! - [`content`] - Per-content-type downloaders behind one trait
//! - [`studio`] - Cross-course Studio video aggregation

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod content;
pub mod env;
pub mod error;
pub mod fetch;
pub mod files;
pub mod html;
pub mod model;
pub mod studio;

// Re-export commonly used types
pub use content::{ContentDownloader, ContentType, downloaders_for};
pub use env::{
    CourseSyncId, Environment, EnvironmentResolver, LoginSession, StaticEnvironmentResolver,
};
pub use error::SyncError;
pub use files::FileSync;
pub use html::HtmlLocalizer;
pub use studio::StudioMediaSync;
