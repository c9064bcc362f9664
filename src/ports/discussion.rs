//! Discussion (forum) service port.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::user::User;

/// Thread as returned by the discussion service.
pub type Thread = Map<String, Value>;

/// Search parameters for threads written by a retiring author.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    pub author_username: String,
    pub retired_username: String,
    pub paged_results: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DiscussionError {
    #[error("discussion service request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("discussion service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("discussion service is unavailable: {0}")]
    Unavailable(String),
}

/// Port for the discussion service, authoritative for threads and comments.
#[async_trait]
pub trait DiscussionService: Send + Sync {
    /// Create or update the discussion identity of a user.
    async fn upsert_user(
        &self,
        user_id: i64,
        username: &str,
    ) -> Result<(), DiscussionError>;

    async fn search_threads(
        &self,
        query: &ThreadQuery,
    ) -> Result<Vec<Thread>, DiscussionError>;

    async fn update_thread(
        &self,
        thread_id: &str,
        thread: &Thread,
    ) -> Result<(), DiscussionError>;

    /// Ask the service to scrub the attribution of every comment matched by
    /// `query`.
    async fn retire_threads(
        &self,
        user_id: i64,
        query: &ThreadQuery,
    ) -> Result<(), DiscussionError>;
}

/// Port listing the courses a user is associated with.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    async fn courses_for(
        &self,
        user: &User,
    ) -> Result<Vec<String>, DiscussionError>;
}
