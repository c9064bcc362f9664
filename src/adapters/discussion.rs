//! HTTP client for the discussion (forum) service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;

use crate::config::Discussion;
use crate::ports::{
    CourseCatalog, DiscussionError, DiscussionService, Thread, ThreadQuery,
};
use crate::user::User;

const API_KEY_HEADER: &str = "X-Edx-Api-Key";
const DEFAULT_TIMEOUT: u64 = 5;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    collection: Vec<Thread>,
}

/// Discussion service reached over its REST API.
#[derive(Debug, Clone)]
pub struct HttpDiscussionService {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpDiscussionService {
    /// Create a new [`HttpDiscussionService`].
    pub fn new(config: &Discussion) -> Result<Self, DiscussionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(
                config.timeout.unwrap_or(DEFAULT_TIMEOUT),
            ))
            .build()?;

        Ok(Self {
            base_url: config.address.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, &url);

        if let Some(ref api_key) = self.api_key {
            req = req.header(API_KEY_HEADER, api_key);
        }

        req
    }

    async fn execute(
        &self,
        req: RequestBuilder,
    ) -> Result<Response, DiscussionError> {
        let response = req.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DiscussionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl DiscussionService for HttpDiscussionService {
    async fn upsert_user(
        &self,
        user_id: i64,
        username: &str,
    ) -> Result<(), DiscussionError> {
        let req = self
            .request(Method::PUT, &format!("/api/v1/users/{user_id}"))
            .json(&json!({ "id": user_id.to_string(), "username": username }));
        self.execute(req).await?;
        Ok(())
    }

    async fn search_threads(
        &self,
        query: &ThreadQuery,
    ) -> Result<Vec<Thread>, DiscussionError> {
        let req = self
            .request(Method::GET, "/api/v1/search/threads")
            .query(query);
        let response: SearchResponse = self.execute(req).await?.json().await?;

        tracing::debug!(
            course_id = ?query.course_id,
            threads = response.collection.len(),
            "discussion threads found"
        );
        Ok(response.collection)
    }

    async fn update_thread(
        &self,
        thread_id: &str,
        thread: &Thread,
    ) -> Result<(), DiscussionError> {
        let req = self
            .request(Method::PUT, &format!("/api/v1/threads/{thread_id}"))
            .json(thread);
        self.execute(req).await?;
        Ok(())
    }

    async fn retire_threads(
        &self,
        user_id: i64,
        query: &ThreadQuery,
    ) -> Result<(), DiscussionError> {
        let req = self
            .request(
                Method::POST,
                &format!("/api/v1/users/{user_id}/retire_threads"),
            )
            .json(query);
        self.execute(req).await?;
        Ok(())
    }
}

/// Stand-in used when no discussion service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledDiscussion;

impl DisabledDiscussion {
    fn unavailable<T>() -> Result<T, DiscussionError> {
        Err(DiscussionError::Unavailable(
            "no discussion service configured".to_owned(),
        ))
    }
}

#[async_trait]
impl DiscussionService for DisabledDiscussion {
    async fn upsert_user(&self, _: i64, _: &str) -> Result<(), DiscussionError> {
        Self::unavailable()
    }

    async fn search_threads(
        &self,
        _: &ThreadQuery,
    ) -> Result<Vec<Thread>, DiscussionError> {
        Self::unavailable()
    }

    async fn update_thread(
        &self,
        _: &str,
        _: &Thread,
    ) -> Result<(), DiscussionError> {
        Self::unavailable()
    }

    async fn retire_threads(
        &self,
        _: i64,
        _: &ThreadQuery,
    ) -> Result<(), DiscussionError> {
        Self::unavailable()
    }
}

/// Every user is considered part of the configured courses.
#[derive(Debug, Clone, Default)]
pub struct StaticCourseCatalog {
    courses: Vec<String>,
}

impl StaticCourseCatalog {
    pub fn new(courses: Vec<String>) -> Self {
        Self { courses }
    }
}

#[async_trait]
impl CourseCatalog for StaticCourseCatalog {
    async fn courses_for(&self, _: &User) -> Result<Vec<String>, DiscussionError> {
        Ok(self.courses.clone())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn service(server: &MockServer) -> HttpDiscussionService {
        HttpDiscussionService::new(&Discussion {
            address: server.uri(),
            api_key: Some("forum-key".into()),
            courses: Vec::new(),
            timeout: Some(1),
        })
        .unwrap()
    }

    fn query() -> ThreadQuery {
        ThreadQuery {
            course_id: Some("course-v1:Org+Demo+2024".into()),
            author_username: "alice".into(),
            retired_username: "0f1e2d".into(),
            paged_results: false,
        }
    }

    #[tokio::test]
    async fn test_upsert_user() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/users/42"))
            .and(header(API_KEY_HEADER, "forum-key"))
            .and(body_json(json!({ "id": "42", "username": "0f1e2d" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        service(&server).upsert_user(42, "0f1e2d").await.unwrap();
    }

    #[tokio::test]
    async fn test_search_threads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/search/threads"))
            .and(query_param("course_id", "course-v1:Org+Demo+2024"))
            .and(query_param("author_username", "alice"))
            .and(query_param("paged_results", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "collection": [
                    { "id": "t1", "author_username": "alice", "pinned": false }
                ],
                "page": 1,
                "num_pages": 1
            })))
            .mount(&server)
            .await;

        let threads = service(&server).search_threads(&query()).await.unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0]["id"], json!("t1"));
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/users/42/retire_threads"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = service(&server)
            .retire_threads(42, &query())
            .await
            .unwrap_err();
        match err {
            DiscussionError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            },
            err => panic!("unexpected error: {err}"),
        }
    }

    #[tokio::test]
    async fn test_disabled() {
        assert!(matches!(
            DisabledDiscussion.upsert_user(1, "x").await,
            Err(DiscussionError::Unavailable(_))
        ));
    }
}
