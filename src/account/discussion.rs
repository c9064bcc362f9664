//! Scrub the forum footprint of a deleted account.

use serde_json::Value;

use crate::ports::{
    CourseCatalog, DiscussionError, DiscussionService, Thread, ThreadQuery,
};
use crate::user::User;

/// Attributes the discussion service refuses on thread updates.
const READ_ONLY_THREAD_FIELDS: &[&str] = &["pinned"];

/// Re-attribute every thread of `old_username` to the anonymized `user`, then
/// ask the service to retire the remaining comments.
///
/// Returns how many threads were rewritten.
pub async fn anonymize_discussions(
    discussion: &dyn DiscussionService,
    courses: &dyn CourseCatalog,
    user: &User,
    old_username: &str,
) -> Result<usize, DiscussionError> {
    discussion.upsert_user(user.id, &user.username).await?;

    let mut rewritten = 0;
    for course_id in courses.courses_for(user).await? {
        let query = ThreadQuery {
            course_id: Some(course_id.clone()),
            author_username: old_username.to_owned(),
            retired_username: user.username.clone(),
            paged_results: false,
        };

        for mut thread in discussion.search_threads(&query).await? {
            let Some(thread_id) = thread_id(&thread) else {
                tracing::warn!(%course_id, "discussion thread without id");
                continue;
            };

            anonymize_thread(&mut thread, &user.username);
            discussion.update_thread(&thread_id, &thread).await?;
            rewritten += 1;
        }
    }

    let query = ThreadQuery {
        course_id: None,
        author_username: old_username.to_owned(),
        retired_username: user.username.clone(),
        paged_results: false,
    };
    discussion.retire_threads(user.id, &query).await?;

    Ok(rewritten)
}

fn thread_id(thread: &Thread) -> Option<String> {
    match thread.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn anonymize_thread(thread: &mut Thread, username: &str) {
    for field in READ_ONLY_THREAD_FIELDS {
        thread.remove(*field);
    }
    thread.insert("anonymous".to_owned(), Value::Bool(true));
    thread.insert("anonymous_to_peers".to_owned(), Value::Bool(true));
    thread.insert(
        "author_username".to_owned(),
        Value::String(username.to_owned()),
    );
}
