//! Discourse JSON API access: users, topics and their posts.

pub mod client;
pub mod models;
pub mod posts;
pub mod topics;
pub mod users;

pub use client::{ApiClient, ApiResponse};
pub use models::Post;
pub use posts::{PostPaginator, PostStream, RetryPolicy};
pub use topics::{Topic, TopicEnumerator};
pub use users::UserDirectory;
