//! Article fetching and extraction for MeetNews.
//!
//! - [`engine`]: concurrent fetcher behind the [`FetchClient`] trait
//! - [`extract`]: HTML to headline and body text

pub mod engine;
pub mod extract;

pub use engine::{ArticleFetcher, FetchClient};
pub use extract::{Article, extract_article};
