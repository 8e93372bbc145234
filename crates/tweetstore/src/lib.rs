//! # tweetstore
//!
//! Tweet records and the backing repository the tweets service reads through.
//!
//! ## Contents
//! - **Model**: `Tweet`, `NewTweet` and the `UserId`/`TweetId` newtypes
//! - **Repository**: the batched, async `TweetRepository` contract
//! - **Context**: per-request cancellation and deadlines for repository calls
//! - **Media**: the `MediaStore` blob contract for attachments
//! - **MemoryRepository** / **MemoryMediaStore**: in-process stand-ins for the
//!   SQL store and the blob store

#![warn(missing_docs)]

mod context;
mod error;
mod media;
mod memory;
mod model;
mod repository;

pub use context::RequestContext;
pub use error::{RepositoryError, Result};
pub use media::{Attachment, MediaLog, MediaStore, MemoryMediaStore};
pub use memory::{CallLog, MemoryRepository};
pub use model::{NewTweet, Tweet, TweetId, UserId};
pub use repository::TweetRepository;
