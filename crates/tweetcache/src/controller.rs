//! Cache-aside tweet lookups
//!
//! Batch reads go `requested ids -> partition into hits and misses -> one
//! repository call for the misses -> fill the cache -> merge`. Steps are not
//! atomic with respect to each other: two requests missing on the same id both
//! fetch it and both fill the cache, and the second write wins. Both writes
//! carry the same row, so nothing serializes the flow beyond the cache's own
//! lock.
//!
//! Merged results list cache hits first, in request order, then repository
//! rows in the order the repository returned them. No ordering is promised
//! across that boundary.
//!
//! Attached media lives in a [`MediaStore`]. It is uploaded before the row is
//! written and deleted only once the row and its cache entries are gone.

use std::sync::Arc;

use tracing::{debug, warn};
use tweetstore::{
    MediaStore, NewTweet, RepositoryError, RequestContext, Tweet, TweetId, TweetRepository, UserId,
};

use crate::cache::TweetCache;
use crate::error::{CacheError, ControllerError};
use crate::keys::CacheKey;

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, ControllerError>;

/// Tweet lookups and writes backed by a repository and a media store,
/// fronted by an optional cache
pub struct TweetController<R, M> {
    repo: Arc<R>,
    media: Arc<M>,
    cache: Option<Arc<TweetCache>>,
}

impl<R, M> Clone for TweetController<R, M> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            media: Arc::clone(&self.media),
            cache: self.cache.clone(),
        }
    }
}

impl<R: TweetRepository, M: MediaStore> TweetController<R, M> {
    /// Create a controller. Without a cache every call goes to the repository.
    pub fn new(repo: Arc<R>, media: Arc<M>, cache: Option<Arc<TweetCache>>) -> Self {
        Self { repo, media, cache }
    }

    /// The cache in front of the repository, if any
    pub fn cache(&self) -> Option<&TweetCache> {
        self.cache.as_deref()
    }

    /// The backing repository
    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// The media store
    pub fn media(&self) -> &M {
        &self.media
    }

    /// Store a new tweet, then cache it under both key shapes.
    ///
    /// An attachment is uploaded first and a failed upload stops the post.
    /// Nothing is cached unless the repository write succeeds; if it fails the
    /// uploaded media is removed again.
    pub async fn post_tweet(&self, ctx: &RequestContext, mut tweet: NewTweet) -> Result<Tweet> {
        let uploaded = match tweet.attachment.take() {
            Some(attachment) => {
                let location = ctx.run(self.media.save(attachment)).await?;
                tweet.media_url = Some(location.clone());
                Some(location)
            }
            None => None,
        };

        let stored = match ctx.run(self.repo.put(tweet)).await {
            Ok(stored) => stored,
            Err(err) => {
                if let Some(location) = uploaded {
                    if let Err(cleanup) = ctx.run(self.media.delete(&location)).await {
                        warn!(%location, error = %cleanup, "orphaned media after failed post");
                    }
                }
                return Err(err.into());
            }
        };
        self.fill(std::slice::from_ref(&stored))?;
        debug!(tweet = %stored.tweet_id, user = %stored.user_id, "posted tweet");
        Ok(stored)
    }

    /// Tweets with the given ids.
    ///
    /// Ids are de-duplicated. Misses are fetched with a single repository
    /// call; any repository error fails the whole batch.
    pub async fn by_tweet_ids(&self, ctx: &RequestContext, ids: &[TweetId]) -> Result<Vec<Tweet>> {
        let mut misses = dedup(ids);
        if misses.is_empty() {
            return Ok(Vec::new());
        }

        let mut tweets = match &self.cache {
            Some(cache) => partition_hits(&mut misses, |&id| {
                self.cached_tweet(cache, id).map(|tweet| vec![tweet])
            }),
            None => Vec::new(),
        };
        if misses.is_empty() {
            return Ok(tweets);
        }

        debug!(hits = tweets.len(), misses = misses.len(), "fetching tweets by id");
        let fetched = ctx.run(self.repo.get_by_tweet(&misses)).await?;
        self.fill(&fetched)?;
        tweets.extend(fetched);
        Ok(tweets)
    }

    /// Tweets owned by the given users.
    ///
    /// A user counts as a hit when the cache holds at least one of their
    /// tweets and the prefix index agrees with the store. An index
    /// inconsistency drops that user's cached tweets and falls back to the
    /// repository for them.
    pub async fn by_user_ids(&self, ctx: &RequestContext, ids: &[UserId]) -> Result<Vec<Tweet>> {
        let mut misses = dedup(ids);
        if misses.is_empty() {
            return Ok(Vec::new());
        }

        let mut tweets = match &self.cache {
            Some(cache) => partition_hits(&mut misses, |&owner| self.cached_user(cache, owner)),
            None => Vec::new(),
        };
        if misses.is_empty() {
            return Ok(tweets);
        }

        debug!(hits = tweets.len(), misses = misses.len(), "fetching tweets by user");
        let fetched = ctx.run(self.repo.get_by_user(&misses)).await?;
        self.fill(&fetched)?;
        tweets.extend(fetched);
        Ok(tweets)
    }

    /// Delete a tweet, drop both of its cache entries, then its media.
    ///
    /// The owner is needed to name the compound key, so the tweet is read
    /// first, from the cache when possible. If the repository delete fails the
    /// cache and the media are left as they were.
    pub async fn delete_tweet(&self, ctx: &RequestContext, id: TweetId) -> Result<()> {
        let tweet = match self.peek_tweet(id) {
            Some(tweet) => tweet,
            None => {
                let rows = ctx.run(self.repo.get_by_tweet(&[id])).await?;
                rows.into_iter()
                    .find(|row| row.tweet_id == id)
                    .ok_or(RepositoryError::NotFound)?
            }
        };

        ctx.run(self.repo.delete(id)).await?;

        if let Some(cache) = &self.cache {
            cache.remove_many(&[CacheKey::tweet(id), CacheKey::user_tweet(tweet.user_id, id)]);
        }
        if let Some(location) = &tweet.media_url {
            ctx.run(self.media.delete(location)).await?;
        }
        debug!(tweet = %id, user = %tweet.user_id, "deleted tweet");
        Ok(())
    }

    /// Bytes of the media attached to `tweet`, if it has any
    pub async fn media_of(&self, ctx: &RequestContext, tweet: &Tweet) -> Result<Option<Vec<u8>>> {
        match &tweet.media_url {
            Some(location) => Ok(Some(ctx.run(self.media.load(location)).await?)),
            None => Ok(None),
        }
    }

    /// Write rows under both key shapes
    fn fill(&self, rows: &[Tweet]) -> Result<()> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };

        let mut entries = Vec::with_capacity(rows.len() * 2);
        for row in rows {
            let bytes = row.to_bytes()?;
            entries.push((CacheKey::user_tweet(row.user_id, row.tweet_id), bytes.clone()));
            entries.push((CacheKey::tweet(row.tweet_id), bytes));
        }
        cache.put_many(entries);
        Ok(())
    }

    fn peek_tweet(&self, id: TweetId) -> Option<Tweet> {
        let bytes = self.cache.as_ref()?.peek(&CacheKey::tweet(id))?;
        Tweet::from_bytes(&bytes).ok()
    }

    fn cached_tweet(&self, cache: &TweetCache, id: TweetId) -> Option<Tweet> {
        let key = CacheKey::tweet(id);
        let bytes = cache.get(&key)?;

        match Tweet::from_bytes(&bytes) {
            Ok(tweet) => Some(tweet),
            Err(err) => {
                warn!(%key, error = %err, "dropping undecodable cache entry");
                cache.remove(&key);
                None
            }
        }
    }

    fn cached_user(&self, cache: &TweetCache, owner: UserId) -> Option<Vec<Tweet>> {
        let values = match cache.find_by_prefix(owner) {
            Ok(values) => values,
            Err(CacheError::IndexInconsistency { entity, .. }) => {
                warn!(%owner, %entity, "treating user region as cold");
                cache.invalidate_prefix(owner);
                return None;
            }
            Err(err) => {
                warn!(%owner, error = %err, "prefix lookup failed");
                return None;
            }
        };
        if values.is_empty() {
            return None;
        }

        let decoded: std::result::Result<Vec<Tweet>, _> =
            values.iter().map(|bytes| Tweet::from_bytes(bytes)).collect();
        match decoded {
            Ok(tweets) => Some(tweets),
            Err(err) => {
                warn!(%owner, error = %err, "dropping undecodable user region");
                cache.invalidate_prefix(owner);
                None
            }
        }
    }
}

/// Move every id that `lookup` satisfies out of `ids`, returning what it found.
///
/// Satisfied positions are removed back to front so earlier positions stay
/// valid while the vector shrinks.
pub(crate) fn partition_hits<I, T, F>(ids: &mut Vec<I>, mut lookup: F) -> Vec<T>
where
    F: FnMut(&I) -> Option<Vec<T>>,
{
    let mut hits = Vec::new();
    let mut satisfied = Vec::new();

    for (pos, id) in ids.iter().enumerate() {
        if let Some(found) = lookup(id) {
            hits.extend(found);
            satisfied.push(pos);
        }
    }

    for &pos in satisfied.iter().rev() {
        ids.remove(pos);
    }
    hits
}

/// Drop repeated ids, keeping first occurrences in order
fn dedup<I: PartialEq + Copy>(ids: &[I]) -> Vec<I> {
    let mut unique = Vec::with_capacity(ids.len());
    for &id in ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    unique
}
