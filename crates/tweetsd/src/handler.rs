//! Command handler for RESP server

use crate::resp::RespValue;
use tracing::debug;
use tweetcache::{ControllerError, TweetController};
use tweetstore::{
    Attachment, MemoryMediaStore, MemoryRepository, NewTweet, RepositoryError, RequestContext,
    Tweet, TweetId, UserId,
};

pub type Controller = TweetController<MemoryRepository, MemoryMediaStore>;

pub struct CommandHandler {
    controller: Controller,
}

impl CommandHandler {
    pub fn new(controller: Controller) -> Self {
        Self { controller }
    }

    pub async fn handle(&self, cmd: RespValue, ctx: &RequestContext) -> RespValue {
        let arr = match cmd {
            RespValue::Array(Some(arr)) if !arr.is_empty() => arr,
            _ => return RespValue::err("invalid command format"),
        };

        let command = match arr[0].as_bytes() {
            Some(name) => String::from_utf8_lossy(name).to_uppercase(),
            None => return RespValue::err("invalid command"),
        };
        let args = &arr[1..];
        debug!(command = %command, args = args.len(), "dispatch");

        match command.as_str() {
            "PING" => self.handle_ping(args),
            "TWEET.POST" => self.handle_post(args, ctx).await,
            "TWEET.GET" => self.handle_get(args, ctx).await,
            "TWEET.USER" => self.handle_user(args, ctx).await,
            "TWEET.DEL" => self.handle_del(args, ctx).await,
            "TWEET.MEDIA" => self.handle_media(args, ctx).await,
            "INFO" => self.handle_info(),
            "COMMAND" => RespValue::Array(Some(vec![])),
            _ => RespValue::err(format!("unknown command '{}'", command)),
        }
    }

    fn handle_ping(&self, args: &[RespValue]) -> RespValue {
        match args {
            [] => RespValue::SimpleString("PONG".to_string()),
            [msg] => msg.clone(),
            _ => wrong_arity("ping"),
        }
    }

    /// TWEET.POST <user_id> <content> [retweet_id] [MEDIA <name> <bytes>]
    async fn handle_post(&self, args: &[RespValue], ctx: &RequestContext) -> RespValue {
        if args.len() < 2 {
            return wrong_arity("tweet.post");
        }

        let user = match parse_id(&args[0]) {
            Ok(id) => UserId(id),
            Err(resp) => return resp,
        };
        let Some(content) = args[1].as_str() else {
            return RespValue::err("content must be UTF-8 text");
        };

        let mut tweet = NewTweet::new(user, content);
        let mut rest = &args[2..];
        if let Some(arg) = rest.first().filter(|arg| !is_keyword(arg, "MEDIA")) {
            match parse_id(arg) {
                Ok(id) => tweet = tweet.retweet_of(TweetId(id)),
                Err(resp) => return resp,
            }
            rest = &rest[1..];
        }
        match rest {
            [] => {}
            [keyword, name, data] if is_keyword(keyword, "MEDIA") => {
                let (Some(name), Some(data)) = (name.as_str(), data.as_bytes()) else {
                    return RespValue::err("media name and bytes must be strings");
                };
                tweet = tweet.with_attachment(Attachment::new(name, data));
            }
            _ => return RespValue::err("syntax error"),
        }

        match self.controller.post_tweet(ctx, tweet).await {
            Ok(stored) => match i64::try_from(stored.tweet_id.0) {
                Ok(id) => RespValue::Integer(id),
                Err(_) => RespValue::err(format!(
                    "tweet id {} does not fit a RESP integer",
                    stored.tweet_id
                )),
            },
            Err(e) => error_reply(&e),
        }
    }

    async fn handle_get(&self, args: &[RespValue], ctx: &RequestContext) -> RespValue {
        if args.is_empty() {
            return wrong_arity("tweet.get");
        }
        let ids = match parse_ids(args) {
            Ok(ids) => ids.into_iter().map(TweetId).collect::<Vec<_>>(),
            Err(resp) => return resp,
        };

        tweets_reply(self.controller.by_tweet_ids(ctx, &ids).await)
    }

    async fn handle_user(&self, args: &[RespValue], ctx: &RequestContext) -> RespValue {
        if args.is_empty() {
            return wrong_arity("tweet.user");
        }
        let ids = match parse_ids(args) {
            Ok(ids) => ids.into_iter().map(UserId).collect::<Vec<_>>(),
            Err(resp) => return resp,
        };

        tweets_reply(self.controller.by_user_ids(ctx, &ids).await)
    }

    async fn handle_del(&self, args: &[RespValue], ctx: &RequestContext) -> RespValue {
        let [arg] = args else {
            return wrong_arity("tweet.del");
        };
        let id = match parse_id(arg) {
            Ok(id) => TweetId(id),
            Err(resp) => return resp,
        };

        match self.controller.delete_tweet(ctx, id).await {
            Ok(()) => RespValue::ok(),
            Err(e) => error_reply(&e),
        }
    }

    async fn handle_media(&self, args: &[RespValue], ctx: &RequestContext) -> RespValue {
        let [arg] = args else {
            return wrong_arity("tweet.media");
        };
        let id = match parse_id(arg) {
            Ok(id) => TweetId(id),
            Err(resp) => return resp,
        };

        let tweet = match self.controller.by_tweet_ids(ctx, &[id]).await {
            Ok(tweets) => match tweets.into_iter().find(|t| t.tweet_id == id) {
                Some(tweet) => tweet,
                None => return error_reply(&RepositoryError::NotFound.into()),
            },
            Err(e) => return error_reply(&e),
        };

        match self.controller.media_of(ctx, &tweet).await {
            Ok(media) => RespValue::BulkString(media),
            Err(e) => error_reply(&e),
        }
    }

    fn handle_info(&self) -> RespValue {
        let mut info = format!(
            "# Server\r\n\
             tweetsd_version:{}\r\n\
             stored_tweets:{}\r\n\
             stored_media:{}\r\n\
             \r\n\
             # Cache\r\n",
            env!("CARGO_PKG_VERSION"),
            self.controller.repository().len(),
            self.controller.media().len(),
        );

        let Some(cache) = self.controller.cache() else {
            info.push_str("cache_enabled:0\r\n");
            return RespValue::bulk(info);
        };
        info.push_str(&format!(
            "cache_enabled:1\r\n\
             cache_size:{}\r\n\
             cache_capacity:{}\r\n\
             index_size:{}\r\n",
            cache.len(),
            cache.capacity(),
            cache.index_len(),
        ));

        // one `cache_<counter>` line per snapshot field
        let stats = match serde_json::to_value(cache.stats().snapshot()) {
            Ok(serde_json::Value::Object(fields)) => fields,
            Ok(other) => return RespValue::err(format!("unexpected stats shape {}", other)),
            Err(e) => return RespValue::err(e),
        };
        for (name, value) in stats {
            info.push_str(&format!("cache_{}:{}\r\n", name, value));
        }

        RespValue::bulk(info)
    }
}

fn wrong_arity(command: &str) -> RespValue {
    RespValue::err(format!(
        "wrong number of arguments for '{}' command",
        command
    ))
}

fn is_keyword(arg: &RespValue, keyword: &str) -> bool {
    arg.as_str().is_some_and(|s| s.eq_ignore_ascii_case(keyword))
}

fn parse_id(arg: &RespValue) -> Result<u64, RespValue> {
    arg.as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| RespValue::err("value is not a valid id"))
}

fn parse_ids(args: &[RespValue]) -> Result<Vec<u64>, RespValue> {
    args.iter().map(parse_id).collect()
}

fn tweets_reply(result: tweetcache::controller::Result<Vec<Tweet>>) -> RespValue {
    let tweets = match result {
        Ok(tweets) => tweets,
        Err(e) => return error_reply(&e),
    };

    let mut items = Vec::with_capacity(tweets.len());
    for tweet in &tweets {
        match tweet.to_bytes() {
            Ok(json) => items.push(RespValue::bulk(json)),
            Err(e) => return RespValue::err(e),
        }
    }
    RespValue::Array(Some(items))
}

fn error_reply(err: &ControllerError) -> RespValue {
    match err.repository() {
        Some(RepositoryError::NotFound) => RespValue::Error(format!("NOTFOUND {}", err)),
        _ => RespValue::err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tweetcache::TweetCache;

    fn command(parts: &[&str]) -> RespValue {
        RespValue::Array(Some(parts.iter().map(|p| RespValue::bulk(*p)).collect()))
    }

    fn handler(cached: bool) -> (Arc<MemoryRepository>, CommandHandler) {
        let repo = Arc::new(MemoryRepository::new());
        let cache = cached.then(|| Arc::new(TweetCache::new(100).unwrap()));
        let media = Arc::new(MemoryMediaStore::new());
        let controller = TweetController::new(Arc::clone(&repo), media, cache);
        (repo, CommandHandler::new(controller))
    }

    fn decode(resp: RespValue) -> Vec<Tweet> {
        let RespValue::Array(Some(items)) = resp else {
            panic!("expected array, got {:?}", resp);
        };
        items
            .iter()
            .map(|item| Tweet::from_bytes(item.as_bytes().unwrap()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_ping() {
        let (_, handler) = handler(true);
        let ctx = RequestContext::background();

        assert_eq!(
            handler.handle(command(&["ping"]), &ctx).await,
            RespValue::SimpleString("PONG".to_string())
        );
        assert_eq!(
            handler.handle(command(&["PING", "hi"]), &ctx).await,
            RespValue::bulk("hi")
        );
    }

    #[tokio::test]
    async fn test_post_then_read_back() {
        let (repo, handler) = handler(true);
        let ctx = RequestContext::background();

        let first = handler
            .handle(command(&["TWEET.POST", "7", "hello"]), &ctx)
            .await;
        assert_eq!(first, RespValue::Integer(1));
        let second = handler
            .handle(command(&["TWEET.POST", "7", "again", "1"]), &ctx)
            .await;
        assert_eq!(second, RespValue::Integer(2));

        let by_id = decode(handler.handle(command(&["TWEET.GET", "2"]), &ctx).await);
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].retweet_id, Some(TweetId(1)));

        let by_user = decode(handler.handle(command(&["tweet.user", "7"]), &ctx).await);
        assert_eq!(by_user.len(), 2);
        assert!(repo.calls().by_tweet.is_empty());
        assert!(repo.calls().by_user.is_empty());
    }

    #[tokio::test]
    async fn test_missing_tweet_is_notfound() {
        let (_, handler) = handler(true);
        let ctx = RequestContext::background();

        let resp = handler.handle(command(&["TWEET.GET", "99"]), &ctx).await;
        assert_eq!(
            resp,
            RespValue::Error("NOTFOUND there are no tweets for your request".to_string())
        );
    }

    #[tokio::test]
    async fn test_delete() {
        let (repo, handler) = handler(true);
        let ctx = RequestContext::background();
        handler
            .handle(command(&["TWEET.POST", "3", "bye"]), &ctx)
            .await;

        let resp = handler.handle(command(&["TWEET.DEL", "1"]), &ctx).await;
        assert_eq!(resp, RespValue::ok());
        assert!(repo.is_empty());

        let resp = handler.handle(command(&["TWEET.GET", "1"]), &ctx).await;
        assert!(matches!(resp, RespValue::Error(msg) if msg.starts_with("NOTFOUND")));
    }

    #[tokio::test]
    async fn test_bad_arguments() {
        let (_, handler) = handler(false);
        let ctx = RequestContext::background();

        let resp = handler.handle(command(&["TWEET.GET", "abc"]), &ctx).await;
        assert_eq!(resp, RespValue::err("value is not a valid id"));

        let resp = handler.handle(command(&["TWEET.DEL"]), &ctx).await;
        assert_eq!(
            resp,
            RespValue::err("wrong number of arguments for 'tweet.del' command")
        );

        let resp = handler.handle(command(&["FLUSHALL"]), &ctx).await;
        assert_eq!(resp, RespValue::err("unknown command 'FLUSHALL'"));

        let resp = handler.handle(RespValue::Integer(1), &ctx).await;
        assert_eq!(resp, RespValue::err("invalid command format"));
    }

    #[tokio::test]
    async fn test_info_reports_cache_state() {
        let (_, handler) = handler(true);
        let ctx = RequestContext::background();
        handler
            .handle(command(&["TWEET.POST", "1", "x"]), &ctx)
            .await;

        let resp = handler.handle(command(&["INFO"]), &ctx).await;
        let info = resp.as_str().unwrap().to_string();
        assert!(info.contains("cache_enabled:1\r\n"));
        assert!(info.contains("cache_size:2\r\n"));
        assert!(info.contains("index_size:1\r\n"));
        assert!(info.contains("cache_inserts:2\r\n"));
        assert!(info.contains("cache_hits:0\r\n"));
        assert!(info.contains("cache_hit_ratio:0.0\r\n"));

        let (_, uncached) = self::handler(false);
        let resp = uncached.handle(command(&["INFO"]), &ctx).await;
        assert!(resp.as_str().unwrap().contains("cache_enabled:0\r\n"));
    }

    #[tokio::test]
    async fn test_cancelled_context_is_err() {
        let (_, handler) = handler(true);
        let ctx = RequestContext::background().child_with_timeout(Duration::from_secs(5));
        ctx.cancel();

        let resp = handler
            .handle(command(&["TWEET.POST", "1", "late"]), &ctx)
            .await;
        assert_eq!(resp, RespValue::err(RepositoryError::Cancelled));
    }

    #[tokio::test]
    async fn test_post_with_media() {
        let (_, handler) = handler(true);
        let ctx = RequestContext::background();

        let resp = handler
            .handle(command(&["TWEET.POST", "5", "pic", "MEDIA", "a.png", "bytes"]), &ctx)
            .await;
        assert_eq!(resp, RespValue::Integer(1));
        let resp = handler
            .handle(command(&["TWEET.POST", "5", "again", "1", "media", "b.png", "more"]), &ctx)
            .await;
        assert_eq!(resp, RespValue::Integer(2));

        let tweets = decode(handler.handle(command(&["TWEET.GET", "2"]), &ctx).await);
        assert_eq!(tweets[0].retweet_id, Some(TweetId(1)));
        assert_eq!(tweets[0].media_url.as_deref(), Some("media/2/b.png"));

        let resp = handler.handle(command(&["TWEET.MEDIA", "1"]), &ctx).await;
        assert_eq!(resp, RespValue::bulk("bytes"));
    }

    #[tokio::test]
    async fn test_media_of_plain_tweet_is_null() {
        let (_, handler) = handler(false);
        let ctx = RequestContext::background();
        handler.handle(command(&["TWEET.POST", "5", "text"]), &ctx).await;

        let resp = handler.handle(command(&["TWEET.MEDIA", "1"]), &ctx).await;
        assert_eq!(resp, RespValue::BulkString(None));
    }

    #[tokio::test]
    async fn test_delete_drops_media() {
        let (_, handler) = handler(true);
        let ctx = RequestContext::background();
        handler
            .handle(command(&["TWEET.POST", "5", "pic", "MEDIA", "a.png", "bytes"]), &ctx)
            .await;

        let resp = handler.handle(command(&["TWEET.DEL", "1"]), &ctx).await;
        assert_eq!(resp, RespValue::ok());

        let info = handler.handle(command(&["INFO"]), &ctx).await;
        assert!(info.as_str().unwrap().contains("stored_media:0\r\n"));
    }

    #[tokio::test]
    async fn test_post_syntax_errors() {
        let (repo, handler) = handler(true);
        let ctx = RequestContext::background();

        let resp = handler
            .handle(command(&["TWEET.POST", "5", "pic", "MEDIA", "a.png"]), &ctx)
            .await;
        assert_eq!(resp, RespValue::err("syntax error"));

        let resp = handler
            .handle(command(&["TWEET.POST", "5", "pic", "1", "2"]), &ctx)
            .await;
        assert_eq!(resp, RespValue::err("syntax error"));
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_id_beyond_resp_integer_is_err() {
        let (repo, handler) = handler(true);
        let ctx = RequestContext::background();
        repo.insert(Tweet {
            user_id: UserId(1),
            tweet_id: TweetId(i64::MAX as u64),
            retweet_id: None,
            content: "last".to_string(),
            media_url: None,
            created_at: chrono::Utc::now(),
        });

        let resp = handler.handle(command(&["TWEET.POST", "1", "overflow"]), &ctx).await;

        let expected = format!("tweet id {} does not fit a RESP integer", 1u64 << 63);
        assert_eq!(resp, RespValue::err(expected));
    }
}
