//! Subreddit word count
//!
//! Run with:
//!   RUST_LOG=backflow=debug cargo run --example word_count
//!
//! Pipeline:
//!   subreddits → throttle → fetch links → flatten → fetch comments → flatten → fold
//!
//! It showcases:
//! - Rate limiting requests to an API with `throttle`
//! - Bounded, unordered concurrency with `map_async_unordered`
//! - Retries around a flaky call with `retrying`
//! - Folding the stream into a word count keyed by subreddit
//!
//! The API is an in-memory fake with simulated latency and failures.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backflow::error::{Error, Result};
use backflow::prelude::*;
use tracing_subscriber::EnvFilter;

type WordCount = BTreeMap<String, BTreeMap<String, usize>>;

#[derive(Debug, Clone)]
struct Link {
    subreddit: String,
    id: u32,
}

#[derive(Debug, Clone)]
struct Comment {
    subreddit: String,
    body: String,
}

/// Fake remote API. The first comment request for every odd post fails.
struct FakeReddit {
    corpus: HashMap<&'static str, Vec<&'static str>>,
    failed_once: Mutex<HashSet<(String, u32)>>,
}

impl FakeReddit {
    fn new() -> Self {
        let mut corpus = HashMap::new();
        corpus.insert(
            "rust",
            vec![
                "ownership makes the borrow checker happy",
                "async streams need backpressure",
                "the borrow checker is a friend",
            ],
        );
        corpus.insert(
            "scala",
            vec![
                "akka streams implement reactive streams",
                "backpressure keeps the actors calm",
            ],
        );
        corpus.insert(
            "programming",
            vec![
                "streams all the way down",
                "demand flows upstream and elements flow downstream",
            ],
        );
        Self {
            corpus,
            failed_once: Mutex::new(HashSet::new()),
        }
    }

    async fn links(&self, subreddit: String) -> Result<Vec<Link>> {
        tokio::time::sleep(Duration::from_millis(40)).await;
        let posts = self
            .corpus
            .get(subreddit.as_str())
            .ok_or_else(|| Error::stage("links", format!("no such subreddit: {subreddit}")))?;
        Ok((0..posts.len() as u32)
            .map(|id| Link {
                subreddit: subreddit.clone(),
                id,
            })
            .collect())
    }

    async fn comments(&self, link: Link) -> Result<Vec<Comment>> {
        tokio::time::sleep(Duration::from_millis(25)).await;
        if link.id % 2 == 1 {
            let first_try = self
                .failed_once
                .lock()
                .map_err(|_| Error::stream("fake api state poisoned"))?
                .insert((link.subreddit.clone(), link.id));
            if first_try {
                return Err(Error::stage("comments", "503 service unavailable"));
            }
        }
        let body = self
            .corpus
            .get(link.subreddit.as_str())
            .and_then(|posts| posts.get(link.id as usize))
            .copied()
            .unwrap_or_default();
        // Two replies per post.
        Ok([body, body]
            .into_iter()
            .map(|body| Comment {
                subreddit: link.subreddit.clone(),
                body: body.to_string(),
            })
            .collect())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("backflow=info")),
        )
        .init();

    let api = Arc::new(FakeReddit::new());
    let materializer = Materializer::try_current()?.demand_batch(32);

    let links_api = api.clone();
    let fetch_links = move |subreddit: String| {
        let api = links_api.clone();
        async move { api.links(subreddit).await }
    };

    let comments_api = api.clone();
    let fetch_comments = retrying(
        "comments",
        RetryPolicy::new(3)
            .base_delay(Duration::from_millis(50))
            .with_jitter(Duration::from_millis(10)),
        move |link: Link| {
            let api = comments_api.clone();
            async move { api.comments(link).await }
        },
    );

    let count_words = Sink::fold(WordCount::new(), |mut counts, comment: Comment| {
        let words = counts.entry(comment.subreddit).or_default();
        for word in comment.body.split_whitespace() {
            *words.entry(word.to_lowercase()).or_default() += 1;
        }
        counts
    });

    let comments = Source::from_iter(vec!["rust", "scala", "programming"])
        .map(str::to_string)
        .throttle(Duration::from_millis(250))
        .map_async_unordered(4, fetch_links)
        .map_concat(|links| links)
        .map_async_unordered(8, fetch_comments)
        .map_concat(|comments| comments);

    println!("stages: {}", comments.stages().join(" → "));

    let counts = comments.run_with(count_words, &materializer)?.await?;

    let top: BTreeMap<&String, Vec<(&String, &usize)>> = counts
        .iter()
        .map(|(subreddit, words)| {
            let mut ranked: Vec<_> = words.iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            ranked.truncate(5);
            (subreddit, ranked)
        })
        .collect();

    println!(
        "{}",
        serde_json::to_string_pretty(&top).map_err(|e| Error::stage("report", e))?
    );
    Ok(())
}
