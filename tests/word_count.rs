use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use backflow::error::{Error, Result};
use backflow::prelude::*;
use tokio::time::{sleep, Instant};

mod common;
use common::materializer;

type Counts = BTreeMap<String, BTreeMap<String, usize>>;

#[derive(Clone, Debug)]
struct Link {
    subreddit: String,
    id: String,
}

#[derive(Clone, Debug)]
struct Comment {
    subreddit: String,
    body: String,
}

/// In-memory stand-in for the remote API: subreddit -> link id -> comments.
#[derive(Default)]
struct FakeApi {
    threads: HashMap<String, Vec<(String, Vec<String>)>>,
}

impl FakeApi {
    fn with_thread(mut self, subreddit: &str, link: &str, comments: &[&str]) -> Self {
        self.threads
            .entry(subreddit.to_string())
            .or_default()
            .push((link.to_string(), comments.iter().map(|c| c.to_string()).collect()));
        self
    }

    async fn links(&self, subreddit: String) -> Result<Vec<Link>> {
        sleep(Duration::from_millis(30)).await;
        let threads = self
            .threads
            .get(&subreddit)
            .ok_or_else(|| Error::stage("links", format!("unknown subreddit `{subreddit}`")))?;
        Ok(threads
            .iter()
            .map(|(id, _)| Link {
                subreddit: subreddit.clone(),
                id: id.clone(),
            })
            .collect())
    }

    async fn comments(&self, link: Link) -> Result<Vec<Comment>> {
        sleep(Duration::from_millis(20)).await;
        let bodies = self
            .threads
            .get(&link.subreddit)
            .and_then(|threads| threads.iter().find(|(id, _)| *id == link.id))
            .map(|(_, bodies)| bodies.clone())
            .unwrap_or_default();
        Ok(bodies
            .into_iter()
            .map(|body| Comment {
                subreddit: link.subreddit.clone(),
                body,
            })
            .collect())
    }
}

fn word_counts(api: Arc<FakeApi>, subreddits: Vec<&'static str>) -> Source<Comment> {
    let links_api = api.clone();
    Source::from_iter(subreddits)
        .map(str::to_string)
        .throttle(Duration::from_millis(100))
        .map_async_unordered(4, move |sub| {
            let api = links_api.clone();
            async move { api.links(sub).await }
        })
        .map_concat(|links| links)
        .map_async_unordered(8, move |link| {
            let api = api.clone();
            async move { api.comments(link).await }
        })
        .map_concat(|comments| comments)
}

fn count_words() -> Sink<Comment, Counts> {
    Sink::fold(Counts::new(), |mut counts, comment: Comment| {
        let words = counts.entry(comment.subreddit).or_default();
        for word in comment.body.split_whitespace() {
            *words.entry(word.to_lowercase()).or_default() += 1;
        }
        counts
    })
}

#[tokio::test(start_paused = true)]
async fn counts_words_per_subreddit() -> Result<()> {
    let api = Arc::new(
        FakeApi::default()
            .with_thread("a", "a1", &["Hello world", "hello again"])
            .with_thread("b", "b1", &["rust streams", "Rust"]),
    );

    let start = Instant::now();
    let counts = word_counts(api, vec!["a", "b"])
        .run_with(count_words(), &materializer())?
        .await?;

    assert_eq!(counts.len(), 2);
    assert_eq!(counts["a"]["hello"], 2);
    assert_eq!(counts["a"]["world"], 1);
    assert_eq!(counts["b"]["rust"], 2);
    assert_eq!(counts["b"]["streams"], 1);
    // The second subreddit waits one throttle interval.
    assert!(start.elapsed() >= Duration::from_millis(100));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unknown_subreddit_fails_the_run() -> Result<()> {
    let api = Arc::new(FakeApi::default().with_thread("a", "a1", &["fine"]));

    let res = word_counts(api, vec!["a", "nope"])
        .run_with(count_words(), &materializer())?
        .await;

    match res {
        Err(Error::Stage { stage: "links", source }) => {
            assert_eq!(source.to_string(), "unknown subreddit `nope`");
        }
        other => panic!("expected a lookup failure, got {other:?}"),
    }
    Ok(())
}
