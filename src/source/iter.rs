use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::pipeline::channel::Outlet;
use crate::pipeline::stage::{SourceStage, StageContext};

/// Emits the elements of a cloneable iterable; each run iterates a fresh clone.
pub struct IterSource<I> {
    iter: I,
}

impl<I> IterSource<I> {
    pub fn new(iter: I) -> Self {
        Self { iter }
    }
}

#[async_trait]
impl<I, T> SourceStage<T> for IterSource<I>
where
    T: Send + 'static,
    I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
    I::IntoIter: Send,
{
    fn stage_name(&self) -> &'static str {
        "from_iter"
    }

    async fn produce(&self, output: &mut Outlet<T>, _ctx: &StageContext) -> Result<()> {
        for item in self.iter.clone() {
            if !output.send(item).await? {
                #[cfg(feature = "tracing")]
                tracing::event!(tracing::Level::DEBUG, event = "backflow.cancelled", stage = "from_iter", "backflow.cancelled");
                break;
            }
        }
        Ok(())
    }
}

/// Completes immediately, or fails immediately when holding an error.
pub struct EmptySource {
    error: Option<Error>,
}

impl EmptySource {
    pub fn new() -> Self {
        Self { error: None }
    }

    pub fn failed(error: Error) -> Self {
        Self { error: Some(error) }
    }
}

impl Default for EmptySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> SourceStage<T> for EmptySource
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        if self.error.is_some() {
            "failed"
        } else {
            "empty"
        }
    }

    async fn produce(&self, _output: &mut Outlet<T>, _ctx: &StageContext) -> Result<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}
