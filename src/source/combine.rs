use std::iter;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::error::Result;
use crate::pipeline::channel::{Inlet, Outlet};
use crate::pipeline::junction;
use crate::pipeline::stage::{drive_source, SourceStage, StageContext};

/// Pairs the elements of two sources; see [`Source::zip`](crate::source::Source::zip).
pub(crate) struct ZipSources<A, B>
where
    A: Send + 'static,
    B: Send + 'static,
{
    left: Arc<dyn SourceStage<A>>,
    right: Arc<dyn SourceStage<B>>,
}

impl<A, B> ZipSources<A, B>
where
    A: Send + 'static,
    B: Send + 'static,
{
    pub fn new(left: Arc<dyn SourceStage<A>>, right: Arc<dyn SourceStage<B>>) -> Self {
        Self { left, right }
    }
}

#[async_trait]
impl<A, B> SourceStage<(A, B)> for ZipSources<A, B>
where
    A: Send + 'static,
    B: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "zip"
    }

    fn describe(&self, names: &mut Vec<&'static str>) {
        names.push("zip");
        self.left.describe(names);
        self.right.describe(names);
    }

    async fn produce(&self, output: &mut Outlet<(A, B)>, ctx: &StageContext) -> Result<()> {
        let (mut left_out, mut left_in) = ctx.channel::<A>();
        let (mut right_out, mut right_in) = ctx.channel::<B>();

        let (zipped, left, right) = tokio::join!(
            junction::zip(&mut left_in, &mut right_in, output, |a, b| (a, b)),
            drive_source(&*self.left, &mut left_out, ctx),
            drive_source(&*self.right, &mut right_out, ctx),
        );
        junction::first_error([zipped, left, right])
    }
}

/// Interleaves several sources; see [`Source::merge`](crate::source::Source::merge).
pub(crate) struct MergeSources<T>
where
    T: Send + 'static,
{
    sources: Vec<Arc<dyn SourceStage<T>>>,
}

impl<T> MergeSources<T>
where
    T: Send + 'static,
{
    pub fn new(sources: Vec<Arc<dyn SourceStage<T>>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl<T> SourceStage<T> for MergeSources<T>
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "merge"
    }

    fn describe(&self, names: &mut Vec<&'static str>) {
        names.push("merge");
        for source in &self.sources {
            source.describe(names);
        }
    }

    async fn produce(&self, output: &mut Outlet<T>, ctx: &StageContext) -> Result<()> {
        let (mut outlets, mut inlets): (Vec<Outlet<T>>, Vec<Inlet<T>>) =
            self.sources.iter().map(|_| ctx.channel::<T>()).unzip();

        let producers = join_all(
            self.sources
                .iter()
                .zip(outlets.iter_mut())
                .map(|(source, out)| drive_source(&**source, out, ctx)),
        );
        let (merged, produced) = tokio::join!(junction::merge(&mut inlets, output), producers);
        junction::first_error(iter::once(merged).chain(produced))
    }
}
