//! # backflow
//!
//! **Demand-driven stream composition on top of Tokio.**
//!
//! `backflow` builds **backpressure-aware**, **cancellable** and **reusable**
//! stream pipelines out of immutable blueprints:
//!
//! - elements flow downstream
//! - demand flows upstream
//! - nothing is produced that nobody asked for
//!
//! ---
//!
//! ## Core Model
//!
//! Every edge of a running pipeline follows the Reactive Streams contract:
//!
//! ```text
//! Publisher ──onNext/onError/onComplete──▶ Subscriber
//!     ▲                                        │
//!     └─────────── request(n) / cancel ────────┘
//! ```
//!
//! A publisher never emits more than the subscriber requested and never
//! signals after a terminal signal. [`Outlet`] and [`Inlet`] are the two ends
//! of one such edge.
//!
//! Blueprints describe what to run:
//!
//! - [`Source`]: one output
//! - [`Flow`]: one input, one output
//! - [`Sink`]: one input, materializes a value
//! - [`Graph`]: any topology built with a [`GraphBuilder`], using zip,
//!   broadcast and merge junctions
//!
//! A [`Materializer`] turns a complete graph into running tasks and returns
//! a [`Handle`] that resolves to the sink's value or to the first error.
//!
//! ---
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use backflow::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> backflow::error::Result<()> {
//!     let mat = Materializer::try_current()?;
//!
//!     let lengths = Source::from_iter(vec!["alpha", "beta", "gamma"])
//!         .throttle(Duration::from_millis(100))
//!         .map_async_unordered(2, |word: &str| async move { Ok(word.len()) })
//!         .run_with(Sink::fold(0usize, |acc, n| acc + n), &mat)?
//!         .await?;
//!
//!     assert_eq!(lengths, 14);
//!     Ok(())
//! }
//! ```
//!
//! ---
//!
//! ## Graphs
//!
//! ```no_run
//! use backflow::prelude::*;
//!
//! # async fn demo() -> backflow::error::Result<()> {
//! let mut b = GraphBuilder::new();
//! let merge = b.add_merge::<u32>(2);
//! let [a, c]: [InPort<u32>; 2] = merge.inputs.try_into().expect("two inputs");
//! b.open_input("odd", a)?;
//! b.open_input("even", c)?;
//! b.open_output("all", merge.output)?;
//! let partial = b.build();
//!
//! let graph = partial
//!     .bind_source("odd", Source::from_iter(vec![1u32, 3, 5]))?
//!     .bind_source("even", Source::from_iter(vec![2u32, 4]))?
//!     .bind_sink_mat("all", Sink::<u32, Vec<u32>>::collect())?;
//!
//! let all = Materializer::try_current()?.run(&graph)?.await?;
//! assert_eq!(all.len(), 5);
//! # Ok(())
//! # }
//! ```
//!
//! Running a graph that still has open ends fails with
//! [`GraphError::OpenEnds`](error::GraphError::OpenEnds).
//!
//! ---
//!
//! ## API Contracts
//!
//! - Demand: stages pull one element per unit of downstream demand; sinks
//!   request in chunks of [`Settings::demand_batch`](pipeline::config::Settings::demand_batch).
//! - Ordering: every stage except `map_async_unordered` preserves order.
//! - Errors: the first error anywhere cancels the rest of the run and is what
//!   the handle resolves to.
//! - Cancellation: [`Handle::cancel`] stops every producer; sinks complete
//!   with the elements they already received.
//! - Reuse: blueprints are immutable; every run gets fresh stage state.
//! - Protocol violations are bugs: debug builds panic, release builds fail
//!   the stream with [`Error::Protocol`](error::Error::Protocol).
//!
//! ---
//!
//! ## Observability
//!
//! Enable tracing instrumentation with:
//!
//! ```toml
//! backflow = { version = "0.1", features = ["tracing"] }
//! ```
//!
//! Minimal subscriber setup:
//!
//! ```ignore
//! use tracing_subscriber::fmt;
//!
//! fn main() {
//!     fmt()
//!         .with_target(false)
//!         .with_env_filter("backflow=debug")
//!         .init();
//! }
//! ```
//!
//! `backflow` emits a `backflow.node` span per graph node and events such as
//! `backflow.run.started`, `backflow.run.failed`, `backflow.stage.failed`,
//! `backflow.downstream.closed`, `backflow.cancelled` and
//! `backflow.retry.sleep`.
//!
//! ---
//!
//! ## Feature Flags
//!
//! - `tracing` *(default)*: enables optional tracing spans/logging.
//!
//! ---
//!
//! [`Outlet`]: pipeline::channel::Outlet
//! [`Inlet`]: pipeline::channel::Inlet
//! [`Source`]: source::Source
//! [`Flow`]: pipeline::flow::Flow
//! [`Sink`]: sink::Sink
//! [`Graph`]: graph::Graph
//! [`GraphBuilder`]: graph::GraphBuilder
//! [`Materializer`]: pipeline::runtime::Materializer
//! [`Handle`]: pipeline::runtime::Handle
//! [`Handle::cancel`]: pipeline::runtime::Handle::cancel

pub mod error;
pub mod graph;
pub mod pipeline;
pub mod sink;
pub mod source;

pub mod prelude {
    //! Convenient imports for most `backflow` users.

    pub use crate::graph::{Graph, GraphBuilder, InPort, OutPort};
    pub use crate::pipeline::cancel::CancelToken;
    pub use crate::pipeline::chain::FlowExt;
    pub use crate::pipeline::flow::Flow;
    pub use crate::pipeline::retry::{retrying, RetryPolicy};
    pub use crate::pipeline::runtime::{Handle, Materializer};
    pub use crate::sink::Sink;
    pub use crate::source::Source;
}
