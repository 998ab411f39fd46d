use std::marker::PhantomData;

use crate::error::Result;
use crate::graph::node;
use crate::graph::{Direction, Graph, InPort, Layout, OutPort};
use crate::pipeline::flow::Flow;
use crate::sink::Sink;
use crate::source::Source;

/// Ports of a zip node: pairs elements of `left` and `right` into `out`.
#[derive(Debug)]
pub struct ZipPorts<A, B> {
    pub left: InPort<A>,
    pub right: InPort<B>,
    pub out: OutPort<(A, B)>,
}

#[derive(Debug)]
pub struct BroadcastPorts<T> {
    pub input: InPort<T>,
    pub outputs: Vec<OutPort<T>>,
}

#[derive(Debug)]
pub struct MergePorts<T> {
    pub inputs: Vec<InPort<T>>,
    pub output: OutPort<T>,
}

/// Token for a sink whose value becomes the graph's result; see
/// [`GraphBuilder::build_mat`].
#[derive(Debug)]
pub struct MatPort<R> {
    node: usize,
    _value: PhantomData<fn() -> R>,
}

/// Assembles a [`Graph`] from nodes and typed ports.
///
/// ```no_run
/// use backflow::prelude::*;
///
/// # fn demo() -> backflow::error::Result<Graph<()>> {
/// let mut b = GraphBuilder::new();
/// let fan = b.add_broadcast::<u32>(2);
/// let [left, right]: [OutPort<u32>; 2] = fan.outputs.try_into().expect("two outputs");
/// let doubled = b.via(left, Flow::<u32, u32>::identity().map(|x| x * 2));
/// let zip = b.add_zip::<u32, u32>();
/// b.connect(doubled, zip.left);
/// b.connect(right, zip.right);
/// b.open_input("numbers", fan.input)?;
/// b.open_output("pairs", zip.out)?;
/// Ok(b.build())
/// # }
/// ```
#[derive(Default)]
pub struct GraphBuilder {
    layout: Layout,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn single_out<T: Send + 'static>(&mut self, node: usize) -> OutPort<T> {
        OutPort::new(self.layout.add_port::<T>(node, Direction::Out))
    }

    fn single_in<T: Send + 'static>(&mut self, node: usize) -> InPort<T> {
        InPort::new(self.layout.add_port::<T>(node, Direction::In))
    }

    pub fn add_source<T>(&mut self, source: Source<T>) -> OutPort<T>
    where
        T: Send + 'static,
    {
        let node = self.layout.add_node("source", node::source(source.into_stage()));
        self.single_out(node)
    }

    pub fn add_flow<I, O>(&mut self, flow: Flow<I, O>) -> (InPort<I>, OutPort<O>)
    where
        I: Send + 'static,
        O: Send + 'static,
    {
        let node = self.layout.add_node("flow", node::flow(flow.into_stage()));
        (self.single_in(node), self.single_out(node))
    }

    /// A sink whose materialized value is discarded.
    pub fn add_sink<T, R>(&mut self, sink: Sink<T, R>) -> InPort<T>
    where
        T: Send + 'static,
        R: Send + 'static,
    {
        let node = self.layout.add_node("sink", node::sink(sink.into_stage()));
        self.single_in(node)
    }

    /// A sink whose value can become the graph's result through
    /// [`GraphBuilder::build_mat`].
    pub fn add_sink_mat<T, R>(&mut self, sink: Sink<T, R>) -> (InPort<T>, MatPort<R>)
    where
        T: Send + 'static,
        R: Send + 'static,
    {
        let node = self.layout.add_node("sink", node::sink(sink.into_stage()));
        let input = self.single_in(node);
        (
            input,
            MatPort {
                node,
                _value: PhantomData,
            },
        )
    }

    pub fn add_zip<A, B>(&mut self) -> ZipPorts<A, B>
    where
        A: Send + 'static,
        B: Send + 'static,
    {
        let node = self.layout.add_node("zip", node::zip::<A, B>());
        ZipPorts {
            left: self.single_in(node),
            right: self.single_in(node),
            out: self.single_out(node),
        }
    }

    /// One input copied to `n` outputs.
    pub fn add_broadcast<T>(&mut self, n: usize) -> BroadcastPorts<T>
    where
        T: Clone + Send + 'static,
    {
        let node = self.layout.add_node("broadcast", node::broadcast::<T>());
        BroadcastPorts {
            input: self.single_in(node),
            outputs: (0..n).map(|_| self.single_out(node)).collect(),
        }
    }

    /// `n` inputs interleaved into one output.
    pub fn add_merge<T>(&mut self, n: usize) -> MergePorts<T>
    where
        T: Send + 'static,
    {
        let node = self.layout.add_node("merge", node::merge::<T>());
        MergePorts {
            inputs: (0..n).map(|_| self.single_in(node)).collect(),
            output: self.single_out(node),
        }
    }

    pub fn connect<T>(&mut self, from: OutPort<T>, to: InPort<T>) {
        self.layout.connect(from.id, to.id);
    }

    /// Route `from` through `flow`, returning the flow's output port.
    pub fn via<I, O>(&mut self, from: OutPort<I>, flow: Flow<I, O>) -> OutPort<O>
    where
        I: Send + 'static,
        O: Send + 'static,
    {
        let (input, output) = self.add_flow(flow);
        self.connect(from, input);
        output
    }

    /// Leave `port` open as the named input end `name`.
    pub fn open_input<T>(&mut self, name: impl Into<String>, port: InPort<T>) -> Result<()> {
        self.layout.open(name.into(), port.id)
    }

    /// Leave `port` open as the named output end `name`.
    pub fn open_output<T>(&mut self, name: impl Into<String>, port: OutPort<T>) -> Result<()> {
        self.layout.open(name.into(), port.id)
    }

    /// Finish construction. Every port not connected or opened becomes an
    /// open end with a generated name.
    pub fn build(self) -> Graph<()> {
        Graph::from_layout(self.finish())
    }

    /// Like [`GraphBuilder::build`], with the value of the sink behind `mat`
    /// as the graph's result.
    pub fn build_mat<R>(self, mat: MatPort<R>) -> Graph<R>
    where
        R: Send + 'static,
    {
        Graph::with_result(self.finish(), mat.node)
    }

    fn finish(mut self) -> Layout {
        self.layout.open_dangling();
        self.layout
    }
}
