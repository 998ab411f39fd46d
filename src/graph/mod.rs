//! Non-linear blueprints: fan-out, fan-in and named open ends.
//!
//! A [`GraphBuilder`] wires sources, flows, sinks and junctions through typed
//! ports. Ports that are neither connected nor opened explicitly stay open
//! under a generated name. The resulting [`Graph`] is a partial graph until
//! every open end is bound with a source or a sink.

pub mod builder;
pub(crate) mod node;

use std::any::{type_name, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{Error, GraphError, Result};
use crate::pipeline::cancel::CancelToken;
use crate::sink::Sink;
use crate::source::Source;

pub use builder::{BroadcastPorts, GraphBuilder, MatPort, MergePorts, ZipPorts};

use node::{make_channel, Endpoint, SpawnFn};

/// Typed input port of a node under construction. Move-only: it is connected
/// or opened exactly once.
pub struct InPort<T> {
    pub(crate) id: usize,
    _elem: PhantomData<fn(T)>,
}

/// Typed output port of a node under construction.
pub struct OutPort<T> {
    pub(crate) id: usize,
    _elem: PhantomData<fn() -> T>,
}

impl<T> InPort<T> {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            _elem: PhantomData,
        }
    }
}

impl<T> OutPort<T> {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            _elem: PhantomData,
        }
    }
}

impl<T> fmt::Debug for InPort<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InPort<{}>#{}", type_name::<T>(), self.id)
    }
}

impl<T> fmt::Debug for OutPort<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutPort<{}>#{}", type_name::<T>(), self.id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Direction {
    In,
    Out,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Direction::In => "input",
            Direction::Out => "output",
        }
    }
}

#[derive(Clone)]
pub(crate) struct PortSpec {
    pub node: usize,
    pub slot: usize,
    pub direction: Direction,
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub connect: fn(&CancelToken) -> (Endpoint, Endpoint),
}

#[derive(Clone, Copy)]
pub(crate) struct Edge {
    pub from: usize,
    pub to: usize,
}

pub(crate) struct NodeSpec {
    pub name: &'static str,
    pub spawn: Box<SpawnFn>,
}

/// Nodes, ports and edges of a blueprint. Nodes are shared between clones;
/// nothing here is live state.
#[derive(Clone, Default)]
pub(crate) struct Layout {
    pub nodes: Vec<Arc<NodeSpec>>,
    pub ports: Vec<PortSpec>,
    pub edges: Vec<Edge>,
    pub open: BTreeMap<String, usize>,
}

impl Layout {
    pub fn add_node(&mut self, name: &'static str, spawn: Box<SpawnFn>) -> usize {
        self.nodes.push(Arc::new(NodeSpec { name, spawn }));
        self.nodes.len() - 1
    }

    /// Declare the next `direction` port of `node`, carrying `T`.
    pub fn add_port<T: Send + 'static>(&mut self, node: usize, direction: Direction) -> usize {
        let slot = self
            .ports
            .iter()
            .filter(|p| p.node == node && p.direction == direction)
            .count();
        self.ports.push(PortSpec {
            node,
            slot,
            direction,
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            connect: make_channel::<T>,
        });
        self.ports.len() - 1
    }

    pub fn connect(&mut self, from: usize, to: usize) {
        self.edges.push(Edge { from, to });
    }

    pub fn is_wired(&self, port: usize) -> bool {
        self.edges.iter().any(|e| e.from == port || e.to == port)
            || self.open.values().any(|&p| p == port)
    }

    pub fn open(&mut self, name: String, port: usize) -> Result<()> {
        if self.open.contains_key(&name) {
            return Err(GraphError::DuplicateName(name).into());
        }
        self.open.insert(name, port);
        Ok(())
    }

    /// Give every dangling port a generated open-end name.
    pub fn open_dangling(&mut self) {
        for port in 0..self.ports.len() {
            if self.is_wired(port) {
                continue;
            }
            let spec = &self.ports[port];
            let kind = match spec.direction {
                Direction::In => "in",
                Direction::Out => "out",
            };
            let mut name = format!(
                "{}#{}.{}{}",
                self.nodes[spec.node].name, spec.node, kind, spec.slot
            );
            while self.open.contains_key(&name) {
                name.push('\'');
            }
            self.open.insert(name, port);
        }
    }

    /// Remove open end `name` after checking it is a `direction` port
    /// carrying `T`.
    fn take_open<T: 'static>(&mut self, name: &str, direction: Direction) -> Result<usize> {
        let port = *self
            .open
            .get(name)
            .ok_or_else(|| GraphError::UnknownEnd(name.to_string()))?;
        let spec = &self.ports[port];
        if spec.direction != direction {
            return Err(GraphError::WrongDirection {
                name: name.to_string(),
                expected: direction.label(),
                actual: spec.direction.label(),
            }
            .into());
        }
        if spec.type_id != TypeId::of::<T>() {
            return Err(GraphError::TypeMismatch {
                name: name.to_string(),
                expected: spec.type_name,
                actual: type_name::<T>(),
            }
            .into());
        }
        self.open.remove(name);
        Ok(port)
    }
}

type Finish<M> = fn(Option<Endpoint>) -> Result<M>;

fn finish_unit(_: Option<Endpoint>) -> Result<()> {
    Ok(())
}

fn finish_value<M: 'static>(value: Option<Endpoint>) -> Result<M> {
    value
        .and_then(|v| v.downcast::<M>().ok())
        .map(|v| *v)
        .ok_or(Error::stream("materialized value missing"))
}

/// An immutable graph blueprint materializing a value of type `M`.
///
/// Runnable once [`Graph::is_complete`] holds. Cloning is cheap and each
/// materialization gets its own live edges and stage state.
pub struct Graph<M> {
    layout: Layout,
    result: Option<usize>,
    finish: Finish<M>,
}

impl<M> Clone for Graph<M> {
    fn clone(&self) -> Self {
        Self {
            layout: self.layout.clone(),
            result: self.result,
            finish: self.finish,
        }
    }
}

impl<M> fmt::Debug for Graph<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.layout.nodes.iter().map(|n| n.name).collect::<Vec<_>>())
            .field("edges", &self.layout.edges.len())
            .field("open", &self.open_ends())
            .finish()
    }
}

impl Graph<()> {
    pub(crate) fn from_layout(layout: Layout) -> Self {
        Self {
            layout,
            result: None,
            finish: finish_unit,
        }
    }
}

impl<M: Send + 'static> Graph<M> {
    pub(crate) fn with_result(layout: Layout, node: usize) -> Self {
        Self {
            layout,
            result: Some(node),
            finish: finish_value::<M>,
        }
    }

    /// A source feeding a sink, both running in one task.
    pub(crate) fn linear<T>(source: Source<T>, sink: Sink<T, M>) -> Self
    where
        T: Send + 'static,
    {
        let mut layout = Layout::default();
        let node = layout.add_node("linear", node::linear(source.into_stage(), sink.into_stage()));
        Self::with_result(layout, node)
    }
}

impl<M> Graph<M> {
    pub(crate) fn layout(&self) -> &Layout {
        &self.layout
    }

    pub(crate) fn result_node(&self) -> Option<usize> {
        self.result
    }

    pub(crate) fn finisher(&self) -> Finish<M> {
        self.finish
    }

    /// Names of the ends still to be bound, sorted.
    pub fn open_ends(&self) -> Vec<String> {
        self.layout.open.keys().cloned().collect()
    }

    pub fn is_complete(&self) -> bool {
        self.layout.open.is_empty()
    }

    /// Feed open input `name` from `source`.
    pub fn bind_source<T>(mut self, name: &str, source: Source<T>) -> Result<Self>
    where
        T: Send + 'static,
    {
        let to = self.layout.take_open::<T>(name, Direction::In)?;
        let node = self.layout.add_node("source", node::source(source.into_stage()));
        let from = self.layout.add_port::<T>(node, Direction::Out);
        self.layout.connect(from, to);
        Ok(self)
    }

    /// Drain open output `name` into `sink`, discarding the sink's value.
    pub fn bind_sink<T, R>(mut self, name: &str, sink: Sink<T, R>) -> Result<Self>
    where
        T: Send + 'static,
        R: Send + 'static,
    {
        self.attach_sink(name, sink)?;
        Ok(self)
    }

    /// Drain open output `name` into `sink` and make its value the result
    /// of every run of the graph.
    pub fn bind_sink_mat<T, R>(mut self, name: &str, sink: Sink<T, R>) -> Result<Graph<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
    {
        let node = self.attach_sink(name, sink)?;
        Ok(Graph::with_result(self.layout, node))
    }

    fn attach_sink<T, R>(&mut self, name: &str, sink: Sink<T, R>) -> Result<usize>
    where
        T: Send + 'static,
        R: Send + 'static,
    {
        let from = self.layout.take_open::<T>(name, Direction::Out)?;
        let node = self.layout.add_node("sink", node::sink(sink.into_stage()));
        let to = self.layout.add_port::<T>(node, Direction::In);
        self.layout.connect(from, to);
        Ok(node)
    }
}
