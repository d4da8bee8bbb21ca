use std::marker::PhantomData;

use petgraph::graph::NodeIndex;

use crate::core::Dynamic;
use crate::engine::{GraphId, InputRef};

/// A type-safe reference to a task in the graph.
///
/// A `TaskHandle<T>` is a lightweight, copyable token that represents a
/// future result of type `T`. It is used to wire tasks together: passing it
/// as an input of another task adds a data edge, and the engine guarantees
/// that the task behind the handle has finished before the dependent starts.
///
/// # Diamond Dependencies
///
/// If Task C and Task B both depend on Task A, and Task D depends on both B
/// and C, Task A will only be executed *once*, and its result will be shared.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TaskHandle<T> {
    pub(crate) graph: GraphId,
    pub(crate) index: NodeIndex,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(graph: GraphId, index: NodeIndex) -> Self {
        Self {
            graph,
            index,
            _phantom: PhantomData,
        }
    }

    /// Returns the underlying `NodeIndex` of the task in the graph.
    pub fn index(&self) -> NodeIndex {
        self.index
    }
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TaskHandle<T> {}

impl<T> super::Handle for TaskHandle<T>
where
    T: Send + Sync + 'static,
{
    type Output<'a> = &'a T;

    fn graph(&self) -> GraphId {
        self.graph
    }

    fn input(&self) -> InputRef {
        InputRef::Task(self.index)
    }

    fn downcast<'a>(&self, value: &'a Dynamic) -> Option<Self::Output<'a>> {
        value.downcast_ref::<T>()
    }
}
