mod handle;
mod task;

use std::sync::atomic::{AtomicU64, Ordering};

use petgraph::graph::NodeIndex;

pub use crate::engine::handle::TaskHandle;

pub(crate) use crate::engine::task::{Checkpoint, Node, Task, TypedTask};

use crate::core::Dynamic;

/// Identifies the blueprint a handle was issued by.
///
/// Handles are plain indices, so without this a handle from one blueprint
/// could silently point at an unrelated task in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphId(u64);

impl GraphId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        GraphId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// What a task input points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputRef {
    /// The output of another task.
    Task(NodeIndex),
    /// The resolved value of a declared parameter.
    Param(usize),
}

// Things that can be used as dependency Handle
pub trait Handle: Copy + Send + Sync {
    type Output<'a>;

    fn graph(&self) -> GraphId;
    fn input(&self) -> InputRef;
    fn downcast<'a>(&self, value: &'a Dynamic) -> Option<Self::Output<'a>>;
}

/// A trait that enables a collection of handles to be used as the inputs of
/// a task.
///
/// This trait is implemented for single handles, `Vec`s of handles and tuples
/// of handles, allowing them to be passed as the `inputs` argument to
/// [`Blueprint::add_node`](crate::Blueprint::add_node). The order of the
/// handles is the order in which the task receives the values.
pub trait Dependencies {
    /// The resulting type when all dependencies are resolved.
    /// For a tuple of handles, this will be a tuple of `&'a T`s.
    type Output<'a>;

    /// Returns the reference behind each input, in order.
    fn inputs(&self) -> Vec<(GraphId, InputRef)>;

    /// Takes a slice of type-erased values, one per input, and resolves them
    /// into the concrete `Output` type. Returns `None` if a value does not
    /// have the type its handle promises.
    fn resolve<'a>(&self, values: &'a [Dynamic]) -> Option<Self::Output<'a>>;
}

impl Dependencies for () {
    type Output<'a> = ();

    fn inputs(&self) -> Vec<(GraphId, InputRef)> {
        vec![]
    }

    fn resolve<'a>(&self, _: &'a [Dynamic]) -> Option<Self::Output<'a>> {
        Some(())
    }
}

impl<H> Dependencies for H
where
    H: Handle,
{
    type Output<'a> = H::Output<'a>;

    fn inputs(&self) -> Vec<(GraphId, InputRef)> {
        vec![(self.graph(), self.input())]
    }

    fn resolve<'a>(&self, values: &'a [Dynamic]) -> Option<Self::Output<'a>> {
        self.downcast(values.first()?)
    }
}

impl<H> Dependencies for Vec<H>
where
    H: Handle,
{
    type Output<'a> = Vec<H::Output<'a>>;

    fn inputs(&self) -> Vec<(GraphId, InputRef)> {
        self.iter().map(|h| (h.graph(), h.input())).collect()
    }

    fn resolve<'a>(&self, values: &'a [Dynamic]) -> Option<Self::Output<'a>> {
        if values.len() != self.len() {
            return None;
        }

        self.iter()
            .zip(values)
            .map(|(handle, value)| handle.downcast(value))
            .collect()
    }
}

macro_rules! impl_deps {
    ($($D:ident),*) => {
        #[allow(non_snake_case)]
        impl<$($D),*> Dependencies for ($($D,)*)
        where
            $($D: Handle),* {
            type Output<'a> = ($($D::Output<'a>,)*);

            fn inputs(&self) -> Vec<(GraphId, InputRef)> {
                let ($($D,)*) = self;
                vec![$(($D.graph(), $D.input()),)*]
            }

            fn resolve<'a>(&self, values: &'a [Dynamic]) -> Option<Self::Output<'a>> {
                let ($($D,)*) = self;
                let mut iter = values.iter();

                Some(($($D.downcast(iter.next()?)?,)*))
            }
        }
    };
}

impl_deps!(A);
impl_deps!(A, B);
impl_deps!(A, B, C);
impl_deps!(A, B, C, D);
impl_deps!(A, B, C, D, E);
impl_deps!(A, B, C, D, E, F);
impl_deps!(A, B, C, D, E, F, G);
impl_deps!(A, B, C, D, E, F, G, H);
