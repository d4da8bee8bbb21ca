use std::sync::Arc;

use crate::checkpoint::{Codec, KeyTemplate};
use crate::core::{ArcStr, Dynamic, TaskContext};
use crate::engine::InputRef;

pub(crate) trait TypedTask: Send + Sync {
    /// The concrete output type of this task.
    type Output: Send + Sync + 'static;

    fn execute<'a>(
        &self,
        context: &TaskContext<'a>,
        inputs: &'a [Dynamic],
    ) -> anyhow::Result<Self::Output>;
}

/// The type-erased foundation that allows the graph to hold tasks with
/// different output types.
pub(crate) trait Task: Send + Sync {
    fn output_type_name(&self) -> &'static str;

    fn execute<'a>(&self, context: &TaskContext<'a>, inputs: &'a [Dynamic]) -> anyhow::Result<Dynamic>;
}

// A blanket implementation to automatically bridge the two. This is where the
// type erasure actually happens.
impl<T> Task for T
where
    T: TypedTask + 'static,
{
    fn output_type_name(&self) -> &'static str {
        std::any::type_name::<T::Output>()
    }

    fn execute<'a>(&self, context: &TaskContext<'a>, inputs: &'a [Dynamic]) -> anyhow::Result<Dynamic> {
        let output = <T as TypedTask>::execute(self, context, inputs)?;
        Ok(Arc::new(output))
    }
}

/// How a checkpointed task is persisted and looked up.
pub(crate) struct Checkpoint {
    pub codec: Codec,
    pub template: KeyTemplate,
}

/// A task as stored in the graph.
pub(crate) struct Node {
    pub name: ArcStr,
    pub task: Arc<dyn Task>,
    /// Inputs in the order the task receives them.
    pub inputs: Vec<InputRef>,
    pub checkpoint: Option<Checkpoint>,
}

impl Node {
    pub fn is_cacheable(&self) -> bool {
        self.checkpoint.is_some()
    }
}
