use std::any::type_name;
use std::borrow::Cow;
use std::marker::PhantomData;
use std::sync::Arc;

use petgraph::graph::NodeIndex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::checkpoint::{Codec, KeyTemplate};
use crate::core::{Dynamic, TaskContext};
use crate::engine::{Checkpoint, Dependencies, GraphId, InputRef, Node, TaskHandle, TypedTask};
use crate::error::BuildError;
use crate::graph::{Edge, Graph, TaskGraph};
use crate::param::{Param, ParameterStore};

/// The blueprint of a pipeline.
///
/// `Blueprint` is used to declare the parameters and tasks of a pipeline and
/// to wire them together using the handles they return. Tasks can only refer
/// to handles that already exist, so tasks are declared in dependency order.
///
/// Once every task is declared, [`Blueprint::build`] freezes it into a
/// [`Graph`] that an [`Engine`](crate::Engine) can run.
///
/// # Example
///
/// ```rust
/// use epiflow::Blueprint;
///
/// let mut blueprint = Blueprint::new();
/// let base = blueprint.parameter("base", 2_i64).unwrap();
///
/// let squared = blueprint
///     .task()
///     .name("square")
///     .using(base)
///     .run(|_, base| Ok(base * base))
///     .unwrap();
///
/// blueprint
///     .task()
///     .name("print")
///     .using(squared)
///     .run(|_, value| {
///         println!("{value}");
///         Ok(())
///     })
///     .unwrap();
///
/// let graph = blueprint.build().unwrap();
/// assert_eq!(graph.order().collect::<Vec<_>>(), ["square", "print"]);
/// ```
pub struct Blueprint {
    id: GraphId,
    graph: TaskGraph,
    params: ParameterStore,
}

impl Blueprint {
    /// Creates a new, empty blueprint.
    pub fn new() -> Self {
        let id = GraphId::next();

        Self {
            id,
            graph: TaskGraph::new(),
            params: ParameterStore::new(id),
        }
    }

    /// Declares a run parameter with its default value.
    pub fn parameter<T>(&mut self, name: &str, default: T) -> Result<Param<T>, BuildError>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.params.declare(name, default)
    }

    /// Adds a task computing `compute` from the values behind `inputs`.
    pub fn add_node<R, D, F>(
        &mut self,
        name: &str,
        inputs: D,
        compute: F,
    ) -> Result<TaskHandle<R>, BuildError>
    where
        R: Send + Sync + 'static,
        D: Dependencies + Send + Sync + 'static,
        F: for<'a> Fn(&TaskContext<'a>, D::Output<'a>) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        self.insert(name, inputs, compute, None)
    }

    /// Adds a task whose output is checkpointed.
    ///
    /// The key is rendered from `template`, or from `{task_name}-{today}` when
    /// no template is given. Placeholders naming parameters are checked
    /// against the parameters declared so far.
    pub fn add_checkpointed_node<R, D, F>(
        &mut self,
        name: &str,
        inputs: D,
        template: Option<&str>,
        compute: F,
    ) -> Result<TaskHandle<R>, BuildError>
    where
        R: Serialize + DeserializeOwned + Send + Sync + 'static,
        D: Dependencies + Send + Sync + 'static,
        F: for<'a> Fn(&TaskContext<'a>, D::Output<'a>) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let template = match template {
            Some(template) => KeyTemplate::parse(template, |param| self.params.contains(param))
                .map_err(|reason| BuildError::InvalidKeyTemplate {
                    node: name.to_string(),
                    reason,
                })?,
            None => KeyTemplate::default(),
        };

        let checkpoint = Checkpoint {
            codec: Codec::of::<R>(),
            template,
        };

        self.insert(name, inputs, compute, Some(checkpoint))
    }

    /// Makes `task` wait for `upstream` without passing it any value.
    ///
    /// This is the only way to add an edge pointing backwards, so it is also
    /// the only way to end up with a cycle, which [`Blueprint::build`]
    /// rejects.
    pub fn set_upstream<A, B>(
        &mut self,
        task: TaskHandle<A>,
        upstream: TaskHandle<B>,
    ) -> Result<(), BuildError> {
        let task = self.check_handle(task.graph, task.index, "set_upstream")?;
        let upstream = self.check_handle(upstream.graph, upstream.index, &self.graph[task].name)?;

        if self.graph.find_edge(upstream, task).is_none() {
            self.graph.add_edge(upstream, task, Edge::Order);
        }

        Ok(())
    }

    /// The entry point of the fluent task builder.
    pub fn task(&mut self) -> TaskDef<'_> {
        TaskDef {
            blueprint: self,
            name: None,
        }
    }

    /// Validates the graph and freezes it.
    pub fn build(self) -> Result<Graph, BuildError> {
        Graph::freeze(self.id, self.graph, self.params)
    }

    fn insert<R, D, F>(
        &mut self,
        name: &str,
        inputs: D,
        compute: F,
        checkpoint: Option<Checkpoint>,
    ) -> Result<TaskHandle<R>, BuildError>
    where
        R: Send + Sync + 'static,
        D: Dependencies + Send + Sync + 'static,
        F: for<'a> Fn(&TaskContext<'a>, D::Output<'a>) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        if self.graph.node_weights().any(|node| node.name.as_ref() == name) {
            return Err(BuildError::DuplicateNode(name.to_string()));
        }

        let mut refs = Vec::new();
        for (graph, input) in inputs.inputs() {
            let known = graph == self.id
                && match input {
                    InputRef::Task(index) => index.index() < self.graph.node_count(),
                    InputRef::Param(id) => id < self.params.len(),
                };

            if !known {
                return Err(BuildError::UnknownReference {
                    node: name.to_string(),
                    reference: describe(input),
                });
            }

            refs.push(input);
        }

        let task = TaskNode {
            inputs,
            compute,
            _phantom: PhantomData::<fn() -> R>,
        };

        let index = self.graph.add_node(Node {
            name: name.into(),
            task: Arc::new(task),
            inputs: refs.clone(),
            checkpoint,
        });

        for input in refs {
            if let InputRef::Task(upstream) = input {
                self.graph.update_edge(upstream, index, Edge::Data);
            }
        }

        Ok(TaskHandle::new(self.id, index))
    }

    fn check_handle(&self, graph: GraphId, index: NodeIndex, node: &str) -> Result<NodeIndex, BuildError> {
        if graph == self.id && index.index() < self.graph.node_count() {
            Ok(index)
        } else {
            Err(BuildError::UnknownReference {
                node: node.to_string(),
                reference: describe(InputRef::Task(index)),
            })
        }
    }
}

impl Default for Blueprint {
    fn default() -> Self {
        Self::new()
    }
}

fn describe(input: InputRef) -> String {
    match input {
        InputRef::Task(index) => format!("task #{}", index.index()),
        InputRef::Param(id) => format!("parameter #{id}"),
    }
}

pub struct TaskDef<'a> {
    blueprint: &'a mut Blueprint,
    name: Option<Cow<'static, str>>,
}

impl<'a> TaskDef<'a> {
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn using<D>(self, inputs: D) -> TaskBinder<'a, D>
    where
        D: Dependencies,
    {
        TaskBinder {
            blueprint: self.blueprint,
            name: self.name,
            inputs,
        }
    }

    /// Checkpoints a task without inputs under the default key template.
    pub fn checkpoint(self) -> CheckpointBinder<'a, ()> {
        self.using(()).checkpoint()
    }

    pub fn run<F, R>(self, compute: F) -> Result<TaskHandle<R>, BuildError>
    where
        F: Fn(&TaskContext<'_>) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Send + Sync + 'static,
    {
        let name = self.name.unwrap_or(type_name::<F>().into());
        self.blueprint
            .add_node(&name, (), move |ctx, ()| compute(ctx))
    }
}

pub struct TaskBinder<'a, D> {
    blueprint: &'a mut Blueprint,
    name: Option<Cow<'static, str>>,
    inputs: D,
}

impl<'a, D> TaskBinder<'a, D>
where
    D: Dependencies + Send + Sync + 'static,
{
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Checkpoints the output under the default key template.
    pub fn checkpoint(self) -> CheckpointBinder<'a, D> {
        CheckpointBinder {
            blueprint: self.blueprint,
            name: self.name,
            inputs: self.inputs,
            template: None,
        }
    }

    pub fn run<F, R>(self, compute: F) -> Result<TaskHandle<R>, BuildError>
    where
        F: for<'b> Fn(&TaskContext<'b>, D::Output<'b>) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Send + Sync + 'static,
    {
        let name = self.name.unwrap_or(type_name::<F>().into());
        self.blueprint.add_node(&name, self.inputs, compute)
    }
}

pub struct CheckpointBinder<'a, D> {
    blueprint: &'a mut Blueprint,
    name: Option<Cow<'static, str>>,
    inputs: D,
    template: Option<String>,
}

impl<'a, D> CheckpointBinder<'a, D>
where
    D: Dependencies + Send + Sync + 'static,
{
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Overrides the key template, e.g. `"{task_name}-{country}-{today}"`.
    pub fn key(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn run<F, R>(self, compute: F) -> Result<TaskHandle<R>, BuildError>
    where
        F: for<'b> Fn(&TaskContext<'b>, D::Output<'b>) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let name = self.name.unwrap_or(type_name::<F>().into());
        self.blueprint
            .add_checkpointed_node(&name, self.inputs, self.template.as_deref(), compute)
    }
}

struct TaskNode<R, D, F> {
    inputs: D,
    compute: F,
    _phantom: PhantomData<fn() -> R>,
}

impl<R, D, F> TypedTask for TaskNode<R, D, F>
where
    R: Send + Sync + 'static,
    D: Dependencies + Send + Sync,
    F: for<'a> Fn(&TaskContext<'a>, D::Output<'a>) -> anyhow::Result<R> + Send + Sync,
{
    type Output = R;

    fn execute<'a>(&self, context: &TaskContext<'a>, inputs: &'a [Dynamic]) -> anyhow::Result<R> {
        let inputs = self.inputs.resolve(inputs).ok_or_else(|| {
            anyhow::anyhow!("inputs of '{}' don't have the declared types", context.name)
        })?;

        (self.compute)(context, inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_node() {
        let mut blueprint = Blueprint::new();
        blueprint.add_node("a", (), |_, ()| Ok(1)).unwrap();

        let err = blueprint.add_node("a", (), |_, ()| Ok(2)).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateNode(name) if name == "a"));
    }

    #[test]
    fn test_foreign_handle() {
        let mut other = Blueprint::new();
        let foreign = other.add_node("a", (), |_, ()| Ok(1_i32)).unwrap();
        let foreign_param = other.parameter("p", 1_i32).unwrap();

        let mut blueprint = Blueprint::new();
        blueprint.add_node("a", (), |_, ()| Ok(1_i32)).unwrap();

        let err = blueprint.add_node("b", foreign, |_, x| Ok(*x)).unwrap_err();
        assert!(matches!(err, BuildError::UnknownReference { node, .. } if node == "b"));

        let err = blueprint.add_node("c", foreign_param, |_, x| Ok(*x)).unwrap_err();
        assert!(matches!(err, BuildError::UnknownReference { node, .. } if node == "c"));
    }

    #[test]
    fn test_cycle_through_upstream() {
        let mut blueprint = Blueprint::new();
        let a = blueprint.add_node("a", (), |_, ()| Ok(1)).unwrap();
        let b = blueprint.add_node("b", a, |_, a| Ok(a + 1)).unwrap();
        blueprint.set_upstream(a, b).unwrap();

        let Err(BuildError::CyclicGraph { cycle }) = blueprint.build() else {
            panic!("expected a cycle");
        };

        assert!(cycle.contains(&"a".to_string()));
        assert!(cycle.contains(&"b".to_string()));
        assert_eq!(cycle.first(), cycle.last());
    }

    #[test]
    fn test_self_upstream() {
        let mut blueprint = Blueprint::new();
        let a = blueprint.add_node("a", (), |_, ()| Ok(())).unwrap();
        blueprint.set_upstream(a, a).unwrap();

        let Err(BuildError::CyclicGraph { cycle }) = blueprint.build() else {
            panic!("expected a cycle");
        };
        assert_eq!(cycle, ["a", "a"]);
    }

    #[test]
    fn test_stable_order() {
        let mut blueprint = Blueprint::new();
        let root = blueprint.add_node("root", (), |_, ()| Ok(1)).unwrap();
        let left = blueprint.add_node("left", root, |_, x| Ok(x + 1)).unwrap();
        let right = blueprint.add_node("right", root, |_, x| Ok(x + 2)).unwrap();
        let late = blueprint.add_node("late", (), |_, ()| Ok(0)).unwrap();
        blueprint
            .add_node("join", (right, left, late), |_, (r, l, z)| Ok(r + l + z))
            .unwrap();

        let graph = blueprint.build().unwrap();

        assert_eq!(
            graph.order().collect::<Vec<_>>(),
            ["root", "left", "right", "late", "join"]
        );
        assert_eq!(
            graph.dependencies_of("join").unwrap(),
            ["left", "right", "late"]
        );
    }

    #[test]
    fn test_upstream_reorders() {
        let mut blueprint = Blueprint::new();
        let first = blueprint.add_node("first", (), |_, ()| Ok(())).unwrap();
        let second = blueprint.add_node("second", (), |_, ()| Ok(())).unwrap();
        blueprint.set_upstream(first, second).unwrap();

        let graph = blueprint.build().unwrap();
        assert_eq!(graph.order().collect::<Vec<_>>(), ["second", "first"]);
    }

    #[test]
    fn test_invalid_key_template() {
        let mut blueprint = Blueprint::new();
        blueprint.parameter("country", "Germany".to_string()).unwrap();

        let ok = blueprint
            .task()
            .name("good")
            .checkpoint()
            .key("{task_name}-{country}-{today}")
            .run(|_, ()| Ok(1_u32));
        assert!(ok.is_ok());

        let err = blueprint
            .task()
            .name("bad")
            .checkpoint()
            .key("{task_name}-{bucket}")
            .run(|_, ()| Ok(1_u32))
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidKeyTemplate { node, .. } if node == "bad"));
    }

    #[test]
    fn test_mermaid() {
        let mut blueprint = Blueprint::new();
        let p = blueprint.parameter("country", "Germany".to_string()).unwrap();
        let a = blueprint
            .task()
            .name("download")
            .checkpoint()
            .run(|_, ()| Ok(vec![1_i64]))
            .unwrap();
        blueprint
            .task()
            .name("filter")
            .using((a, p))
            .run(|_, (rows, _)| Ok(rows.len()))
            .unwrap();

        let text = blueprint.build().unwrap().to_string();

        assert!(text.starts_with("graph LR\n"));
        assert!(text.contains("p0([\"country\"])"));
        assert!(text.contains("0[(\"download\")]"));
        assert!(text.contains("1[\"filter\"]"));
        assert!(text.contains("p0 --> 1"));
        assert!(text.contains("0 -- \"alloc::vec::Vec&lt;i64&gt;\" --> 1"));
    }
}
