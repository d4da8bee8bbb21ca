//! Named run inputs with defaults.
//!
//! Parameters are declared on the [`Blueprint`](crate::Blueprint) and
//! resolved once per run into an immutable [`ParamSnapshot`]. Values travel
//! as JSON so overrides can come from a command line or a config file; each
//! parameter remembers how to decode its value into the type it was declared
//! with, and that decoding happens during resolution, never mid-run.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::{ArcStr, Dynamic};
use crate::engine::{GraphId, Handle, InputRef};
use crate::error::BuildError;

type Decoder = fn(&Value) -> Result<Dynamic, serde_json::Error>;

fn decode<T>(value: &Value) -> Result<Dynamic, serde_json::Error>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    Ok(Arc::new(serde_json::from_value::<T>(value.clone())?))
}

struct ParamSpec {
    name: ArcStr,
    default: Value,
    decode: Decoder,
}

/// Holds the parameters declared for one graph.
pub struct ParameterStore {
    graph: GraphId,
    params: Vec<ParamSpec>,
}

impl ParameterStore {
    pub(crate) fn new(graph: GraphId) -> Self {
        Self {
            graph,
            params: Vec::new(),
        }
    }

    /// Registers a parameter. Each name can be declared once per graph.
    pub fn declare<T>(&mut self, name: &str, default: T) -> Result<Param<T>, BuildError>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        if self.position(name).is_some() {
            return Err(BuildError::DuplicateParameter(name.to_string()));
        }

        let default = serde_json::to_value(default).map_err(|source| BuildError::InvalidParameter {
            name: name.to_string(),
            source,
        })?;

        self.params.push(ParamSpec {
            name: name.into(),
            default,
            decode: decode::<T>,
        });

        Ok(Param::new(self.graph, self.params.len() - 1))
    }

    /// Maps every declared name to its override, or to its default when no
    /// override is given.
    pub fn resolve(&self, overrides: &BTreeMap<String, Value>) -> Result<ParamSnapshot, BuildError> {
        if let Some(unknown) = overrides.keys().find(|name| self.position(name).is_none()) {
            return Err(BuildError::UnknownParameter(unknown.clone()));
        }

        let mut entries = Vec::with_capacity(self.params.len());

        for spec in &self.params {
            let value = overrides
                .get(spec.name.as_ref())
                .unwrap_or(&spec.default)
                .clone();

            let decoded = (spec.decode)(&value).map_err(|source| BuildError::InvalidParameter {
                name: spec.name.to_string(),
                source,
            })?;

            entries.push(Resolved {
                name: spec.name.clone(),
                value,
                decoded,
            });
        }

        Ok(ParamSnapshot {
            graph: self.graph,
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Declared names with their defaults, in declaration order.
    pub fn defaults(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.params.iter().map(|p| (p.name.as_ref(), &p.default))
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name.as_ref() == name)
    }
}

struct Resolved {
    name: ArcStr,
    value: Value,
    decoded: Dynamic,
}

/// The parameter values of one run. Read-only for the whole run.
pub struct ParamSnapshot {
    pub(crate) graph: GraphId,
    entries: Vec<Resolved>,
}

impl ParamSnapshot {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|e| e.name.as_ref() == name)
            .map(|e| &e.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|e| (e.name.as_ref(), &e.value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn decoded(&self, id: usize) -> Option<&Dynamic> {
        self.entries.get(id).map(|e| &e.decoded)
    }
}

impl std::fmt::Debug for ParamSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// A typed reference to a declared parameter, usable as a task input.
#[derive(Debug)]
pub struct Param<T> {
    graph: GraphId,
    id: usize,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Param<T> {
    fn new(graph: GraphId, id: usize) -> Self {
        Self {
            graph,
            id,
            _phantom: PhantomData,
        }
    }
}

impl<T> Clone for Param<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Param<T> {}

impl<T> Handle for Param<T>
where
    T: Send + Sync + 'static,
{
    type Output<'a> = &'a T;

    fn graph(&self) -> GraphId {
        self.graph
    }

    fn input(&self) -> InputRef {
        InputRef::Param(self.id)
    }

    fn downcast<'a>(&self, value: &'a Dynamic) -> Option<Self::Output<'a>> {
        value.downcast_ref::<T>()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store() -> ParameterStore {
        let mut store = ParameterStore::new(GraphId::next());
        store.declare("country", "Germany".to_string()).unwrap();
        store.declare("bucket", "ludwigm-bucket".to_string()).unwrap();
        store
    }

    #[test]
    fn test_resolve_defaults() {
        let snapshot = store().resolve(&BTreeMap::new()).unwrap();

        assert_eq!(snapshot.get("country"), Some(&json!("Germany")));
        assert_eq!(snapshot.get("bucket"), Some(&json!("ludwigm-bucket")));
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_resolve_override_one() {
        let overrides = BTreeMap::from([("country".to_string(), json!("France"))]);
        let snapshot = store().resolve(&overrides).unwrap();

        assert_eq!(snapshot.get("country"), Some(&json!("France")));
        assert_eq!(snapshot.get("bucket"), Some(&json!("ludwigm-bucket")));
    }

    #[test]
    fn test_resolve_unknown() {
        let overrides = BTreeMap::from([("unknown".to_string(), json!(1))]);
        let err = store().resolve(&overrides).unwrap_err();

        assert!(matches!(err, BuildError::UnknownParameter(name) if name == "unknown"));
    }

    #[test]
    fn test_resolve_wrong_type() {
        let overrides = BTreeMap::from([("country".to_string(), json!(42))]);
        let err = store().resolve(&overrides).unwrap_err();

        assert!(matches!(err, BuildError::InvalidParameter { name, .. } if name == "country"));
    }

    #[test]
    fn test_declare_twice() {
        let mut store = store();
        let err = store.declare("country", "France".to_string()).unwrap_err();

        assert!(matches!(err, BuildError::DuplicateParameter(name) if name == "country"));
    }

    #[test]
    fn test_decoded_value() {
        let mut store = ParameterStore::new(GraphId::next());
        let limit = store.declare("limit", 10_u32).unwrap();

        let overrides = BTreeMap::from([("limit".to_string(), json!(25))]);
        let snapshot = store.resolve(&overrides).unwrap();

        let InputRef::Param(id) = limit.input() else {
            panic!("parameter handle must point at a parameter");
        };
        let value = snapshot.decoded(id).unwrap();
        assert_eq!(limit.downcast(value), Some(&25));
    }
}
