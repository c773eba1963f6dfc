use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use thiserror::Error;

/// Logical id of a declared resource; unique within a stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        ResourceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EngineError {
    #[error("dependency cycle detected at '{0}'")]
    Cycle(ResourceId),
    #[error("resource '{0}' is declared more than once")]
    DuplicateId(ResourceId),
    #[error("'{from}' depends on undeclared resource '{to}'")]
    UnknownDependency { from: ResourceId, to: ResourceId },
}

/// A declared resource. The lifecycle engine creates it; we only render it.
pub trait Resource {
    fn id(&self) -> &ResourceId;
    fn deps(&self) -> BTreeSet<ResourceId> {
        BTreeSet::new()
    }
    /// Provider body for this resource (type, properties, policies).
    fn render(&self) -> anyhow::Result<Json>;
}

/// A rendered resource together with the ids it must be created after.
#[derive(Debug, Clone, Serialize)]
pub struct Synthesized {
    pub id: ResourceId,
    pub deps: BTreeSet<ResourceId>,
    pub body: Json,
}

/// Resources ordered so that every dependency precedes its dependents.
pub fn synth_order(resources: &[Box<dyn Resource>]) -> Result<Vec<&dyn Resource>, EngineError> {
    let mut g: DiGraph<usize, ()> = DiGraph::new();
    let mut id_to_ix: HashMap<&ResourceId, NodeIndex> = HashMap::new();
    for (i, r) in resources.iter().enumerate() {
        let ix = g.add_node(i);
        if id_to_ix.insert(r.id(), ix).is_some() {
            return Err(EngineError::DuplicateId(r.id().clone()));
        }
    }
    for r in resources {
        let to_ix = id_to_ix[r.id()];
        for d in r.deps() {
            let from_ix = id_to_ix.get(&d).copied().ok_or_else(|| EngineError::UnknownDependency {
                from: r.id().clone(),
                to: d.clone(),
            })?;
            g.add_edge(from_ix, to_ix, ());
        }
    }
    let ordered_ix = toposort(&g, None).map_err(|c| EngineError::Cycle(resources[g[c.node_id()]].id().clone()))?;
    Ok(ordered_ix.into_iter().map(|ix| resources[g[ix]].as_ref()).collect())
}

pub fn synth_all(resources: &[Box<dyn Resource>]) -> anyhow::Result<Vec<Synthesized>> {
    let mut out = Vec::new();
    for r in synth_order(resources)? {
        let body = r.render()?;
        tracing::debug!(id = %r.id(), "synthesized resource");
        out.push(Synthesized {
            id: r.id().clone(),
            deps: r.deps(),
            body,
        });
    }
    Ok(out)
}
