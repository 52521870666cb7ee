use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use spell_capability::{
    Authority, ExternalForm, Powid, ResolvePolicy, VatId, embedded_authorities,
    resolve_authorities,
};
use spell_storage::{CapabilityStore, StoreBackend};

use crate::VatError;

/// Version of the [`Graph`] document layout.
pub const GRAPH_VERSION: u32 = 1;

/// A snapshot of every object a vat's store holds and the authorities
/// connecting them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    /// Layout version, currently [`GRAPH_VERSION`]
    pub version: u32,
    /// Objects by id
    pub objects: BTreeMap<String, Node>,
}

impl Graph {
    /// Render as JSON.
    pub fn to_json(&self) -> Result<serde_json::Value, VatError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// One object of a [`Graph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    /// An urbject and what it runs with
    Urbject {
        /// Its bound bundle
        powid: Powid,
        /// Content hash of its code
        codeid: String,
    },
    /// An authority bundle
    Power {
        /// The grants, in order
        powers: Vec<PowerEntry>,
    },
    /// A state cell
    Memory {
        /// Authorities stored in the cell
        powers: Vec<PowerEntry>,
    },
}

/// An authority as it appears in a [`Graph`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerEntry {
    /// `native`, `reference` or `memory`
    #[serde(rename = "type")]
    pub kind: String,
    /// What the authority designates, in external form
    pub swissnum: String,
    /// The grant name, for bundle entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PowerEntry {
    fn new(external: ExternalForm, name: Option<String>) -> Self {
        Self {
            kind: external.kind().to_string(),
            swissnum: external.swissnum(),
            name,
        }
    }
}

/// Reads a store into a [`Graph`] without changing it.
pub struct GraphExporter<'a, Backend> {
    store: &'a CapabilityStore<Backend>,
    policy: ResolvePolicy,
}

impl<'a, Backend> GraphExporter<'a, Backend>
where
    Backend: StoreBackend,
{
    /// Export the store of the vat `local`.
    pub fn new(store: &'a CapabilityStore<Backend>, local: &VatId) -> Self {
        Self {
            store,
            policy: ResolvePolicy::new(local.clone()),
        }
    }

    /// Build the graph.
    pub async fn export(&self) -> Result<Graph, VatError> {
        let mut objects = BTreeMap::new();

        for (urbjid, urbject) in self.store.urbjects().await? {
            objects.insert(
                urbjid.to_string(),
                Node::Urbject {
                    powid: urbject.powid().clone(),
                    codeid: urbject.code_id().to_string(),
                },
            );
        }

        for (powid, power) in self.store.bundles().await? {
            let powers = power
                .grants()
                .iter()
                .zip(resolve_authorities(&power, &self.policy))
                .map(|(grant, (_, external))| PowerEntry::new(external, Some(grant.name.clone())))
                .collect();
            objects.insert(powid.to_string(), Node::Power { powers });
        }

        for (memid, data) in self.store.cells().await? {
            let powers = embedded_authorities(&data)
                .into_iter()
                .map(|authority: &Authority| {
                    PowerEntry::new(authority.external_form(&self.policy), None)
                })
                .collect();
            objects.insert(memid.to_string(), Node::Memory { powers });
        }

        tracing::debug!(objects = objects.len(), "Exported object graph");

        Ok(Graph {
            version: GRAPH_VERSION,
            objects,
        })
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use spell_capability::{Grant, Spid, Target, Value};
    use spell_storage::MemoryStorageBackend;

    use super::*;

    #[tokio::test]
    async fn it_exports_every_object_with_its_authorities() -> Result<()> {
        let local = VatId::from("vat0-local");
        let mut store = CapabilityStore::open(MemoryStorageBackend::<Vec<u8>, Vec<u8>>::default()).await?;
        let memid = store.create_state_cell().await?;
        let powid = store.create_power_for_memid(&memid, true).await?;
        let urbjid = store.create_urbject("log(1);", &powid).await?;
        store
            .write_cell(
                &memid,
                Value::Map(BTreeMap::from([(
                    "self".to_string(),
                    Value::Capability(Authority::Reference(Target::Local(urbjid.clone()))),
                )])),
            )
            .await?;

        let graph = GraphExporter::new(&store, &local).export().await?;
        let spid = Spid::new(local.clone(), urbjid.clone()).to_string();

        assert_eq!(graph.version, 1);
        assert_eq!(graph.objects.len(), 3);
        assert_eq!(
            graph.to_json()?["objects"][memid.to_string()],
            json!({
                "type": "memory",
                "powers": [{"type": "reference", "swissnum": spid}],
            })
        );
        assert_eq!(
            graph.objects.get(powid.as_str()),
            Some(&Node::Power {
                powers: vec![
                    PowerEntry {
                        kind: "memory".into(),
                        swissnum: memid.to_string(),
                        name: Some("memory".into()),
                    },
                    PowerEntry {
                        kind: "native".into(),
                        swissnum: "make_urbject".into(),
                        name: Some("make_urbject".into()),
                    },
                ]
            })
        );
        assert!(matches!(
            graph.objects.get(urbjid.as_str()),
            Some(Node::Urbject { powid: bound, .. }) if bound == &powid
        ));
        Ok(())
    }

    #[tokio::test]
    async fn it_renders_remote_references_as_spids() -> Result<()> {
        let mut store = CapabilityStore::open(MemoryStorageBackend::<Vec<u8>, Vec<u8>>::default()).await?;
        let remote: Spid = Spid::new("vat0-far".into(), "urbj0-away".into());
        let powid = store
            .create_bundle(vec![Grant::new(
                "friend",
                Authority::Reference(Target::Remote(remote.clone())),
            )])
            .await?;

        let graph = GraphExporter::new(&store, &"vat0-near".into()).export().await?;

        assert_eq!(
            graph.to_json()?["objects"][powid.to_string()]["powers"][0],
            json!({"type": "reference", "swissnum": remote.to_string(), "name": "friend"})
        );
        Ok(())
    }
}
