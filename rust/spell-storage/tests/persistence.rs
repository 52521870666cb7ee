use std::collections::BTreeMap;

use anyhow::Result;
use pretty_assertions::assert_eq;
use spell_capability::{Authority, Grant, Spid, Target, Value, VatId};
use spell_storage::{CapabilityStore, FileSystemStorageBackend, SpellStorageError};

type Store = CapabilityStore<FileSystemStorageBackend<Vec<u8>, Vec<u8>>>;

async fn open(root: &std::path::Path) -> Result<Store> {
    let backend = FileSystemStorageBackend::<Vec<u8>, Vec<u8>>::new(root).await?;
    Ok(CapabilityStore::open(backend).await?)
}

#[tokio::test]
async fn it_keeps_a_capability_graph_across_reopens() -> Result<()> {
    let root = tempfile::tempdir()?;
    let remote = Spid::new(VatId::from("vat0-far"), "urbj0-away".into());

    let (memid, powid, urbjid) = {
        let mut store = open(root.path()).await?;
        store.set_vat_id(&VatId::from("vat0-here")).await?;

        let memid = store.create_state_cell().await?;
        let powid = store
            .create_bundle(vec![
                Grant::new("memory", Authority::MemorySlot(memid.clone())),
                Grant::new("friend", Authority::Reference(Target::Remote(remote.clone()))),
            ])
            .await?;
        let urbjid = store.create_urbject("log(args);", &powid).await?;
        store
            .write_cell(
                &memid,
                Value::Map(BTreeMap::from([
                    (
                        "me".to_string(),
                        Value::Capability(Authority::Reference(Target::Local(urbjid.clone()))),
                    ),
                    ("visits".to_string(), Value::Integer(3)),
                ])),
            )
            .await?;
        (memid, powid, urbjid)
    };

    let store = open(root.path()).await?;

    assert_eq!(store.vat_id().await?, Some(VatId::from("vat0-here")));
    assert_eq!(store.get_urbject(&urbjid).await?.powid(), &powid);
    assert_eq!(
        store.get_bundle(&powid).await?.get("friend"),
        Some(&Authority::Reference(Target::Remote(remote)))
    );
    assert_eq!(
        store.read_cell(&memid).await?.get("me"),
        Some(&Value::Capability(Authority::Reference(Target::Local(urbjid))))
    );
    assert_eq!(store.cells().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn it_rejects_writes_to_cells_that_do_not_exist() -> Result<()> {
    let root = tempfile::tempdir()?;
    let mut store = open(root.path()).await?;

    let result = store
        .write_cell(&"mem0-nowhere".into(), Value::empty_map())
        .await;

    assert!(matches!(result, Err(SpellStorageError::NotFound { .. })));
    assert!(store.cells().await?.is_empty());
    Ok(())
}
