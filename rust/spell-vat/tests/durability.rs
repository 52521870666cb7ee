use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use pretty_assertions::assert_eq;
use spell_capability::{Message, Value, VatId};
use spell_storage::{CapabilityStore, FileSystemStorageBackend};
use spell_vat::{CONFIG_FILE, ExecutionServer, Frame, Metrics, Switchboard, Vat, VatConfig, VatError};

type Server = ExecutionServer<FileSystemStorageBackend<Vec<u8>, Vec<u8>>, Switchboard>;

async fn open(root: &Path, switchboard: &Switchboard, config: &VatConfig) -> Result<Server> {
    let backend = FileSystemStorageBackend::<Vec<u8>, Vec<u8>>::new(root).await?;
    let store = CapabilityStore::open(backend).await?;
    Ok(ExecutionServer::new(store, switchboard.clone(), config, Metrics::new()).await?)
}

fn payload(n: i64) -> Value {
    Value::Map(BTreeMap::from([("n".to_string(), Value::Integer(n))]))
}

#[tokio::test]
async fn it_keeps_its_identity_across_restarts() -> Result<()> {
    let root = tempfile::tempdir()?;
    let switchboard = Switchboard::new();

    let first = open(root.path(), &switchboard, &VatConfig::default()).await?;
    let vat_id = first.vat_id().clone();
    drop(first);

    let again = open(root.path(), &switchboard, &VatConfig::default()).await?;
    assert_eq!(again.vat_id(), &vat_id);
    drop(again);

    let impostor = VatConfig {
        vat_id: Some(VatId::from("vat0-impostor")),
        ..VatConfig::default()
    };
    let refused = open(root.path(), &switchboard, &impostor).await;
    assert!(matches!(
        refused.map_err(|error| error.downcast::<VatError>()),
        Err(Ok(VatError::Config(_)))
    ));
    Ok(())
}

#[tokio::test]
async fn it_resends_queued_messages_after_a_restart() -> Result<()> {
    let alice_root = tempfile::tempdir()?;
    let bob_root = tempfile::tempdir()?;
    let switchboard = Switchboard::new();

    let mut bob = open(bob_root.path(), &switchboard, &VatConfig::default()).await?;
    let memid = bob.store_mut().create_state_cell().await?;
    let powid = bob.store_mut().create_power_for_memid(&memid, false).await?;
    let urbjid = bob
        .store_mut()
        .create_urbject("power.memory.n = args.n;", &powid)
        .await?;

    let mut alice = open(alice_root.path(), &switchboard, &VatConfig::default()).await?;
    let alice_id = alice.vat_id().clone();
    alice
        .send_invoke(bob.vat_id().clone(), urbjid, payload(7))
        .await?;
    drop(alice);

    let mut bob_inbox = switchboard.connect(bob.vat_id());
    let mut alice = open(alice_root.path(), &switchboard, &VatConfig::default()).await?;
    let mut alice_inbox = switchboard.connect(&alice_id);
    assert_eq!(alice.vat_id(), &alice_id);
    assert_eq!(alice.transport().unacknowledged().len(), 1);

    assert_eq!(alice.poke("flush").await?, "I am poked");
    let Ok(frame @ Frame::Deliver { .. }) = bob_inbox.try_recv() else {
        anyhow::bail!("nothing was resent");
    };
    bob.handle_frame(frame).await?;
    assert_eq!(bob.store().read_cell(&memid).await?.get("n"), Some(&Value::Integer(7)));

    let ack = alice_inbox.try_recv()?;
    alice.handle_frame(ack).await?;
    assert!(alice.store().outbox().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn it_remembers_what_it_applied_across_restarts() -> Result<()> {
    let root = tempfile::tempdir()?;
    let switchboard = Switchboard::new();
    let alice = VatId::from("vat0-alice");

    let mut bob = open(root.path(), &switchboard, &VatConfig::default()).await?;
    let memid = bob.store_mut().create_state_cell().await?;
    bob.store_mut().write_cell(&memid, payload(0)).await?;
    let powid = bob.store_mut().create_power_for_memid(&memid, false).await?;
    let urbjid = bob
        .store_mut()
        .create_urbject("power.memory.n = power.memory.n + args.n;", &powid)
        .await?;
    let envelope = spell_capability::Envelope {
        from: alice.clone(),
        to: bob.vat_id().clone(),
        seqnum: 1,
        message: Message::invoke(urbjid, payload(5)),
    };

    bob.process_envelope(envelope.clone()).await?;
    drop(bob);

    let mut bob = open(root.path(), &switchboard, &VatConfig::default()).await?;
    bob.process_envelope(envelope).await?;

    assert_eq!(bob.store().read_cell(&memid).await?, payload(5));
    assert_eq!(bob.metrics().snapshot().duplicates, 1);
    Ok(())
}

#[tokio::test]
async fn it_opens_a_vat_from_its_basedir() -> Result<()> {
    let basedir = tempfile::tempdir()?;
    tokio::fs::write(
        basedir.path().join(CONFIG_FILE),
        r#"{"vat_id": "vat0-configured", "tick_millis": 5}"#,
    )
    .await?;
    let switchboard = Switchboard::new();

    let vat = Vat::open(basedir.path(), switchboard.clone(), |vat_id| {
        switchboard.connect(vat_id)
    })
    .await?;
    let (handle, running) = vat.spawn();

    assert_eq!(handle.vat_id(), &VatId::from("vat0-configured"));
    let memid = handle.create_state_cell().await?;
    handle
        .process_request(
            Message::execute(memid.clone(), "power.memory.ready = true;", Value::empty_map()),
            handle.vat_id().clone(),
        )
        .await?;
    assert_eq!(
        handle.read_cell(memid).await?.get("ready"),
        Some(&Value::Bool(true))
    );

    handle.shutdown();
    let server = running.await?;
    assert_eq!(server.metrics().snapshot().processed, 1);
    assert!(basedir.path().join("store").is_dir());
    Ok(())
}
