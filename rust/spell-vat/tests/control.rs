use std::time::Duration;

use anyhow::Result;
use pretty_assertions::assert_eq;
use spell_capability::{Memid, Spid, Value, VatId};
use spell_storage::{CapabilityStore, MemoryStorageBackend};
use spell_vat::{ExecutionServer, Metrics, Node, Switchboard, Vat, VatConfig, VatHandle};

async fn spawn(switchboard: &Switchboard, name: &str) -> Result<VatHandle> {
    let config = VatConfig {
        vat_id: Some(VatId::from(name)),
        tick_millis: 5,
        ..VatConfig::default()
    };
    let store = CapabilityStore::open(MemoryStorageBackend::<Vec<u8>, Vec<u8>>::default()).await?;
    let server = ExecutionServer::new(store, switchboard.clone(), &config, Metrics::new()).await?;
    let inbound = switchboard.connect(server.vat_id());
    let (handle, _) = Vat::new(server, inbound, config.tick()).spawn();
    Ok(handle)
}

/// Wait until `memid` on `vat` holds `field`.
async fn field_of(vat: &VatHandle, memid: &Memid, field: &str) -> Result<Value> {
    for _ in 0..500 {
        if let Some(value) = vat.read_cell(memid.clone()).await?.get(field) {
            return Ok(value.clone());
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    anyhow::bail!("{field} never appeared in {memid}")
}

async fn counter(vat: &VatHandle) -> Result<(Memid, spell_capability::Urbjid)> {
    let memid = vat.create_state_cell().await?;
    let powid = vat.create_power_for_memid(memid.clone(), false).await?;
    let urbjid = vat
        .create_urbject("power.memory.foo = args.foo;", powid)
        .await?;
    Ok((memid, urbjid))
}

#[tokio::test]
async fn it_sends_to_a_spid_when_poked() -> Result<()> {
    let switchboard = Switchboard::new();
    let alice = spawn(&switchboard, "vat0-alice").await?;
    let bob = spawn(&switchboard, "vat0-bob").await?;
    let (memid, urbjid) = counter(&bob).await?;
    let spid = Spid::new(bob.vat_id().clone(), urbjid);

    let answer = alice
        .poke(format!(r#"send {{"spid": "{spid}", "args": "{{\"foo\": 3}}"}}"#))
        .await?;

    assert_eq!(answer, "message sent");
    assert_eq!(field_of(&bob, &memid, "foo").await?, Value::Integer(3));
    Ok(())
}

#[tokio::test]
async fn it_invokes_and_executes_when_poked() -> Result<()> {
    let switchboard = Switchboard::new();
    let alice = spawn(&switchboard, "vat0-alice").await?;
    let bob = spawn(&switchboard, "vat0-bob").await?;
    let (memid, urbjid) = counter(&bob).await?;

    let answer = alice
        .poke(format!("invoke {} {urbjid}", bob.vat_id()))
        .await?;
    assert_eq!(answer, "invoke sent");
    assert_eq!(field_of(&bob, &memid, "foo").await?, Value::Integer(12));

    let created = bob.poke("create-memory").await?;
    let fresh = created
        .strip_prefix("created memory ")
        .map(Memid::from)
        .ok_or_else(|| anyhow::anyhow!("unexpected answer {created}"))?;
    assert_eq!(bob.read_cell(fresh.clone()).await?, Value::empty_map());

    let answer = alice
        .poke(format!("execute {} {fresh}", bob.vat_id()))
        .await?;
    assert_eq!(answer, "execute sent");
    for _ in 0..500 {
        if bob.metrics().processed == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(bob.metrics().processed, 2);
    assert_eq!(alice.poke("anything else").await?, "I am poked");
    Ok(())
}

#[tokio::test]
async fn it_rejects_malformed_pokes() -> Result<()> {
    let switchboard = Switchboard::new();
    let alice = spawn(&switchboard, "vat0-alice").await?;

    assert!(alice.poke("send not-json").await.is_err());
    assert!(alice.poke("invoke vat0-bob").await.is_err());
    assert!(
        alice
            .poke(r#"send {"spid": "spid0-nonsense", "args": {}}"#)
            .await
            .is_err()
    );
    Ok(())
}

#[tokio::test]
async fn it_exports_the_graph_of_a_running_vat() -> Result<()> {
    let switchboard = Switchboard::new();
    let bob = spawn(&switchboard, "vat0-bob").await?;
    let (memid, urbjid) = counter(&bob).await?;

    let graph = bob.graph().await?;

    assert_eq!(graph.version, 1);
    assert_eq!(graph.objects.len(), 3);
    assert!(matches!(
        graph.objects.get(memid.as_str()),
        Some(Node::Memory { powers }) if powers.is_empty()
    ));
    assert!(matches!(
        graph.objects.get(urbjid.as_str()),
        Some(Node::Urbject { .. })
    ));

    bob.shutdown();
    assert!(bob.create_state_cell().await.is_err());
    Ok(())
}
