//! The Turn engine: one atomic execution of code against exactly the
//! authority it was handed.
//!
//! A Turn never writes to the store. Everything the code does (cell writes,
//! new bundles and urbjects, one-way sends) is collected into a
//! [`TurnOutcome`], which the [`ExecutionServer`] commits as a unit or drops.
//!
//! [`ExecutionServer`]: crate::ExecutionServer

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use spell_capability::{
    Authority, Grant, MAKE_URBJECT, Memid, POWER_DISCRIMINATOR, Powid, Power, Spid, Target, Urbject,
    Urbjid, Value, VatId, embedded_authorities,
};
use spell_sandbox::{Budget, Handle, Host, ScriptError, Value as ScriptValue};
use spell_storage::{
    CapabilityStore, CborEncoder, Changeset, Encoder, SpellStorageError, StoreBackend,
};

use crate::VatError;

/// A one-way message a Turn asked to send.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundSend {
    /// The urbject to invoke
    pub target: Spid,
    /// Its arguments, with references in portable form
    pub args: Value,
}

/// The effects of a successful Turn, not yet applied.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// Cell writes and created objects
    pub changeset: Changeset,
    /// Sends to dispatch once the changeset is committed
    pub sends: Vec<OutboundSend>,
    /// Lines the code logged
    pub log: Vec<String>,
}

/// Runs code for one vat against that vat's store.
pub struct Turn<'a, Backend> {
    store: &'a CapabilityStore<Backend>,
    local: &'a VatId,
    budget: &'a Budget,
}

impl<'a, Backend> Turn<'a, Backend>
where
    Backend: StoreBackend,
{
    /// Prepare Turns for the vat `local`.
    pub fn new(store: &'a CapabilityStore<Backend>, local: &'a VatId, budget: &'a Budget) -> Self {
        Self {
            store,
            local,
            budget,
        }
    }

    /// Run `code` with the bundle `powid` and `args`. `from` is recorded for
    /// diagnostics only; it grants nothing.
    pub async fn start_turn(
        &self,
        code: &str,
        powid: &Powid,
        args: &Value,
        from: &VatId,
    ) -> Result<TurnOutcome, VatError> {
        let power = self.store.get_bundle(powid).await?;
        self.run(code, powid, &power, args, from).await
    }

    /// Run `code` with an already loaded bundle.
    pub async fn run(
        &self,
        code: &str,
        powid: &Powid,
        power: &Power,
        args: &Value,
        from: &VatId,
    ) -> Result<TurnOutcome, VatError> {
        tracing::debug!(vat = %self.local, %from, %powid, "Starting turn");

        let mut host = TurnHost::new(self.local.clone(), powid.clone(), power.clone());
        let args = host.decode_args(args)?;
        host.cells = self.preload(power).await?;

        let bindings = BTreeMap::from([
            ("args".to_string(), args),
            ("power".to_string(), ScriptValue::Handle(host.power_handle())),
        ]);
        spell_sandbox::run(code, bindings, &mut host, self.budget).map_err(from_script_error)?;

        let outcome = host.into_outcome();
        check_storable(&outcome)?;
        Ok(outcome)
    }

    /// Load every cell the bundle reaches, following memory authorities
    /// stored inside cells.
    async fn preload(&self, power: &Power) -> Result<BTreeMap<Memid, Value>, VatError> {
        let mut pending: VecDeque<Memid> = power
            .grants()
            .iter()
            .filter_map(|grant| match &grant.authority {
                Authority::MemorySlot(memid) => Some(memid.clone()),
                _ => None,
            })
            .collect();
        let mut cells = BTreeMap::new();

        while let Some(memid) = pending.pop_front() {
            if cells.contains_key(&memid) {
                continue;
            }
            let data = match self.store.read_cell(&memid).await {
                Ok(data) => data,
                // Surfaces as NotFound if the code touches it.
                Err(SpellStorageError::NotFound { .. }) => continue,
                Err(error) => return Err(error.into()),
            };
            for authority in embedded_authorities(&data) {
                if let Authority::MemorySlot(inner) = authority {
                    pending.push_back(inner.clone());
                }
            }
            cells.insert(memid, data);
        }

        Ok(cells)
    }
}

/// Effects the store cannot encode fail the Turn rather than the commit, so
/// they never stall the channel that carried the message.
fn check_storable(outcome: &TurnOutcome) -> Result<(), VatError> {
    let unstorable =
        |error: SpellStorageError| VatError::Script(format!("effects cannot be stored: {error}"));
    CborEncoder.encode(&outcome.changeset).map_err(unstorable)?;
    for send in &outcome.sends {
        CborEncoder.encode(&send.args).map_err(unstorable)?;
    }
    Ok(())
}

fn from_script_error(error: ScriptError<VatError>) -> VatError {
    match error {
        ScriptError::Parse(error) => VatError::Script(format!("{error}")),
        ScriptError::Runtime(message) | ScriptError::Raised(message) => VatError::Script(message),
        ScriptError::BudgetExceeded(message) => VatError::BudgetExceeded(message),
        ScriptError::Host(error) => error,
    }
}

/// What a script handle stands for.
#[derive(Debug, Clone, PartialEq)]
enum Slot {
    /// The `power` binding itself
    Power,
    Native(String),
    Reference(Target),
    Memory(Memid),
}

impl Slot {
    fn authority(&self) -> Option<Authority> {
        match self {
            Slot::Power => None,
            Slot::Native(name) => Some(Authority::Native(name.clone())),
            Slot::Reference(target) => Some(Authority::Reference(target.clone())),
            Slot::Memory(memid) => Some(Authority::MemorySlot(memid.clone())),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Slot::Power => "the power view",
            Slot::Native(_) => "a native primitive",
            Slot::Reference(_) => "a reference",
            Slot::Memory(_) => "a memory",
        }
    }
}

/// The [`Host`] a Turn's code runs against.
struct TurnHost {
    local: VatId,
    powid: Powid,
    power: Power,
    slots: Vec<Slot>,
    cells: BTreeMap<Memid, Value>,
    dirty: BTreeSet<Memid>,
    changeset: Changeset,
    sends: Vec<OutboundSend>,
    log: Vec<String>,
}

impl TurnHost {
    fn new(local: VatId, powid: Powid, power: Power) -> Self {
        Self {
            local,
            powid,
            power,
            slots: vec![Slot::Power],
            cells: BTreeMap::new(),
            dirty: BTreeSet::new(),
            changeset: Changeset::new(),
            sends: Vec::new(),
            log: Vec::new(),
        }
    }

    fn power_handle(&self) -> Handle {
        Handle::new(0)
    }

    fn mint(&mut self, slot: Slot) -> Handle {
        let index = match self.slots.iter().position(|existing| existing == &slot) {
            Some(index) => index,
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };
        Handle::new(index as u64)
    }

    fn slot(&self, handle: Handle) -> Result<Slot, VatError> {
        usize::try_from(handle.id())
            .ok()
            .and_then(|index| self.slots.get(index))
            .cloned()
            .ok_or_else(|| VatError::ConfinementViolation("unknown handle".into()))
    }

    fn into_outcome(mut self) -> TurnOutcome {
        for memid in std::mem::take(&mut self.dirty) {
            if let Some(data) = self.cells.remove(&memid) {
                self.changeset.write_cell(memid, data);
            }
        }
        TurnOutcome {
            changeset: self.changeset,
            sends: self.sends,
            log: self.log,
        }
    }

    /// A reference to this vat written in portable form names a local
    /// urbject.
    fn normalize(&self, target: &Target) -> Target {
        match target {
            Target::Remote(spid) if spid.vat() == &self.local => {
                Target::Local(spid.urbjid().clone())
            }
            other => other.clone(),
        }
    }

    fn decode_args(&mut self, args: &Value) -> Result<ScriptValue, VatError> {
        match args {
            Value::Map(_) => self.import(args, true),
            other => Err(VatError::MalformedMessage(format!(
                "args must be a map, found {}",
                other.type_name()
            ))),
        }
    }

    /// Turn stored or received data into script data, minting handles for
    /// embedded authorities. Message arguments may only carry references.
    fn import(&mut self, value: &Value, from_message: bool) -> Result<ScriptValue, VatError> {
        Ok(match value {
            Value::Null => ScriptValue::Null,
            Value::Bool(b) => ScriptValue::Bool(*b),
            Value::Integer(n) => ScriptValue::Integer(*n),
            Value::Float(n) => ScriptValue::Float(*n),
            Value::String(s) => ScriptValue::Str(s.clone()),
            Value::List(items) => ScriptValue::List(
                items
                    .iter()
                    .map(|item| self.import(item, from_message))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(entries) => {
                let mut imported = BTreeMap::new();
                for (key, item) in entries {
                    imported.insert(key.clone(), self.import(item, from_message)?);
                }
                ScriptValue::Map(imported)
            }
            Value::Capability(Authority::Reference(target)) => {
                let target = self.normalize(target);
                ScriptValue::Handle(self.mint(Slot::Reference(target)))
            }
            Value::Capability(authority) if from_message => {
                return Err(VatError::MalformedMessage(format!(
                    "{} placeholders cannot be passed as arguments",
                    authority.kind()
                )));
            }
            Value::Capability(Authority::Native(name)) => {
                ScriptValue::Handle(self.mint(Slot::Native(name.clone())))
            }
            Value::Capability(Authority::MemorySlot(memid)) => {
                ScriptValue::Handle(self.mint(Slot::Memory(memid.clone())))
            }
        })
    }

    /// Turn script data into data for a cell; handles become the
    /// authorities they stand for.
    fn store_form(&self, value: ScriptValue) -> Result<Value, VatError> {
        self.export(value, &|slot, _| match slot.authority() {
            Some(authority) => Ok(authority),
            None => Err(VatError::ConfinementViolation(
                "the power view cannot be stored".into(),
            )),
        })
    }

    /// Turn script data into message arguments; only references may cross.
    fn message_form(&self, value: ScriptValue) -> Result<Value, VatError> {
        self.export(value, &|slot, local| match slot {
            Slot::Reference(target) => Ok(Authority::Reference(Target::Remote(target.to_spid(local)))),
            other => Err(VatError::ConfinementViolation(format!(
                "{} cannot be sent, only references can",
                other.describe()
            ))),
        })
    }

    fn export(
        &self,
        value: ScriptValue,
        convert: &dyn Fn(&Slot, &VatId) -> Result<Authority, VatError>,
    ) -> Result<Value, VatError> {
        Ok(match value {
            ScriptValue::Null => Value::Null,
            ScriptValue::Bool(b) => Value::Bool(b),
            ScriptValue::Integer(n) => Value::Integer(n),
            ScriptValue::Float(n) => Value::Float(n),
            ScriptValue::Str(s) => Value::String(s),
            ScriptValue::List(items) => Value::List(
                items
                    .into_iter()
                    .map(|item| self.export(item, convert))
                    .collect::<Result<_, _>>()?,
            ),
            ScriptValue::Map(entries) => {
                // Placeholders only ever come from handles.
                if entries.contains_key(POWER_DISCRIMINATOR) {
                    return Err(VatError::ConfinementViolation(format!(
                        "maps cannot carry the reserved key '{POWER_DISCRIMINATOR}'"
                    )));
                }
                let mut exported = BTreeMap::new();
                for (key, item) in entries {
                    exported.insert(key, self.export(item, convert)?);
                }
                Value::Map(exported)
            }
            ScriptValue::Handle(handle) => {
                Value::Capability(convert(&self.slot(handle)?, &self.local)?)
            }
        })
    }

    fn granted(&self, name: &str) -> Result<Authority, VatError> {
        self.power.get(name).cloned().ok_or_else(|| {
            VatError::ConfinementViolation(format!("no power named '{name}' was granted"))
        })
    }

    fn cell_mut(&mut self, memid: &Memid) -> Result<&mut Value, VatError> {
        self.cells
            .get_mut(memid)
            .ok_or_else(|| VatError::NotFound(format!("memory {memid}")))
    }

    fn call_native(&mut self, name: &str, args: Vec<ScriptValue>) -> Result<ScriptValue, VatError> {
        match name {
            MAKE_URBJECT => self.make_urbject(args),
            other => Err(VatError::ConfinementViolation(format!(
                "unknown primitive '{other}'"
            ))),
        }
    }

    fn make_urbject(&mut self, args: Vec<ScriptValue>) -> Result<ScriptValue, VatError> {
        let mut args = args.into_iter();
        let (Some(ScriptValue::Str(code)), Some(bundle), None) = (args.next(), args.next(), args.next())
        else {
            return Err(VatError::Script(
                "make_urbject expects (code, power) or (code, {name: capability})".into(),
            ));
        };

        let powid = match bundle {
            ScriptValue::Handle(handle) => match self.slot(handle)? {
                Slot::Power => self.powid.clone(),
                other => {
                    return Err(VatError::Script(format!(
                        "make_urbject cannot bind to {}",
                        other.describe()
                    )));
                }
            },
            ScriptValue::Map(entries) => {
                let mut grants = Vec::with_capacity(entries.len());
                for (name, entry) in entries {
                    let handle = match entry {
                        ScriptValue::Handle(handle) => handle,
                        other => {
                            return Err(VatError::Script(format!(
                                "grant '{name}' is a {}, not a capability",
                                other.type_name()
                            )));
                        }
                    };
                    let authority = self.slot(handle)?.authority().ok_or_else(|| {
                        VatError::ConfinementViolation(
                            "the power view cannot be granted by name".into(),
                        )
                    })?;
                    grants.push(Grant::new(name, authority));
                }
                let powid = Powid::generate();
                self.changeset.create_power(powid.clone(), Power::new(grants));
                powid
            }
            other => {
                return Err(VatError::Script(format!(
                    "make_urbject cannot bind to a {}",
                    other.type_name()
                )));
            }
        };

        let urbjid = Urbjid::generate();
        self.changeset
            .create_urbject(urbjid.clone(), Urbject::new(code, powid));
        Ok(ScriptValue::Handle(
            self.mint(Slot::Reference(Target::Local(urbjid))),
        ))
    }

    fn send_only(&mut self, target: Target, args: Vec<ScriptValue>) -> Result<ScriptValue, VatError> {
        let mut args = args.into_iter();
        let message_args = match (args.next(), args.next()) {
            (None, _) => Value::empty_map(),
            (Some(map @ ScriptValue::Map(_)), None) => self.message_form(map)?,
            _ => {
                return Err(VatError::Script(
                    "sendOnly expects a single map of arguments".into(),
                ));
            }
        };
        self.sends.push(OutboundSend {
            target: target.to_spid(&self.local),
            args: message_args,
        });
        Ok(ScriptValue::Null)
    }
}

impl Host for TurnHost {
    type Error = VatError;

    fn get(&mut self, handle: Handle, name: &str) -> Result<ScriptValue, VatError> {
        match self.slot(handle)? {
            Slot::Power => match self.granted(name)? {
                Authority::Native(primitive) => {
                    Ok(ScriptValue::Handle(self.mint(Slot::Native(primitive))))
                }
                Authority::Reference(target) => {
                    Ok(ScriptValue::Handle(self.mint(Slot::Reference(target))))
                }
                Authority::MemorySlot(memid) => {
                    Ok(ScriptValue::Handle(self.mint(Slot::Memory(memid))))
                }
            },
            Slot::Memory(memid) => {
                let field = match self.cell_mut(&memid)? {
                    Value::Map(entries) => entries.get(name).cloned().unwrap_or_default(),
                    other => {
                        return Err(VatError::Script(format!(
                            "memory {memid} holds a {}, not a map",
                            other.type_name()
                        )));
                    }
                };
                self.import(&field, false)
            }
            other => Err(VatError::Script(format!(
                "cannot read '{name}' of {}",
                other.describe()
            ))),
        }
    }

    fn set(&mut self, handle: Handle, name: &str, value: ScriptValue) -> Result<(), VatError> {
        match self.slot(handle)? {
            Slot::Power => match self.granted(name)? {
                Authority::MemorySlot(memid) => {
                    let data = self.store_form(value)?;
                    if !matches!(data, Value::Map(_)) {
                        return Err(VatError::Script(format!(
                            "memory can only be replaced by a map, not a {}",
                            data.type_name()
                        )));
                    }
                    *self.cell_mut(&memid)? = data;
                    self.dirty.insert(memid);
                    Ok(())
                }
                _ => Err(VatError::ConfinementViolation(format!(
                    "power '{name}' cannot be replaced"
                ))),
            },
            Slot::Memory(memid) => {
                let data = self.store_form(value)?;
                match self.cell_mut(&memid)? {
                    Value::Map(entries) => {
                        entries.insert(name.to_owned(), data);
                    }
                    other => {
                        return Err(VatError::Script(format!(
                            "memory {memid} holds a {}, not a map",
                            other.type_name()
                        )));
                    }
                }
                self.dirty.insert(memid);
                Ok(())
            }
            other => Err(VatError::Script(format!(
                "cannot write '{name}' of {}",
                other.describe()
            ))),
        }
    }

    fn call(
        &mut self,
        handle: Handle,
        method: &str,
        args: Vec<ScriptValue>,
    ) -> Result<ScriptValue, VatError> {
        match (self.slot(handle)?, method) {
            (Slot::Power, _) => match self.granted(method)? {
                Authority::Native(primitive) => self.call_native(&primitive, args),
                _ => Err(VatError::Script(format!("power '{method}' is not callable"))),
            },
            (Slot::Reference(target), "sendOnly") => self.send_only(target, args),
            (other, _) => Err(VatError::Script(format!(
                "{} has no method '{method}'",
                other.describe()
            ))),
        }
    }

    fn invoke(&mut self, handle: Handle, args: Vec<ScriptValue>) -> Result<ScriptValue, VatError> {
        match self.slot(handle)? {
            Slot::Native(primitive) => self.call_native(&primitive, args),
            other => Err(VatError::Script(format!(
                "{} is not callable",
                other.describe()
            ))),
        }
    }

    fn log(&mut self, line: &str) {
        tracing::info!(vat = %self.local, "{line}");
        self.log.push(line.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use spell_storage::MemoryStorageBackend;

    use super::*;

    type Store = CapabilityStore<MemoryStorageBackend<Vec<u8>, Vec<u8>>>;

    fn local() -> VatId {
        VatId::from("vat0-local")
    }

    fn peer() -> Spid {
        Spid::new("vat0-peer".into(), "urbj0-peer".into())
    }

    fn map(entries: Vec<(&str, Value)>) -> Value {
        Value::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        )
    }

    async fn store_with_memory(grant_make_urbject: bool) -> Result<(Store, Memid, Powid)> {
        let mut store = Store::open(MemoryStorageBackend::default()).await?;
        let memid = store.create_state_cell().await?;
        let powid = store
            .create_power_for_memid(&memid, grant_make_urbject)
            .await?;
        Ok((store, memid, powid))
    }

    async fn run_turn(store: &Store, code: &str, powid: &Powid, args: Value) -> Result<TurnOutcome, VatError> {
        let local = local();
        let budget = Budget {
            max_steps: 10_000,
            max_duration: None,
            ..Budget::default()
        };
        Turn::new(store, &local, &budget)
            .start_turn(code, powid, &args, &"vat0-sender".into())
            .await
    }

    #[tokio::test]
    async fn it_writes_memory_only_on_commit() -> Result<()> {
        let (mut store, memid, powid) = store_with_memory(false).await?;

        let outcome = run_turn(
            &store,
            "power.memory.foo = args.foo; log('stored', power.memory.foo);",
            &powid,
            map(vec![("foo", Value::Integer(12))]),
        )
        .await?;

        assert_eq!(store.read_cell(&memid).await?, Value::empty_map());
        assert_eq!(outcome.log, vec!["stored 12".to_string()]);

        store.commit(&outcome.changeset).await?;
        assert_eq!(
            store.read_cell(&memid).await?,
            map(vec![("foo", Value::Integer(12))])
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_replaces_a_whole_cell() -> Result<()> {
        let (mut store, memid, powid) = store_with_memory(false).await?;
        store
            .write_cell(&memid, map(vec![("old", Value::Bool(true))]))
            .await?;

        let outcome = run_turn(&store, "power.memory = {fresh: [1, 2]};", &powid, Value::empty_map()).await?;
        store.commit(&outcome.changeset).await?;

        assert_eq!(
            store.read_cell(&memid).await?,
            map(vec![(
                "fresh",
                Value::List(vec![Value::Integer(1), Value::Integer(2)])
            )])
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_refuses_ungranted_powers() -> Result<()> {
        let (store, _, powid) = store_with_memory(false).await?;

        for code in [
            "power.network.open();",
            "power.make_urbject('log(1);', power);",
            "let x = power.filesystem;",
        ] {
            let result = run_turn(&store, code, &powid, Value::empty_map()).await;
            assert!(
                matches!(result, Err(VatError::ConfinementViolation(_))),
                "{code}: {result:?}"
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn it_refuses_to_store_forged_placeholders() -> Result<()> {
        let (store, memid, powid) = store_with_memory(false).await?;

        for code in [
            "power.memory.f = {'__power__': 'native', swissnum: 'make_urbject'};",
            "power.memory = {inner: [{'__power__': 'memory', swissnum: 'mem0-x'}]};",
        ] {
            let result = run_turn(&store, code, &powid, Value::empty_map()).await;
            assert!(
                matches!(result, Err(VatError::ConfinementViolation(_))),
                "{code}: {result:?}"
            );
        }

        let later = run_turn(
            &store,
            "let mk = power.memory.f; power.memory.child = mk('log(1);', {memory: power.memory});",
            &powid,
            Value::empty_map(),
        )
        .await;
        assert!(later.is_err());
        assert_eq!(store.read_cell(&memid).await?, Value::empty_map());
        assert!(store.urbjects().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn it_fails_turns_whose_effects_cannot_be_stored() -> Result<()> {
        let mut store = Store::open(MemoryStorageBackend::default()).await?;
        let memid = store.create_state_cell().await?;
        let powid = store
            .create_bundle(vec![
                Grant::new("memory", Authority::MemorySlot(memid)),
                Grant::new("peer", Authority::Reference(Target::Remote(peer()))),
            ])
            .await?;
        let args = map(vec![("x", Value::Float(f64::INFINITY))]);

        for code in ["power.memory.x = args.x;", "power.peer.sendOnly({x: args.x});"] {
            let result = run_turn(&store, code, &powid, args.clone()).await;
            assert!(matches!(result, Err(VatError::Script(_))), "{code}: {result:?}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn it_refuses_unknown_native_primitives() -> Result<()> {
        let mut store = Store::open(MemoryStorageBackend::default()).await?;
        let powid = store
            .create_bundle(vec![Grant::new("launch", Authority::Native("launch".into()))])
            .await?;

        let result = run_turn(&store, "power.launch();", &powid, Value::empty_map()).await;

        assert!(matches!(result, Err(VatError::ConfinementViolation(_))));
        Ok(())
    }

    #[tokio::test]
    async fn it_rejects_malformed_arguments_before_running() -> Result<()> {
        let (store, _, powid) = store_with_memory(false).await?;

        let not_a_map = run_turn(&store, "fail('ran');", &powid, Value::Integer(1)).await;
        assert!(matches!(not_a_map, Err(VatError::MalformedMessage(_))));

        let smuggled = run_turn(
            &store,
            "fail('ran');",
            &powid,
            map(vec![(
                "cell",
                Value::Capability(Authority::MemorySlot("mem0-elsewhere".into())),
            )]),
        )
        .await;
        assert!(matches!(smuggled, Err(VatError::MalformedMessage(_))));
        Ok(())
    }

    #[tokio::test]
    async fn it_records_sends_in_portable_form() -> Result<()> {
        let mut store = Store::open(MemoryStorageBackend::default()).await?;
        let powid = store
            .create_bundle(vec![Grant::new(
                "peer",
                Authority::Reference(Target::Remote(peer())),
            )])
            .await?;

        let outcome = run_turn(
            &store,
            "power.peer.sendOnly({count: args.count + 1, reply: args.reply});",
            &powid,
            map(vec![
                ("count", Value::Integer(1)),
                (
                    "reply",
                    Value::Capability(Authority::Reference(Target::Local("urbj0-back".into()))),
                ),
            ]),
        )
        .await?;

        assert_eq!(
            outcome.sends,
            vec![OutboundSend {
                target: peer(),
                args: map(vec![
                    ("count", Value::Integer(2)),
                    (
                        "reply",
                        Value::Capability(Authority::Reference(Target::Remote(Spid::new(
                            local(),
                            "urbj0-back".into()
                        ))))
                    ),
                ]),
            }]
        );
        assert!(outcome.changeset.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn it_only_lets_references_cross() -> Result<()> {
        let mut store = Store::open(MemoryStorageBackend::default()).await?;
        let memid = store.create_state_cell().await?;
        let powid = store
            .create_bundle(vec![
                Grant::new("memory", Authority::MemorySlot(memid)),
                Grant::new("peer", Authority::Reference(Target::Remote(peer()))),
            ])
            .await?;

        for code in [
            "power.peer.sendOnly({m: power.memory});",
            "power.peer.sendOnly({p: power});",
        ] {
            let result = run_turn(&store, code, &powid, Value::empty_map()).await;
            assert!(
                matches!(result, Err(VatError::ConfinementViolation(_))),
                "{code}: {result:?}"
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn it_makes_urbjects_with_a_subset_of_its_power() -> Result<()> {
        let (mut store, memid, powid) = store_with_memory(true).await?;

        let outcome = run_turn(
            &store,
            "let child = power.make_urbject('power.memory.seen = true;', {memory: power.memory});\n\
             power.memory.child = child;",
            &powid,
            Value::empty_map(),
        )
        .await?;
        store.commit(&outcome.changeset).await?;

        let cell = store.read_cell(&memid).await?;
        let Some(Value::Capability(Authority::Reference(Target::Local(urbjid)))) = cell.get("child")
        else {
            panic!("expected a local reference, found {cell:?}");
        };
        let child = store.get_urbject(urbjid).await?;
        let child_power = store.get_bundle(child.powid()).await?;

        assert_ne!(child.powid(), &powid);
        assert_eq!(
            child_power.grants(),
            &[Grant::new("memory", Authority::MemorySlot(memid))]
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_shares_its_bundle_when_passing_power() -> Result<()> {
        let (mut store, memid, powid) = store_with_memory(true).await?;

        let outcome = run_turn(
            &store,
            "power.memory.twin = power.make_urbject('log(1);', power);",
            &powid,
            Value::empty_map(),
        )
        .await?;
        store.commit(&outcome.changeset).await?;

        let Some(Value::Capability(Authority::Reference(Target::Local(urbjid)))) =
            store.read_cell(&memid).await?.get("twin").cloned()
        else {
            panic!("expected a local reference");
        };
        assert_eq!(store.get_urbject(&urbjid).await?.powid(), &powid);
        assert_eq!(store.bundles().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn it_reaches_cells_stored_in_cells() -> Result<()> {
        let (mut store, memid, powid) = store_with_memory(false).await?;
        let inner = store.create_state_cell().await?;
        store
            .write_cell(
                &memid,
                map(vec![(
                    "inner",
                    Value::Capability(Authority::MemorySlot(inner.clone())),
                )]),
            )
            .await?;

        let outcome = run_turn(&store, "power.memory.inner.count = 3;", &powid, Value::empty_map()).await?;
        store.commit(&outcome.changeset).await?;

        assert_eq!(
            store.read_cell(&inner).await?,
            map(vec![("count", Value::Integer(3))])
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_classifies_failures() -> Result<()> {
        let (store, _, powid) = store_with_memory(false).await?;

        let raised = run_turn(&store, "power.memory.x = 1; fail('no');", &powid, Value::empty_map()).await;
        assert_eq!(raised.err(), Some(VatError::Script("no".into())));

        let unparsable = run_turn(&store, "let = ;", &powid, Value::empty_map()).await;
        assert!(matches!(unparsable, Err(VatError::Script(_))));

        let runaway = run_turn(&store, "while true { }", &powid, Value::empty_map()).await;
        assert!(matches!(runaway, Err(VatError::BudgetExceeded(_))));
        Ok(())
    }
}
