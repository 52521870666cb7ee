use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{CapabilityError, Memid, Power, Spid, Urbjid, Value, VatId};

/// Reserved map key that marks an embedded capability inside a [`Value`].
pub const POWER_DISCRIMINATOR: &str = "__power__";

/// Map key carrying the capability's swiss number inside a placeholder.
pub const SWISSNUM_FIELD: &str = "swissnum";

/// Name of the only native primitive hosted by a vat today.
pub const MAKE_URBJECT: &str = "make_urbject";

/// The object a [`Authority::Reference`] lets its holder send to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Target {
    /// An urbject hosted by the vat that holds the authority.
    Local(Urbjid),
    /// An urbject named by a portable reference, possibly on another vat.
    Remote(Spid),
}

impl Target {
    /// Render as a portable reference, pairing local targets with `local`.
    pub fn to_spid(&self, local: &VatId) -> Spid {
        match self {
            Target::Local(urbjid) => Spid::new(local.clone(), urbjid.clone()),
            Target::Remote(spid) => spid.clone(),
        }
    }
}

/// A single grant: what one entry of a [`Power`] lets code do.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Authority {
    /// Invoke the named host primitive.
    Native(String),
    /// Send one-way messages to the target urbject.
    Reference(Target),
    /// Read and write one state cell.
    MemorySlot(Memid),
}

impl Authority {
    /// The placeholder kind used on the wire and in stored values.
    pub fn kind(&self) -> &'static str {
        match self {
            Authority::Native(_) => "native",
            Authority::Reference(_) => "reference",
            Authority::MemorySlot(_) => "memory",
        }
    }

    /// Render this authority in its externally meaningful form.
    pub fn external_form(&self, policy: &ResolvePolicy) -> ExternalForm {
        match self {
            Authority::Native(name) => ExternalForm::Native(name.clone()),
            Authority::Reference(target) => ExternalForm::Reference(target.to_spid(&policy.local)),
            Authority::MemorySlot(memid) => ExternalForm::Memory(memid.clone()),
        }
    }

    /// Rebuild an authority from the entries of a placeholder map (one that
    /// carries [`POWER_DISCRIMINATOR`]).
    pub fn from_placeholder(entries: &BTreeMap<String, Value>) -> Result<Self, CapabilityError> {
        let kind = match entries.get(POWER_DISCRIMINATOR) {
            Some(Value::String(kind)) => kind.as_str(),
            _ => {
                return Err(CapabilityError::MalformedValue(format!(
                    "'{POWER_DISCRIMINATOR}' must name a kind"
                )));
            }
        };
        let swissnum = entries.get(SWISSNUM_FIELD).ok_or_else(|| {
            CapabilityError::MalformedValue(format!("{kind} placeholder without swissnum"))
        })?;

        match (kind, swissnum) {
            ("native", Value::String(name)) => Ok(Authority::Native(name.clone())),
            ("memory", Value::String(memid)) => Ok(Authority::MemorySlot(memid.parse()?)),
            ("reference", Value::String(urbjid)) => {
                Ok(Authority::Reference(Target::Local(urbjid.parse()?)))
            }
            ("reference", Value::List(pair)) => match pair.as_slice() {
                [Value::String(vat), Value::String(urbjid)] => Ok(Authority::Reference(
                    Target::Remote(Spid::new(vat.parse()?, urbjid.parse()?)),
                )),
                _ => Err(CapabilityError::MalformedValue(
                    "reference swissnum must be a [vatid, urbjid] pair".into(),
                )),
            },
            ("native" | "memory" | "reference", _) => Err(CapabilityError::MalformedValue(format!(
                "{kind} placeholder has a malformed swissnum"
            ))),
            (other, _) => Err(CapabilityError::MalformedValue(format!(
                "unknown capability kind '{other}'"
            ))),
        }
    }
}

impl Serialize for Authority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(POWER_DISCRIMINATOR, self.kind())?;
        match self {
            Authority::Native(name) => map.serialize_entry(SWISSNUM_FIELD, name)?,
            Authority::MemorySlot(memid) => map.serialize_entry(SWISSNUM_FIELD, memid)?,
            Authority::Reference(Target::Local(urbjid)) => {
                map.serialize_entry(SWISSNUM_FIELD, urbjid)?
            }
            Authority::Reference(Target::Remote(spid)) => map.serialize_entry(
                SWISSNUM_FIELD,
                &[spid.vat().as_str(), spid.urbjid().as_str()],
            )?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Authority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Capability(authority) => Ok(authority),
            other => Err(serde::de::Error::custom(format!(
                "expected a capability placeholder, found {}",
                other.type_name()
            ))),
        }
    }
}

/// One entry of a [`Power`]: an authority and the name code reaches it by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// The name exposed on the `power` view.
    pub name: String,
    /// What the grant allows.
    pub authority: Authority,
}

impl Grant {
    /// Create a grant.
    pub fn new(name: impl Into<String>, authority: Authority) -> Self {
        Self {
            name: name.into(),
            authority,
        }
    }
}

/// Context needed to render authorities in their external form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvePolicy {
    /// The vat whose store the authorities were read from.
    pub local: VatId,
}

impl ResolvePolicy {
    /// Resolve relative to `local`.
    pub fn new(local: VatId) -> Self {
        Self { local }
    }
}

/// The portable rendering of an [`Authority`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalForm {
    /// A native primitive, by name.
    Native(String),
    /// A reference, as a portable [`Spid`].
    Reference(Spid),
    /// A state cell, by swiss number.
    Memory(Memid),
}

impl ExternalForm {
    /// The placeholder kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ExternalForm::Native(_) => "native",
            ExternalForm::Reference(_) => "reference",
            ExternalForm::Memory(_) => "memory",
        }
    }

    /// The textual swiss number (the Spid string for references).
    pub fn swissnum(&self) -> String {
        match self {
            ExternalForm::Native(name) => name.clone(),
            ExternalForm::Reference(spid) => spid.to_string(),
            ExternalForm::Memory(memid) => memid.to_string(),
        }
    }
}

/// List every authority of `power` in grant order alongside its external
/// form. Never mutates the bundle.
pub fn resolve_authorities(power: &Power, policy: &ResolvePolicy) -> Vec<(Authority, ExternalForm)> {
    power
        .grants()
        .iter()
        .map(|grant| {
            (
                grant.authority.clone(),
                grant.authority.external_form(policy),
            )
        })
        .collect()
}

/// Collect the authorities embedded anywhere inside `value`, in document
/// order (maps are visited in key order).
pub fn embedded_authorities(value: &Value) -> Vec<&Authority> {
    fn walk<'a>(value: &'a Value, found: &mut Vec<&'a Authority>) {
        match value {
            Value::Capability(authority) => found.push(authority),
            Value::List(items) => items.iter().for_each(|item| walk(item, found)),
            Value::Map(entries) => entries.values().for_each(|item| walk(item, found)),
            _ => {}
        }
    }

    let mut found = Vec::new();
    walk(value, &mut found);
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn local() -> VatId {
        VatId::from("vat0-local")
    }

    #[test]
    fn it_renders_local_references_with_the_local_vat() {
        let power = Power::new(vec![
            Grant::new("make_urbject", Authority::Native(MAKE_URBJECT.into())),
            Grant::new("self", Authority::Reference(Target::Local("urbj0-a".into()))),
            Grant::new(
                "peer",
                Authority::Reference(Target::Remote(Spid::new(
                    "vat0-remote".into(),
                    "urbj0-b".into(),
                ))),
            ),
            Grant::new("memory", Authority::MemorySlot("mem0-c".into())),
        ]);

        let resolved = resolve_authorities(&power, &ResolvePolicy::new(local()));
        let forms: Vec<_> = resolved.into_iter().map(|(_, form)| form).collect();

        assert_eq!(
            forms,
            vec![
                ExternalForm::Native("make_urbject".into()),
                ExternalForm::Reference(Spid::new(local(), "urbj0-a".into())),
                ExternalForm::Reference(Spid::new("vat0-remote".into(), "urbj0-b".into())),
                ExternalForm::Memory("mem0-c".into()),
            ]
        );
    }

    #[test]
    fn it_finds_authorities_nested_in_values() {
        let value: Value = serde_json::from_value(serde_json::json!({
            "b": [1, {"__power__": "memory", "swissnum": "mem0-x"}],
            "a": {"__power__": "reference", "swissnum": ["vat0-r", "urbj0-y"]},
            "c": "plain"
        }))
        .unwrap();

        let found = embedded_authorities(&value);

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].kind(), "reference");
        assert_eq!(found[1], &Authority::MemorySlot("mem0-x".into()));
    }

    #[test]
    fn it_rejects_unknown_placeholder_kinds() {
        let parsed = serde_json::from_value::<Value>(serde_json::json!({
            "__power__": "ambient",
            "swissnum": "everything"
        }));

        assert!(parsed.is_err());
    }
}
