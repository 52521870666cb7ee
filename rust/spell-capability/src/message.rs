use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{CapabilityError, Memid, Urbjid, Value, VatId};

/// What an inbound message asks the receiving vat to do.
///
/// The set is closed: anything a newer peer sends that this vat does not
/// understand decodes to [`Command::Unrecognized`], which the execution
/// server logs and ignores.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Run ad hoc `code` with authority over the cell `memid` only.
    Execute {
        /// The cell the fresh bundle is scoped to.
        memid: Memid,
        /// The procedure body.
        code: String,
    },
    /// Run the code of urbject `urbjid` under its bound bundle.
    Invoke {
        /// The addressed urbject.
        urbjid: Urbjid,
    },
    /// A command name this vat does not know.
    Unrecognized(String),
}

impl Command {
    /// The wire name of the command.
    pub fn name(&self) -> &str {
        match self {
            Command::Execute { .. } => "execute",
            Command::Invoke { .. } => "invoke",
            Command::Unrecognized(name) => name,
        }
    }
}

/// A one-way message between (or within) vats.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// What to do.
    pub command: Command,
    /// Arguments handed to the code as `args`.
    pub args: Value,
}

impl Message {
    /// An `execute` message.
    pub fn execute(memid: Memid, code: impl Into<String>, args: Value) -> Self {
        Self {
            command: Command::Execute {
                memid,
                code: code.into(),
            },
            args,
        }
    }

    /// An `invoke` message.
    pub fn invoke(urbjid: Urbjid, args: Value) -> Self {
        Self {
            command: Command::Invoke { urbjid },
            args,
        }
    }

    /// Render as a [`Value`] map (the wire shape).
    pub fn to_value(&self) -> Value {
        let mut entries = BTreeMap::new();
        entries.insert(
            "command".to_owned(),
            Value::String(self.command.name().to_owned()),
        );
        match &self.command {
            Command::Execute { memid, code } => {
                entries.insert("memid".to_owned(), Value::String(memid.to_string()));
                entries.insert("code".to_owned(), Value::String(code.clone()));
            }
            Command::Invoke { urbjid } => {
                entries.insert("urbjid".to_owned(), Value::String(urbjid.to_string()));
            }
            Command::Unrecognized(_) => {}
        }
        entries.insert("args".to_owned(), self.args.clone());
        Value::Map(entries)
    }

    /// Decode the wire shape. Unknown commands are not an error.
    pub fn from_value(value: Value) -> Result<Self, CapabilityError> {
        let Value::Map(mut entries) = value else {
            return Err(CapabilityError::MalformedMessage(format!(
                "expected a map, found {}",
                value.type_name()
            )));
        };

        let command = match entries.remove("command") {
            Some(Value::String(command)) => command,
            Some(other) => {
                return Err(CapabilityError::MalformedMessage(format!(
                    "command must be a string, found {}",
                    other.type_name()
                )));
            }
            None => return Err(CapabilityError::MalformedMessage("missing command".into())),
        };

        let command = match command.as_str() {
            "execute" => Command::Execute {
                memid: required_string(&mut entries, "memid")?.into(),
                code: required_string(&mut entries, "code")?,
            },
            "invoke" => Command::Invoke {
                urbjid: required_string(&mut entries, "urbjid")?.into(),
            },
            _ => Command::Unrecognized(command),
        };

        let args = match (&command, entries.remove("args")) {
            (_, Some(args)) => args,
            (Command::Unrecognized(_), None) => Value::Null,
            (_, None) => return Err(CapabilityError::MalformedMessage("missing args".into())),
        };

        Ok(Self { command, args })
    }

    /// Decode from JSON.
    pub fn from_json(json: serde_json::Value) -> Result<Self, CapabilityError> {
        let value = Value::from_json(json)
            .map_err(|error| CapabilityError::MalformedMessage(format!("{error}")))?;
        Self::from_value(value)
    }

    /// Encode as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_value().to_json()
    }
}

fn required_string(
    entries: &mut BTreeMap<String, Value>,
    field: &str,
) -> Result<String, CapabilityError> {
    match entries.remove(field) {
        Some(Value::String(text)) if !text.is_empty() => Ok(text),
        Some(_) => Err(CapabilityError::MalformedMessage(format!(
            "{field} must be a non-empty string"
        ))),
        None => Err(CapabilityError::MalformedMessage(format!(
            "missing {field}"
        ))),
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Message::from_value(Value::deserialize(deserializer)?).map_err(serde::de::Error::custom)
    }
}

/// A [`Message`] in transit between two vats, stamped with its position in
/// the sender's per-destination sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The sending vat.
    pub from: VatId,
    /// The receiving vat.
    pub to: VatId,
    /// Position in the `from` → `to` channel, starting at 1.
    pub seqnum: u64,
    /// The carried message.
    pub message: Message,
}
