//! The administrative control protocol of a vat.
//!
//! A poke is a single line: a command word followed by its operands.

use std::collections::BTreeMap;

use serde::Deserialize;
use spell_capability::{Memid, Spid, Urbjid, Value, VatId};
use spell_storage::StoreBackend;

use crate::{ExecutionServer, Network, VatError};

/// Code sent by the `execute` poke.
pub const EXECUTE_STUB: &str = r#"log("I have power!");"#;

#[derive(Debug, Deserialize)]
struct SendRequest {
    spid: Spid,
    #[serde(default)]
    args: Option<serde_json::Value>,
}

fn stub_args() -> Value {
    Value::Map(BTreeMap::from([("foo".to_string(), Value::Integer(12))]))
}

fn two_operands<'a>(command: &str, operands: &'a str) -> Result<(&'a str, &'a str), VatError> {
    let mut words = operands.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (Some(first), Some(second), None) => Ok((first, second)),
        _ => Err(VatError::MalformedMessage(format!(
            "{command} expects two operands, got '{operands}'"
        ))),
    }
}

/// Decode the `args` of a `send` poke: a JSON object, or a string holding
/// one. Missing args are an empty map.
fn send_args(args: Option<serde_json::Value>) -> Result<Value, VatError> {
    let json = match args {
        None | Some(serde_json::Value::Null) => return Ok(Value::empty_map()),
        Some(serde_json::Value::String(text)) => serde_json::from_str(&text)?,
        Some(json) => json,
    };
    match Value::from_json(json)? {
        args @ Value::Map(_) => Ok(args),
        other => Err(VatError::MalformedMessage(format!(
            "args must be a map, found {}",
            other.type_name()
        ))),
    }
}

impl<Backend, N> ExecutionServer<Backend, N>
where
    Backend: StoreBackend,
    N: Network,
{
    /// Handle an administrative command and answer with a status line.
    ///
    /// - `send {"spid": .., "args": ..}` invokes the urbject named by the
    ///   spid
    /// - `create-memory` creates an empty state cell
    /// - `execute <vatid> <memid>` sends a logging stub to run against a cell
    /// - `invoke <vatid> <urbjid>` invokes an urbject
    ///
    /// Anything else retransmits every unacknowledged message.
    pub async fn poke(&mut self, body: &str) -> Result<String, VatError> {
        let body = body.trim();
        let (command, operands) = match body.split_once(char::is_whitespace) {
            Some((command, operands)) => (command, operands.trim()),
            None => (body, ""),
        };
        tracing::debug!(vat = %self.vat_id(), command, "Poked");

        match command {
            "send" => {
                let request: SendRequest = serde_json::from_str(operands)?;
                let args = send_args(request.args)?;
                let (vat_id, urbjid) = request.spid.into_parts();
                self.send_invoke(vat_id, urbjid, args).await?;
                Ok("message sent".into())
            }
            "create-memory" => {
                let memid = self.store_mut().create_state_cell().await?;
                Ok(format!("created memory {memid}"))
            }
            "execute" => {
                let (vat_id, memid) = two_operands(command, operands)?;
                self.send_execute(
                    vat_id.parse::<VatId>()?,
                    memid.parse::<Memid>()?,
                    EXECUTE_STUB,
                    stub_args(),
                )
                .await?;
                Ok("execute sent".into())
            }
            "invoke" => {
                let (vat_id, urbjid) = two_operands(command, operands)?;
                self.send_invoke(
                    vat_id.parse::<VatId>()?,
                    urbjid.parse::<Urbjid>()?,
                    stub_args(),
                )
                .await?;
                Ok("invoke sent".into())
            }
            _ => {
                self.transport_mut().flush().await;
                Ok("I am poked".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn it_accepts_args_as_an_object_or_a_string() {
        let expected = Value::Map(BTreeMap::from([("n".to_string(), Value::Integer(1))]));

        assert_eq!(send_args(Some(serde_json::json!({"n": 1}))), Ok(expected.clone()));
        assert_eq!(send_args(Some(serde_json::json!("{\"n\": 1}"))), Ok(expected));
        assert_eq!(send_args(None), Ok(Value::empty_map()));
        assert!(matches!(
            send_args(Some(serde_json::json!([1]))),
            Err(VatError::MalformedMessage(_))
        ));
    }

    #[test]
    fn it_requires_exactly_two_operands() {
        assert_eq!(two_operands("invoke", "vat0-a  urbj0-b"), Ok(("vat0-a", "urbj0-b")));
        assert!(two_operands("invoke", "vat0-a").is_err());
        assert!(two_operands("invoke", "a b c").is_err());
    }
}
