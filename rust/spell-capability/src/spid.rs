use std::fmt::{Display, Formatter};
use std::str::FromStr;

use base58::{FromBase58, ToBase58};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{CapabilityError, Urbjid, VatId};

/// Version prefix of the textual [`Spid`] form.
pub const SPID_PREFIX: &str = "spid0-";

/// A portable, unguessable reference to an urbject hosted by some vat.
///
/// The textual form is `spid0-<base58(vatid)>.<base58(urbjid)>`. Everything
/// except [`Spid::from_str`] and [`Display`] treats it as an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Spid {
    vat: VatId,
    urbjid: Urbjid,
}

impl Spid {
    /// Pair a vat with one of its urbjects.
    pub fn new(vat: VatId, urbjid: Urbjid) -> Self {
        Self { vat, urbjid }
    }

    /// The vat hosting the referenced urbject.
    pub fn vat(&self) -> &VatId {
        &self.vat
    }

    /// The referenced urbject's swiss number.
    pub fn urbjid(&self) -> &Urbjid {
        &self.urbjid
    }

    /// Split into `(vat, urbjid)`.
    pub fn into_parts(self) -> (VatId, Urbjid) {
        (self.vat, self.urbjid)
    }
}

impl Display for Spid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{SPID_PREFIX}{}.{}",
            self.vat.as_str().as_bytes().to_base58(),
            self.urbjid.as_str().as_bytes().to_base58()
        )
    }
}

fn decode_part(part: &str, what: &str) -> Result<String, CapabilityError> {
    let bytes = part
        .from_base58()
        .map_err(|error| CapabilityError::MalformedSpid(format!("bad {what}: {error:?}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|error| CapabilityError::MalformedSpid(format!("bad {what}: {error}")))?;
    if text.is_empty() {
        return Err(CapabilityError::MalformedSpid(format!("empty {what}")));
    }
    Ok(text)
}

impl FromStr for Spid {
    type Err = CapabilityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let body = value.strip_prefix(SPID_PREFIX).ok_or_else(|| {
            CapabilityError::MalformedSpid(format!("missing '{SPID_PREFIX}' prefix"))
        })?;
        let (vat, urbjid) = body
            .split_once('.')
            .ok_or_else(|| CapabilityError::MalformedSpid("missing separator".into()))?;

        Ok(Self {
            vat: VatId::from(decode_part(vat, "vatid")?),
            urbjid: Urbjid::from(decode_part(urbjid, "urbjid")?),
        })
    }
}

impl Serialize for Spid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Spid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_round_trips_ids_containing_separators() {
        let spid = Spid::new(VatId::from("vat.with.dots"), Urbjid::from("urbj0-a.b-c"));
        let decoded: Spid = spid.to_string().parse().unwrap();

        assert_eq!(decoded, spid);
        assert_eq!(decoded.vat().as_str(), "vat.with.dots");
    }

    #[test]
    fn it_rejects_unversioned_or_broken_spids() {
        assert!("spid1-abc.def".parse::<Spid>().is_err());
        assert!("spid0-abcdef".parse::<Spid>().is_err());
        assert!("spid0-0OIl.abc".parse::<Spid>().is_err());
        assert!("spid0-.abc".parse::<Spid>().is_err());
    }
}
