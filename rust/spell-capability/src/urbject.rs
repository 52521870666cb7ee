use serde::{Deserialize, Serialize};
use spell_common::Blake3Hash;

use crate::Powid;

/// A capability object: immutable code bound to one authority bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Urbject {
    code: String,
    powid: Powid,
}

impl Urbject {
    /// Bind `code` to the bundle `powid`.
    pub fn new(code: impl Into<String>, powid: Powid) -> Self {
        Self {
            code: code.into(),
            powid,
        }
    }

    /// Everything needed to seed a Turn.
    pub fn get_code_and_bundle(&self) -> (&str, &Powid) {
        (&self.code, &self.powid)
    }

    /// The code body.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The bound bundle.
    pub fn powid(&self) -> &Powid {
        &self.powid
    }

    /// Content identity of the code, for introspection only.
    pub fn code_id(&self) -> Blake3Hash {
        Blake3Hash::hash(self.code.as_bytes())
    }
}
