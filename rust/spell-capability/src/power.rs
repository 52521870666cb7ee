use serde::{Deserialize, Serialize};

use crate::{Authority, Grant, MAKE_URBJECT, Memid};

/// An authority bundle: the fixed, ordered set of grants a Turn executes
/// with.
///
/// A bundle is never extended after creation; narrowing or widening
/// authority always means creating a new bundle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Power {
    grants: Vec<Grant>,
}

impl Power {
    /// Bundle the given grants.
    pub fn new(grants: Vec<Grant>) -> Self {
        Self { grants }
    }

    /// The bundle scoped to a single state cell, exposed as `power.memory`,
    /// optionally with the `make_urbject` primitive.
    pub fn for_memory(memid: Memid, grant_make_urbject: bool) -> Self {
        let mut grants = vec![Grant::new("memory", Authority::MemorySlot(memid))];
        if grant_make_urbject {
            grants.push(Grant::new(
                MAKE_URBJECT,
                Authority::Native(MAKE_URBJECT.to_owned()),
            ));
        }
        Self { grants }
    }

    /// All grants, in creation order.
    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }

    /// Find the authority granted under `name`. The first grant wins when a
    /// name repeats.
    pub fn get(&self, name: &str) -> Option<&Authority> {
        self.grants
            .iter()
            .find(|grant| grant.name == name)
            .map(|grant| &grant.authority)
    }

    /// Whether any grant carries exactly this authority.
    pub fn holds(&self, authority: &Authority) -> bool {
        self.grants.iter().any(|grant| &grant.authority == authority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_only_grants_creation_when_asked() {
        let memid = Memid::from("mem0-a");
        let plain = Power::for_memory(memid.clone(), false);
        let creator = Power::for_memory(memid.clone(), true);

        assert_eq!(plain.get("memory"), Some(&Authority::MemorySlot(memid)));
        assert!(plain.get(MAKE_URBJECT).is_none());
        assert!(creator.holds(&Authority::Native(MAKE_URBJECT.into())));
    }
}
