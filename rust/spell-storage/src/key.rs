use spell_capability::{Memid, Powid, Urbjid, VatId};

/// The tables a [`CapabilityStore`] keeps in its backend. Every row key is
/// `<table>/<rest>`.
///
/// [`CapabilityStore`]: crate::CapabilityStore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    /// Urbjects by id
    Urbject,
    /// Powers by id
    Power,
    /// State cells by id
    Memory,
    /// Store metadata
    Meta,
    /// The pending commit, if any
    Journal,
    /// Unacknowledged envelopes by destination and sequence number
    Outbox,
    /// Last sequence number assigned per destination
    OutboxNext,
    /// Last applied sequence number per source
    InboxMark,
}

impl Table {
    /// The key prefix of this table, including the trailing separator.
    pub fn prefix(&self) -> &'static str {
        match self {
            Table::Urbject => "urbject/",
            Table::Power => "power/",
            Table::Memory => "memory/",
            Table::Meta => "meta/",
            Table::Journal => "journal/",
            Table::Outbox => "outbox/",
            Table::OutboxNext => "outbox-next/",
            Table::InboxMark => "inbox-mark/",
        }
    }

    /// Build a row key in this table.
    pub fn key(&self, rest: &str) -> Vec<u8> {
        format!("{}{rest}", self.prefix()).into_bytes()
    }

    /// The part of `key` after this table's prefix, if `key` is in this
    /// table.
    pub fn strip<'a>(&self, key: &'a [u8]) -> Option<&'a str> {
        std::str::from_utf8(key).ok()?.strip_prefix(self.prefix())
    }
}

pub(crate) fn urbject_key(urbjid: &Urbjid) -> Vec<u8> {
    Table::Urbject.key(urbjid.as_str())
}

pub(crate) fn power_key(powid: &Powid) -> Vec<u8> {
    Table::Power.key(powid.as_str())
}

pub(crate) fn memory_key(memid: &Memid) -> Vec<u8> {
    Table::Memory.key(memid.as_str())
}

pub(crate) fn vat_id_key() -> Vec<u8> {
    Table::Meta.key("vatid")
}

pub(crate) fn journal_key() -> Vec<u8> {
    Table::Journal.key("pending")
}

/// Sequence numbers are zero padded so that rows of one destination sort in
/// sequence order.
pub(crate) fn outbox_key(to: &VatId, seqnum: u64) -> Vec<u8> {
    Table::Outbox.key(&format!("{to}/{seqnum:020}"))
}

pub(crate) fn outbox_next_key(to: &VatId) -> Vec<u8> {
    Table::OutboxNext.key(to.as_str())
}

pub(crate) fn inbox_mark_key(from: &VatId) -> Vec<u8> {
    Table::InboxMark.key(from.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_orders_outbox_rows_by_sequence_number() {
        let to = VatId::from("vat0-peer");

        assert!(outbox_key(&to, 9) < outbox_key(&to, 10));
        assert_eq!(
            Table::Outbox.strip(&outbox_key(&to, 7)),
            Some("vat0-peer/00000000000000000007")
        );
    }

    #[test]
    fn it_does_not_strip_keys_of_other_tables() {
        assert_eq!(Table::Power.strip(&urbject_key(&"urbj0-a".into())), None);
        assert_eq!(Table::Outbox.strip(&outbox_next_key(&"vat0-a".into())), None);
    }
}
