use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use spell_common::swiss_number;

use crate::CapabilityError;

macro_rules! swiss_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Prefix carried by freshly generated identifiers of this kind.
            pub const PREFIX: &'static str = $prefix;

            /// Draw a fresh, unguessable identifier.
            pub fn generate() -> Self {
                Self(swiss_number(Self::PREFIX))
            }

            /// The identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = CapabilityError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                if value.is_empty() {
                    return Err(CapabilityError::MalformedValue(format!(
                        "empty {}",
                        stringify!($name)
                    )));
                }
                Ok(Self(value.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

swiss_id!(
    /// Opaque, globally addressable identifier of a vat.
    VatId,
    "vat0-"
);

swiss_id!(
    /// Swiss number of an [`Urbject`](crate::Urbject).
    Urbjid,
    "urbj0-"
);

swiss_id!(
    /// Swiss number of a [`Power`](crate::Power) bundle.
    Powid,
    "pow0-"
);

swiss_id!(
    /// Swiss number of a state cell.
    Memid,
    "mem0-"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_generates_prefixed_unique_ids() {
        let one = Memid::generate();
        let two = Memid::generate();

        assert!(one.as_str().starts_with(Memid::PREFIX));
        assert!(Urbjid::generate().as_str().starts_with("urbj0-"));
        assert_ne!(one, two);
    }

    #[test]
    fn it_rejects_empty_ids() {
        assert!("".parse::<Powid>().is_err());
        assert_eq!("pow0-x".parse::<Powid>().unwrap(), Powid::from("pow0-x"));
    }
}
