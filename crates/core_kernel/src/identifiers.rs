//! Typed ids for ledger rows
//!
//! Each id wraps a UUID and renders with a short prefix (`ACC-…`, `JNL-…`),
//! so an account id cannot be passed where a journal entry id is expected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! ledger_id {
    ($(#[$meta:meta])* $name:ident => $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            const PREFIX: &'static str = $prefix;

            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Time-ordered id; rows created later sort later
            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            pub fn prefix() -> &'static str {
                Self::PREFIX
            }

            /// Upper-case last eight hex digits, for entry numbers
            ///
            /// Both v4 and v7 ids end in random bits.
            pub fn short(&self) -> String {
                let hex = self.0.simple().to_string();
                hex[hex.len() - 8..].to_ascii_uppercase()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", Self::PREFIX, self.0)
            }
        }

        /// Accepts both the prefixed display form and a bare UUID
        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s
                    .strip_prefix(Self::PREFIX)
                    .and_then(|rest| rest.strip_prefix('-'))
                    .unwrap_or(s);
                Uuid::parse_str(raw).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

ledger_id! {
    /// Row in the chart of accounts
    AccountId => "ACC"
}
ledger_id! {
    /// Cash or bank register mirrored by a cash/bank ledger account
    CashBankId => "CB"
}
ledger_id!(JournalEntryId => "JNL");
ledger_id!(JournalLineId => "JNLL");
ledger_id! {
    /// Id of the business document a journal entry was posted from
    SourceId => "SRC"
}
ledger_id!(ProductId => "PRD");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_prefix() {
        let id = AccountId::new();
        assert_eq!(id.to_string(), format!("ACC-{}", id.as_uuid()));
    }

    #[test]
    fn test_parse_display_form() {
        let original = JournalEntryId::new_v7();
        assert_eq!(original.to_string().parse::<JournalEntryId>().unwrap(), original);
    }

    #[test]
    fn test_other_prefix_is_not_stripped() {
        let uuid = Uuid::new_v4();
        assert!(format!("ACC-{}", uuid).parse::<JournalLineId>().is_err());
    }

    #[test]
    fn test_short_form_is_eight_uppercase_hex_digits() {
        let id = SourceId::from_uuid(Uuid::parse_str("0f8fad5b-d9cb-469f-a165-70867728950e").unwrap());
        assert_eq!(id.short(), "7728950E");
    }
}
