//! Unit tests for the ledger identifier types
//!
//! Covers creation, parsing, conversion and display formatting.

use core_kernel::{AccountId, CashBankId, JournalEntryId, JournalLineId, ProductId, SourceId};
use uuid::Uuid;

mod account_id_tests {
    use super::*;

    #[test]
    fn test_new_generates_unique_ids() {
        let id1 = AccountId::new();
        let id2 = AccountId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_new_v7_generates_time_ordered_ids() {
        let id1 = AccountId::new_v7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = AccountId::new_v7();
        let uuid1: Uuid = id1.into();
        let uuid2: Uuid = id2.into();
        assert!(uuid1 < uuid2);
    }

    #[test]
    fn test_from_uuid() {
        let uuid = Uuid::new_v4();
        let id = AccountId::from_uuid(uuid);
        assert_eq!(*id.as_uuid(), uuid);
    }

    #[test]
    fn test_prefix() {
        assert_eq!(AccountId::prefix(), "ACC");
    }

    #[test]
    fn test_from_str_with_prefix() {
        let original = AccountId::new();
        let parsed: AccountId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_from_str_without_prefix() {
        let uuid = Uuid::new_v4();
        let parsed: AccountId = uuid.to_string().parse().unwrap();
        assert_eq!(*parsed.as_uuid(), uuid);
    }

    #[test]
    fn test_from_str_rejects_garbage() {
        let result: Result<AccountId, _> = "ACC-not-a-uuid".parse();
        assert!(result.is_err());
    }
}

mod prefix_tests {
    use super::*;

    #[test]
    fn test_every_identifier_has_its_own_prefix() {
        let prefixes = [
            AccountId::prefix(),
            CashBankId::prefix(),
            JournalEntryId::prefix(),
            JournalLineId::prefix(),
            SourceId::prefix(),
            ProductId::prefix(),
        ];

        let mut unique = prefixes.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), prefixes.len());
    }

    #[test]
    fn test_display_uses_prefix() {
        assert!(CashBankId::new().to_string().starts_with("CB-"));
        assert!(JournalLineId::new().to_string().starts_with("JNLL-"));
        assert!(SourceId::new().to_string().starts_with("SRC-"));
    }
}

mod serde_tests {
    use super::*;

    #[test]
    fn test_serializes_as_bare_uuid() {
        let uuid = Uuid::new_v4();
        let id = JournalEntryId::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", uuid));
    }

    #[test]
    fn test_deserializes_from_bare_uuid() {
        let uuid = Uuid::new_v4();
        let id: SourceId = serde_json::from_str(&format!("\"{}\"", uuid)).unwrap();
        assert_eq!(*id.as_uuid(), uuid);
    }
}
