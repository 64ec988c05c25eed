//! Unit tests for the Money module
//!
//! Tests cover money creation, arithmetic, summation, tolerance checks,
//! currency handling and edge cases.

use core_kernel::{Currency, Money, MoneyError};
use rust_decimal_macros::dec;

mod creation {
    use super::*;

    #[test]
    fn test_new_creates_money_with_correct_amount() {
        let m = Money::new(dec!(1000000), Currency::IDR);
        assert_eq!(m.amount(), dec!(1000000));
        assert_eq!(m.currency(), Currency::IDR);
    }

    #[test]
    fn test_new_rounds_to_four_decimal_places() {
        let m = Money::new(dec!(100.123456789), Currency::IDR);
        assert_eq!(m.amount(), dec!(100.1235));
    }

    #[test]
    fn test_from_minor_handles_jpy_no_decimals() {
        let m = Money::from_minor(10000, Currency::JPY);
        assert_eq!(m.amount(), dec!(10000));
    }

    #[test]
    fn test_zero_creates_zero_amount() {
        let m = Money::zero(Currency::IDR);
        assert!(m.is_zero());
        assert!(!m.is_positive());
        assert!(!m.is_negative());
    }

    #[test]
    fn test_default_currency_is_rupiah() {
        assert_eq!(Currency::default(), Currency::IDR);
    }
}

mod arithmetic {
    use super::*;

    #[test]
    fn test_checked_sub_can_go_negative() {
        let a = Money::new(dec!(50), Currency::IDR);
        let b = Money::new(dec!(80), Currency::IDR);
        let result = a.checked_sub(&b).unwrap();
        assert!(result.is_negative());
        assert_eq!(result.amount(), dec!(-30));
    }

    #[test]
    fn test_checked_sub_currency_mismatch() {
        let a = Money::new(dec!(50), Currency::IDR);
        let b = Money::new(dec!(50), Currency::SGD);
        assert!(matches!(
            a.checked_sub(&b),
            Err(MoneyError::CurrencyMismatch(_, _))
        ));
    }

    #[test]
    fn test_negation_of_negative() {
        let m = Money::new(dec!(-25), Currency::IDR);
        assert_eq!((-m).amount(), dec!(25));
    }

    #[test]
    fn test_sum_rejects_foreign_amount() {
        let parts = [
            Money::new(dec!(10), Currency::IDR),
            Money::new(dec!(10), Currency::USD),
        ];
        assert!(Money::sum(&parts, Currency::IDR).is_err());
    }

    #[test]
    fn test_sum_of_debits_and_credits_nets_to_zero() {
        let debits = [
            Money::new(dec!(1110000), Currency::IDR),
        ];
        let credits = [
            Money::new(dec!(1000000), Currency::IDR),
            Money::new(dec!(110000), Currency::IDR),
        ];
        let d = Money::sum(&debits, Currency::IDR).unwrap();
        let c = Money::sum(&credits, Currency::IDR).unwrap();
        assert!((d - c).is_zero());
    }
}

mod tolerance {
    use super::*;

    #[test]
    fn test_is_within_is_symmetric() {
        let a = Money::new(dec!(100.00), Currency::IDR);
        let b = Money::new(dec!(99.995), Currency::IDR);
        assert!(a.is_within(&b, dec!(0.01)));
        assert!(b.is_within(&a, dec!(0.01)));
    }

    #[test]
    fn test_is_within_false_across_currencies() {
        let a = Money::new(dec!(100), Currency::IDR);
        let b = Money::new(dec!(100), Currency::USD);
        assert!(!a.is_within(&b, dec!(1)));
    }
}

mod currency {
    use super::*;

    #[test]
    fn test_currency_codes_round_trip_through_from_str() {
        for currency in [Currency::IDR, Currency::USD, Currency::EUR, Currency::SGD, Currency::JPY] {
            assert_eq!(currency.code().parse::<Currency>().unwrap(), currency);
        }
    }

    #[test]
    fn test_currency_decimal_places() {
        assert_eq!(Currency::IDR.decimal_places(), 2);
        assert_eq!(Currency::JPY.decimal_places(), 0);
    }
}

mod display {
    use super::*;

    #[test]
    fn test_money_display_idr() {
        let m = Money::new(dec!(1500000), Currency::IDR);
        assert_eq!(m.to_string(), "Rp 1500000.00");
    }

    #[test]
    fn test_money_display_jpy() {
        let m = Money::new(dec!(1500), Currency::JPY);
        assert_eq!(m.to_string(), "¥ 1500");
    }
}

mod serialization {
    use super::*;

    #[test]
    fn test_currency_serializes_uppercase() {
        let json = serde_json::to_string(&Currency::IDR).unwrap();
        assert_eq!(json, "\"IDR\"");
    }

    #[test]
    fn test_money_json_shape() {
        let m = Money::new(dec!(10), Currency::IDR);
        let value = serde_json::to_value(m).unwrap();
        assert_eq!(value["currency"], "IDR");
    }
}
