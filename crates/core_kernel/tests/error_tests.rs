//! Tests for the kernel error type

use core_kernel::error::CoreError;
use core_kernel::money::MoneyError;
use core_kernel::Currency;

#[test]
fn test_unknown_code_names_kind_and_value() {
    let error = CoreError::unknown_code("account type", "CONTRA");

    assert!(matches!(&error, CoreError::UnknownCode { kind: "account type", value } if value == "CONTRA"));
    assert_eq!(error.to_string(), "unknown account type 'CONTRA'");
}

#[test]
fn test_illegal_status_change_message() {
    let error = CoreError::illegal_status_change("entry JE-000001 is already POSTED");

    assert!(matches!(error, CoreError::IllegalStatusChange(_)));
    assert!(error.to_string().starts_with("illegal status change"));
}

#[test]
fn test_money_error_passes_through_display() {
    let money_error = MoneyError::CurrencyMismatch("IDR".to_string(), "USD".to_string());
    let expected = money_error.to_string();

    let core_error: CoreError = money_error.into();

    assert!(matches!(core_error, CoreError::Money(_)));
    assert_eq!(core_error.to_string(), expected);
}

#[test]
fn test_unknown_currency_converts() {
    let core_error: CoreError = "XYZ".parse::<Currency>().unwrap_err().into();

    assert!(core_error.to_string().contains("XYZ"));
}

#[test]
fn test_validation_prefix() {
    let error = CoreError::validation("materiality threshold must not be negative");

    assert_eq!(
        error.to_string(),
        "validation failed: materiality threshold must not be negative"
    );
}
