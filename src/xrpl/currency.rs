//! Canonical amount representation for contract messages

use std::str::FromStr;

use bigdecimal::BigDecimal;
use eyre::{eyre, Result};

use super::address::XRP_ISSUER;
use super::transaction::{Amount, IssuedAmount};

/// Currency code used for native XRP in contract messages
pub const XRP_CURRENCY: &str = "XRP";

/// Convert any XRPL amount into an issued-currency triple with a plain decimal value.
///
/// Native drops are reported with the `XRP` currency and the zero-account issuer.
pub fn convert_amount_to_issued_currency_amount(amount: &Amount) -> Result<IssuedAmount> {
    match amount {
        Amount::Drops(drops) => Ok(IssuedAmount {
            currency: XRP_CURRENCY.to_string(),
            issuer: XRP_ISSUER.to_string(),
            value: normalize_decimal(drops)?,
        }),
        Amount::Issued(issued) => Ok(IssuedAmount {
            currency: issued.currency.clone(),
            issuer: issued.issuer.clone(),
            value: normalize_decimal(&issued.value)?,
        }),
    }
}

/// Render a decimal string (possibly in scientific notation) without exponent
pub fn normalize_decimal(value: &str) -> Result<String> {
    let decimal = BigDecimal::from_str(value.trim())
        .map_err(|e| eyre!("Invalid decimal amount {:?}: {}", value, e))?;
    Ok(to_plain_string(&decimal))
}

/// Whether a canonical decimal string is zero
pub fn is_zero(value: &str) -> bool {
    BigDecimal::from_str(value)
        .map(|d| d == BigDecimal::from(0))
        .unwrap_or(false)
}

fn to_plain_string(decimal: &BigDecimal) -> String {
    let (digits, scale) = decimal.normalized().as_bigint_and_exponent();
    let digits = digits.to_string();
    let (negative, digits) = match digits.strip_prefix('-') {
        Some(rest) => (true, rest.to_string()),
        None => (false, digits),
    };

    if digits == "0" {
        return "0".to_string();
    }

    let plain = if scale <= 0 {
        format!("{}{}", digits, "0".repeat(scale.unsigned_abs() as usize))
    } else {
        let scale = scale as usize;
        if digits.len() > scale {
            let (int_part, frac_part) = digits.split_at(digits.len() - scale);
            format!("{}.{}", int_part, frac_part)
        } else {
            format!("0.{}{}", "0".repeat(scale - digits.len()), digits)
        }
    };

    if negative {
        format!("-{}", plain)
    } else {
        plain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER: &str = "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh";

    fn issued(value: &str) -> Amount {
        Amount::Issued(IssuedAmount {
            currency: "OCH".to_string(),
            issuer: ISSUER.to_string(),
            value: value.to_string(),
        })
    }

    #[test]
    fn test_native_amounts() {
        let amount =
            convert_amount_to_issued_currency_amount(&Amount::Drops("1000".to_string())).unwrap();
        assert_eq!(amount.value, "1000");
        assert_eq!(amount.currency, XRP_CURRENCY);
        assert_eq!(amount.issuer, XRP_ISSUER);

        let amount =
            convert_amount_to_issued_currency_amount(&Amount::Drops("100e5".to_string())).unwrap();
        assert_eq!(amount.value, "10000000");
    }

    #[test]
    fn test_issued_amounts() {
        let amount = convert_amount_to_issued_currency_amount(&issued("100")).unwrap();
        assert_eq!(amount.value, "100");
        assert_eq!(amount.currency, "OCH");
        assert_eq!(amount.issuer, ISSUER);

        let amount = convert_amount_to_issued_currency_amount(&issued("100e6")).unwrap();
        assert_eq!(amount.value, "100000000");
    }

    #[test]
    fn test_normalize_decimal() {
        assert_eq!(normalize_decimal("0").unwrap(), "0");
        assert_eq!(normalize_decimal("0.000").unwrap(), "0");
        assert_eq!(normalize_decimal("1.50").unwrap(), "1.5");
        assert_eq!(normalize_decimal("1.5e-3").unwrap(), "0.0015");
        assert_eq!(normalize_decimal("-2E2").unwrap(), "-200");
        assert_eq!(normalize_decimal("123.456").unwrap(), "123.456");
        assert!(normalize_decimal("abc").is_err());
    }

    #[test]
    fn test_is_zero() {
        assert!(is_zero("0"));
        assert!(is_zero("0.00"));
        assert!(!is_zero("0.01"));
        assert!(!is_zero("garbage"));
    }
}
