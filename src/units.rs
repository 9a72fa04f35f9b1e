//! Native-asset unit conversions
//!
//! The sweep core carries amounts as `u128` wei. Conversion to and from the
//! ledger's 256-bit integers happens at the client boundary.

use ethers::types::U256;
use ethers::utils::{format_units, parse_units};

use crate::error::{Error, Result};

/// Amount in the smallest native unit
pub type Wei = u128;

/// 1 gwei in wei
pub const GWEI: Wei = 1_000_000_000;

/// 1 ether in wei
pub const ETHER: Wei = 1_000_000_000_000_000_000;

/// Parse a decimal ether amount ("0.001") into wei
pub fn parse_ether(amount: &str) -> Result<Wei> {
    parse_decimal(amount, "ether")
}

/// Parse a decimal gwei amount ("200") into wei
pub fn parse_gwei(amount: &str) -> Result<Wei> {
    parse_decimal(amount, "gwei")
}

fn parse_decimal(amount: &str, unit: &str) -> Result<Wei> {
    let amount = amount.trim();
    if amount.is_empty() || amount.starts_with('-') {
        return Err(Error::Config(format!(
            "Invalid {} amount '{}': must be a non-negative decimal",
            unit, amount
        )));
    }

    let parsed: U256 = parse_units(amount, unit)
        .map_err(|e| Error::Config(format!("Invalid {} amount '{}': {}", unit, amount, e)))?
        .into();

    u256_to_wei(parsed)
}

/// Narrow a ledger integer into wei
pub fn u256_to_wei(value: U256) -> Result<Wei> {
    if value > U256::from(u128::MAX) {
        return Err(Error::AmountOverflow(format!("{} does not fit in u128", value)));
    }
    Ok(value.as_u128())
}

/// Narrow a ledger integer into a u64 counter (nonce, gas, block)
pub fn u256_to_u64(value: U256) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        return Err(Error::AmountOverflow(format!("{} does not fit in u64", value)));
    }
    Ok(value.as_u64())
}

/// Format wei as ether
pub fn format_ether(wei: Wei) -> String {
    ethers::utils::format_ether(U256::from(wei))
}

/// Format wei as gwei
pub fn format_gwei(wei: Wei) -> String {
    format_units(U256::from(wei), "gwei").unwrap_or_else(|_| format!("{} wei", wei))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ether() {
        assert_eq!(parse_ether("2.0").unwrap(), 2 * ETHER);
        assert_eq!(parse_ether("0.001").unwrap(), ETHER / 1000);
        assert_eq!(parse_ether(" 1 ").unwrap(), ETHER);
    }

    #[test]
    fn test_parse_gwei() {
        assert_eq!(parse_gwei("20").unwrap(), 20 * GWEI);
        assert_eq!(parse_gwei("200").unwrap(), 200 * GWEI);
    }

    #[test]
    fn test_parse_rejects_negative_and_garbage() {
        assert!(parse_ether("-1").is_err());
        assert!(parse_ether("").is_err());
        assert!(parse_gwei("abc").is_err());
    }

    #[test]
    fn test_u256_narrowing() {
        assert_eq!(u256_to_wei(U256::from(42u64)).unwrap(), 42);
        assert!(u256_to_wei(U256::MAX).is_err());
        assert_eq!(u256_to_u64(U256::from(7u64)).unwrap(), 7);
        assert!(u256_to_u64(U256::from(u128::MAX)).is_err());
    }

    #[test]
    fn test_format() {
        assert!(format_ether(2 * ETHER).starts_with("2.0"));
        assert!(format_gwei(20 * GWEI).starts_with("20.0"));
    }
}
