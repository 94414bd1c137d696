//! Creator shares expressed in basis points

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::errors::TypesError;

/// Basis points representing a 100% share
pub const FULL_SHARE_BPS: u32 = 10_000;

/// One account's share of a token, in basis points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Part {
    pub account: Address,
    pub value: u32,
}

impl Part {
    pub fn new(account: Address, value: u32) -> Self {
        Self { account, value }
    }

    /// Single owner of the whole share
    pub fn full(account: Address) -> Self {
        Self {
            account,
            value: FULL_SHARE_BPS,
        }
    }
}

/// Check that creator parts are non-empty and sum to exactly 10000 bps
pub fn validate_parts(parts: &[Part]) -> Result<(), TypesError> {
    if parts.is_empty() {
        return Err(TypesError::EmptyParts);
    }
    let total: u32 = parts.iter().map(|p| p.value).fold(0u32, u32::saturating_add);
    if total != FULL_SHARE_BPS {
        return Err(TypesError::InvalidPartsTotal {
            total,
            expected: FULL_SHARE_BPS,
        });
    }
    Ok(())
}

/// Split `amount` across `parts` proportionally to their bps.
///
/// Integer rounding leftovers go to the first part so the shares always add
/// back up to `amount`. Accounts listed twice are reported twice.
pub fn split_by_parts(amount: U256, parts: &[Part]) -> Vec<(Address, U256)> {
    if parts.is_empty() {
        return Vec::new();
    }
    let full = U256::from(FULL_SHARE_BPS);
    let mut shares: Vec<(Address, U256)> = parts
        .iter()
        .map(|p| (p.account, amount.saturating_mul(U256::from(p.value)) / full))
        .collect();

    let assigned = shares
        .iter()
        .fold(U256::ZERO, |acc, (_, v)| acc.saturating_add(*v));
    if assigned < amount {
        shares[0].1 += amount - assigned;
    }
    shares
}
