//! Referral fee derivation.
//!
//! Commission and referral fee are both basis points of a basis-point-scaled
//! whole, so the combined divisor is `10_000 * 10_000`. Everything is computed
//! in 128-bit integers and rounded half away from zero, which keeps the
//! client-side preview and the server-side figure identical.

use crate::domain::{BasisPoints, Cents, ContractTerms};

/// Divisor for `price * commission_bp * referral_fee_bp`.
pub const FEE_DIVISOR: i128 = 100_000_000;

/// Divisor for a single basis-point leg.
pub const BASIS_POINTS_PER_WHOLE: i128 = 10_000;

/// Derive the referral fee owed on a contract.
///
/// Returns `None` when any input is missing or not positive, when the
/// product overflows, or when the rounded fee is not positive. A zero price
/// therefore means "not priced", never a zero fee.
pub fn derive_referral_fee(
    contract_price: Option<Cents>,
    commission: Option<BasisPoints>,
    referral_fee: Option<BasisPoints>,
) -> Option<Cents> {
    let price = positive(contract_price?.as_i64())?;
    let commission = positive(commission?.as_i64())?;
    let referral_fee = positive(referral_fee?.as_i64())?;

    let numerator = price.checked_mul(commission)?.checked_mul(referral_fee)?;
    to_positive_cents(round_div(numerator, FEE_DIVISOR)?)
}

/// [`derive_referral_fee`] over a set of contract terms.
pub fn derive_from_terms(terms: &ContractTerms) -> Option<Cents> {
    derive_referral_fee(
        terms.contract_price_cents,
        terms.commission_basis_points,
        terms.referral_fee_basis_points,
    )
}

/// Fee on a pre-approval amount at a flat rate.
pub fn pre_approval_fee(amount: Cents, rate: BasisPoints) -> Option<Cents> {
    let amount = positive(amount.as_i64())?;
    let rate = positive(rate.as_i64())?;
    to_positive_cents(round_div(amount.checked_mul(rate)?, BASIS_POINTS_PER_WHOLE)?)
}

fn positive(value: i64) -> Option<i128> {
    (value > 0).then_some(i128::from(value))
}

/// Non-negative integer division rounding half away from zero.
fn round_div(numerator: i128, divisor: i128) -> Option<i128> {
    numerator.checked_add(divisor / 2).map(|n| n / divisor)
}

fn to_positive_cents(value: i128) -> Option<Cents> {
    i64::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .map(Cents::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fee(price: i64, commission: i64, referral_fee: i64) -> Option<Cents> {
        derive_referral_fee(
            Some(Cents(price)),
            Some(BasisPoints(commission)),
            Some(BasisPoints(referral_fee)),
        )
    }

    #[test]
    fn test_worked_example() {
        // $300,000 at 3% commission with a 25% referral fee is $2,250.00.
        assert_eq!(fee(30_000_000, 300, 2500), Some(Cents(225_000)));
    }

    #[test]
    fn test_missing_inputs_yield_none() {
        assert_eq!(
            derive_referral_fee(None, Some(BasisPoints(300)), Some(BasisPoints(2500))),
            None
        );
        assert_eq!(
            derive_referral_fee(Some(Cents(1)), None, Some(BasisPoints(2500))),
            None
        );
        assert_eq!(
            derive_referral_fee(Some(Cents(1)), Some(BasisPoints(1)), None),
            None
        );
    }

    #[test]
    fn test_zero_and_negative_inputs_yield_none() {
        assert_eq!(fee(0, 300, 2500), None);
        assert_eq!(fee(30_000_000, 0, 2500), None);
        assert_eq!(fee(30_000_000, 300, 0), None);
        assert_eq!(fee(-30_000_000, 300, 2500), None);
        assert_eq!(fee(30_000_000, -300, -2500), None);
    }

    #[test]
    fn test_rounds_half_up() {
        // 50_000_000 / 100_000_000 = 0.5 -> 1
        assert_eq!(fee(50_000_000, 1, 1), Some(Cents(1)));
        // 49_999_999 / 100_000_000 rounds to 0, which is not a usable fee.
        assert_eq!(fee(49_999_999, 1, 1), None);
        // 123_456_789 * 275 * 3000 / 1e8 = 1_018_518.50925 -> 1_018_519
        assert_eq!(fee(123_456_789, 275, 3000), Some(Cents(1_018_519)));
    }

    #[test]
    fn test_overflow_yields_none() {
        assert_eq!(fee(i64::MAX, i64::MAX, i64::MAX), None);
        assert_eq!(fee(i64::MAX, 10_000, 10_000), Some(Cents(i64::MAX)));
        assert_eq!(fee(i64::MAX, 10_000, 20_000), None);
    }

    #[test]
    fn test_matches_formula_across_grid() {
        for price in [1_i64, 99, 12_345_678, 75_000_000] {
            for commission in [1_i64, 250, 300, 600] {
                for referral_fee in [1_i64, 2500, 3500] {
                    let raw = i128::from(price) * i128::from(commission) * i128::from(referral_fee);
                    let expected = (raw + FEE_DIVISOR / 2) / FEE_DIVISOR;
                    let got = fee(price, commission, referral_fee);
                    if expected > 0 {
                        assert_eq!(got, Some(Cents(expected as i64)));
                    } else {
                        assert_eq!(got, None);
                    }
                }
            }
        }
    }

    #[test]
    fn test_pre_approval_fee() {
        // $350,000 at 1% is $3,500.00.
        assert_eq!(
            pre_approval_fee(Cents(35_000_000), BasisPoints(100)),
            Some(Cents(350_000))
        );
        assert_eq!(pre_approval_fee(Cents(0), BasisPoints(100)), None);
        assert_eq!(pre_approval_fee(Cents(35_000_000), BasisPoints(0)), None);
    }

    #[test]
    fn test_derive_from_terms() {
        let terms = ContractTerms::new(Cents(30_000_000), BasisPoints(300), BasisPoints(2500));
        assert_eq!(derive_from_terms(&terms), Some(Cents(225_000)));
        assert_eq!(derive_from_terms(&ContractTerms::default()), None);
    }
}
