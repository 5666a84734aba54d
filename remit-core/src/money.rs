use rust_decimal::Decimal;

/// Monetary amount in platform currency units.
pub type Amount = Decimal;

/// Whether the amount is expressed in whole currency units.
///
/// Withdrawals are restricted to whole units; sub-unit amounts are
/// rejected at validation time.
pub fn is_whole_units(amount: Amount) -> bool {
    amount == amount.trunc()
}
