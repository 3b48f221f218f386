// 💰 Aggregation - total wealth across active accounts
//
// Input comes from one latest-per-account store read
// (`db::latest_balances`), so the cost is one row per account no matter how
// long each history is.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::LatestBalance;

/// Sum of latest end balances of active accounts. Accounts with no history
/// count as 0, an empty set sums to 0.
pub fn total_wealth(latest: &[LatestBalance]) -> Decimal {
    latest
        .iter()
        .filter(|row| row.is_active)
        .map(|row| row.end_balance.unwrap_or(Decimal::ZERO))
        .sum()
}

/// Total plus the per-account rows it was built from.
#[derive(Debug, Clone, Serialize)]
pub struct WealthBreakdown {
    pub total_wealth: Decimal,
    pub accounts: Vec<LatestBalance>,
}

pub fn wealth_breakdown(latest: Vec<LatestBalance>) -> WealthBreakdown {
    let total_wealth = total_wealth(&latest);
    let accounts = latest.into_iter().filter(|row| row.is_active).collect();
    WealthBreakdown {
        total_wealth,
        accounts,
    }
}
