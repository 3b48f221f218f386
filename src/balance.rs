// ⚖️ Balance Engine
// Pure functions over an account's history ordered by (date asc, id asc).
//
// The balance is never an independent field: every entry stores the running
// total it produced, and each new end_balance is derived here from the
// previous one. Nothing in this module touches the store.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::entities::{Account, AccountHistory, EntryType, NewEntry};
use crate::error::{LedgerError, LedgerResult};

// ============================================================================
// DERIVED FIGURES
// ============================================================================

/// End balance of the chronologically last entry, 0 for an empty history.
///
/// `history` must already be ordered; this never re-sorts.
pub fn current_balance(history: &[AccountHistory]) -> Decimal {
    history
        .last()
        .map(|entry| entry.end_balance)
        .unwrap_or(Decimal::ZERO)
}

/// Per-entry change in end balance: LAG(end_balance, 1, 0) over (date, id).
pub fn compute_variation(history: &[AccountHistory]) -> Vec<Decimal> {
    let mut previous = Decimal::ZERO;
    history
        .iter()
        .map(|entry| {
            let variation = entry.end_balance.saturating_sub(previous);
            previous = entry.end_balance;
            variation
        })
        .collect()
}

/// Sum of the variations of Yield entries.
pub fn total_yield(history: &[AccountHistory]) -> Decimal {
    history
        .iter()
        .zip(compute_variation(history))
        .filter(|(entry, _)| entry.entry_type == EntryType::Yield)
        .fold(Decimal::ZERO, |total, (_, variation)| total.saturating_add(variation))
}

/// Order entries by (date, id) for callers holding unordered rows.
pub fn sort_history(history: &mut [AccountHistory]) {
    history.sort_by_key(AccountHistory::order_key);
}

// ============================================================================
// MONEY RANGE
// ============================================================================

/// Amounts are stored as numeric(12, 2).
pub const MONEY_DECIMAL_PLACES: u32 = 2;
pub const MONEY_INTEGER_DIGITS: u32 = 10;

/// Why `amount` does not fit a stored money column, if it does not.
///
/// Trailing zeros do not count: `1.500` is accepted as `1.5`.
pub fn money_range_violation(amount: Decimal) -> Option<&'static str> {
    if amount.normalize().scale() > MONEY_DECIMAL_PLACES {
        return Some("has more than 2 decimal places");
    }
    let limit = Decimal::from(10_i64.pow(MONEY_INTEGER_DIGITS));
    if amount.abs() >= limit {
        return Some("has more than 10 integer digits");
    }
    None
}

pub fn check_money(field: &'static str, amount: Decimal) -> LedgerResult<()> {
    match money_range_violation(amount) {
        Some(reason) => Err(LedgerError::AmountOutOfRange {
            field,
            amount,
            reason,
        }),
        None => Ok(()),
    }
}

// ============================================================================
// ADMISSION CONTROL
// ============================================================================

/// A proposed entry that passed every rule, with its derived end balance.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedEntry {
    pub account_id: i64,
    pub operation_amount: Decimal,
    pub end_balance: Decimal,
    pub entry_type: EntryType,
    pub date: NaiveDate,
    pub description: Option<String>,
}

/// Gate for caller-proposed entries. Rules run in order, first failure wins:
///
/// 1. account must be active
/// 2. Init / Closure / Reactivation are system-generated only
/// 3. Withdrawal must be strictly negative
/// 4. Contribution / Yield must be strictly positive
/// 5. amount must fit numeric(12, 2)
/// 6. resulting balance must not be negative, and must still fit
pub fn validate_proposed_entry(
    account: &Account,
    history: &[AccountHistory],
    proposed: &NewEntry,
) -> LedgerResult<ValidatedEntry> {
    if !account.accepts_entries() {
        return Err(LedgerError::InactiveAccount {
            account_id: account.id,
        });
    }

    let amount = proposed.operation_amount;
    match proposed.entry_type {
        EntryType::Init => {
            return Err(LedgerError::ForbiddenType {
                entry_type: EntryType::Init,
                hint: "the opening entry is generated when an account is created with an initial balance",
            })
        }
        EntryType::Closure => {
            return Err(LedgerError::ForbiddenType {
                entry_type: EntryType::Closure,
                hint: "use the close operation: POST /api/accounts/{id}/close",
            })
        }
        EntryType::Reactivation => {
            return Err(LedgerError::ForbiddenType {
                entry_type: EntryType::Reactivation,
                hint: "use the reactivate operation: POST /api/accounts/{id}/reactivate",
            })
        }
        EntryType::Withdrawal if amount >= Decimal::ZERO => {
            return Err(LedgerError::InvalidSign {
                entry_type: EntryType::Withdrawal,
                expected: "negative",
                amount,
            })
        }
        EntryType::Contribution | EntryType::Yield if amount <= Decimal::ZERO => {
            return Err(LedgerError::InvalidSign {
                entry_type: proposed.entry_type,
                expected: "positive",
                amount,
            })
        }
        _ => {}
    }

    check_money("value", amount)?;

    let current = current_balance(history);
    let end_balance = current
        .checked_add(amount)
        .ok_or(LedgerError::AmountOutOfRange {
            field: "value",
            amount,
            reason: "overflows the account balance",
        })?;
    if end_balance < Decimal::ZERO {
        return Err(LedgerError::InsufficientBalance { current, amount });
    }
    if money_range_violation(end_balance).is_some() {
        return Err(LedgerError::AmountOutOfRange {
            field: "value",
            amount,
            reason: "would take the balance past 10 integer digits",
        });
    }

    Ok(ValidatedEntry {
        account_id: account.id,
        operation_amount: amount,
        end_balance,
        entry_type: proposed.entry_type,
        date: proposed.date,
        description: proposed.description.clone(),
    })
}

/// New entries may not be dated before the latest one, otherwise their
/// (date, id) predecessor would differ from the entry their balance came from.
pub fn check_entry_date(
    account_id: i64,
    history: &[AccountHistory],
    date: NaiveDate,
) -> LedgerResult<()> {
    match history.last() {
        Some(latest) if date < latest.date => Err(LedgerError::OutOfOrderDate {
            account_id,
            date,
            latest: latest.date,
        }),
        _ => Ok(()),
    }
}

/// Date for system-generated markers: today, unless the history already
/// reaches further.
pub fn marker_date(history: &[AccountHistory], today: NaiveDate) -> NaiveDate {
    history
        .last()
        .map(|latest| latest.date.max(today))
        .unwrap_or(today)
}

// ============================================================================
// CONTINUITY
// ============================================================================

/// An entry whose stored end_balance disagrees with its predecessor + delta.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContinuityBreak {
    pub entry_id: i64,
    /// None when predecessor + delta is not representable
    pub expected: Option<Decimal>,
    pub actual: Decimal,
}

/// Check end_balance[n] == end_balance[n-1] + operation_amount[n] for the
/// whole ordered history.
pub fn verify_continuity(history: &[AccountHistory]) -> Result<(), Vec<ContinuityBreak>> {
    let mut previous = Decimal::ZERO;
    let mut breaks = Vec::new();

    for entry in history {
        let expected = previous.checked_add(entry.operation_amount);
        if expected != Some(entry.end_balance) {
            breaks.push(ContinuityBreak {
                entry_id: entry.id,
                expected,
                actual: entry.end_balance,
            });
        }
        previous = entry.end_balance;
    }

    if breaks.is_empty() {
        Ok(())
    } else {
        Err(breaks)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn create_test_account(is_active: bool) -> Account {
        Account {
            id: 1,
            name: "Savings".to_string(),
            is_active,
            version: 1,
            created_at: Utc::now(),
        }
    }

    /// Build a consistent ordered history from (day, type, amount) triples.
    fn build_history(ops: &[(u32, EntryType, Decimal)]) -> Vec<AccountHistory> {
        let mut balance = Decimal::ZERO;
        ops.iter()
            .enumerate()
            .map(|(i, (d, entry_type, amount))| {
                balance += *amount;
                AccountHistory {
                    id: i as i64 + 1,
                    account_id: 1,
                    operation_amount: *amount,
                    end_balance: balance,
                    entry_type: *entry_type,
                    date: day(*d),
                    description: None,
                }
            })
            .collect()
    }

    fn propose(entry_type: EntryType, amount: Decimal) -> NewEntry {
        NewEntry {
            account_id: 1,
            operation_amount: amount,
            entry_type,
            date: day(20),
            description: None,
        }
    }

    #[test]
    fn test_current_balance_empty_history_is_zero() {
        assert_eq!(current_balance(&[]), Decimal::ZERO);
        assert!(compute_variation(&[]).is_empty());
        assert_eq!(total_yield(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_same_day_entries_resolve_by_id() {
        let mut history = build_history(&[
            (5, EntryType::Contribution, dec!(100)),
            (5, EntryType::Withdrawal, dec!(-30)),
        ]);
        // Store order is irrelevant once sorted by (date, id)
        history.reverse();
        sort_history(&mut history);

        assert_eq!(compute_variation(&history), vec![dec!(100), dec!(-30)]);
        assert_eq!(current_balance(&history), dec!(70));
    }

    #[test]
    fn test_total_yield_sums_only_yield_variations() {
        let history = build_history(&[
            (1, EntryType::Init, dec!(100)),
            (2, EntryType::Yield, dec!(5)),
            (3, EntryType::Contribution, dec!(20)),
            (4, EntryType::Yield, dec!(3)),
        ]);

        assert_eq!(total_yield(&history), dec!(8));
        assert_eq!(current_balance(&history), dec!(128));
    }

    #[test]
    fn test_withdrawal_sign_enforcement() {
        let account = create_test_account(true);
        let history = build_history(&[(1, EntryType::Init, dec!(100))]);

        let err = validate_proposed_entry(&account, &history, &propose(EntryType::Withdrawal, dec!(50)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidSign { .. }));

        let ok = validate_proposed_entry(&account, &history, &propose(EntryType::Withdrawal, dec!(-50)))
            .unwrap();
        assert_eq!(ok.end_balance, dec!(50));
        assert_eq!(ok.operation_amount, dec!(-50));
    }

    #[test]
    fn test_zero_amounts_rejected() {
        let account = create_test_account(true);
        let history = build_history(&[(1, EntryType::Init, dec!(100))]);

        for entry_type in [EntryType::Withdrawal, EntryType::Contribution, EntryType::Yield] {
            let err = validate_proposed_entry(&account, &history, &propose(entry_type, dec!(0)))
                .unwrap_err();
            assert!(matches!(err, LedgerError::InvalidSign { .. }), "{entry_type}");
        }
    }

    #[test]
    fn test_positive_types_reject_negative_amounts() {
        let account = create_test_account(true);
        let err = validate_proposed_entry(&account, &[], &propose(EntryType::Yield, dec!(-1)))
            .unwrap_err();

        match err {
            LedgerError::InvalidSign { expected, .. } => assert_eq!(expected, "positive"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_insufficient_balance() {
        let account = create_test_account(true);
        let history = build_history(&[(1, EntryType::Init, dec!(20))]);

        let err = validate_proposed_entry(&account, &history, &propose(EntryType::Withdrawal, dec!(-30)))
            .unwrap_err();
        match err {
            LedgerError::InsufficientBalance { current, amount } => {
                assert_eq!(current, dec!(20));
                assert_eq!(amount, dec!(-30));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_overflowing_amount_is_an_error() {
        let account = create_test_account(true);
        let history = build_history(&[(1, EntryType::Init, dec!(1))]);

        let err = validate_proposed_entry(&account, &history, &propose(EntryType::Contribution, Decimal::MAX))
            .unwrap_err();
        match err {
            LedgerError::AmountOutOfRange { field, amount, .. } => {
                assert_eq!(field, "value");
                assert_eq!(amount, Decimal::MAX);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_amounts_limited_to_twelve_digits_two_places() {
        let account = create_test_account(true);
        let history = build_history(&[(1, EntryType::Init, dec!(100))]);

        for amount in [dec!(0.000001), dec!(0.001), dec!(123456789012445.990001), dec!(10000000000)] {
            let err = validate_proposed_entry(&account, &history, &propose(EntryType::Contribution, amount))
                .unwrap_err();
            assert!(matches!(err, LedgerError::AmountOutOfRange { .. }), "{amount}");
        }

        for amount in [dec!(0.01), dec!(1.500), dec!(9999999899.99)] {
            assert!(
                validate_proposed_entry(&account, &history, &propose(EntryType::Contribution, amount)).is_ok(),
                "{amount}"
            );
        }
    }

    #[test]
    fn test_balance_may_not_outgrow_money_column() {
        let account = create_test_account(true);
        let history = build_history(&[(1, EntryType::Init, dec!(9999999999.99))]);

        let err = validate_proposed_entry(&account, &history, &propose(EntryType::Yield, dec!(0.01)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::AmountOutOfRange { field: "value", .. }));
    }

    #[test]
    fn test_money_range_violation() {
        assert_eq!(money_range_violation(dec!(-9999999999.99)), None);
        assert_eq!(money_range_violation(dec!(12.340)), None);
        assert!(money_range_violation(dec!(12.345)).is_some());
        assert!(money_range_violation(dec!(-10000000000)).is_some());
        assert!(check_money("initial_value", Decimal::MAX).is_err());
    }

    #[test]
    fn test_system_types_are_forbidden_regardless_of_amount() {
        let account = create_test_account(true);
        let history = build_history(&[(1, EntryType::Init, dec!(100))]);

        for entry_type in [EntryType::Init, EntryType::Closure, EntryType::Reactivation] {
            for amount in [dec!(-10), dec!(0), dec!(10)] {
                let err = validate_proposed_entry(&account, &history, &propose(entry_type, amount))
                    .unwrap_err();
                assert!(matches!(err, LedgerError::ForbiddenType { .. }));
            }
        }
    }

    #[test]
    fn test_inactive_account_checked_first() {
        let account = create_test_account(false);

        // Would also fail ForbiddenType and InvalidSign, but inactivity wins
        let err = validate_proposed_entry(&account, &[], &propose(EntryType::Init, dec!(-5)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InactiveAccount { account_id: 1 }));
    }

    #[test]
    fn test_backdated_entry_rejected() {
        let history = build_history(&[(10, EntryType::Init, dec!(100))]);

        assert!(check_entry_date(1, &history, day(10)).is_ok());
        assert!(check_entry_date(1, &history, day(11)).is_ok());
        assert!(matches!(
            check_entry_date(1, &history, day(9)),
            Err(LedgerError::OutOfOrderDate { .. })
        ));
        assert!(check_entry_date(1, &[], day(1)).is_ok());
    }

    #[test]
    fn test_marker_date_never_precedes_latest_entry() {
        let history = build_history(&[(15, EntryType::Init, dec!(100))]);

        assert_eq!(marker_date(&history, day(10)), day(15));
        assert_eq!(marker_date(&history, day(20)), day(20));
        assert_eq!(marker_date(&[], day(3)), day(3));
    }

    #[test]
    fn test_verify_continuity_reports_breaks() {
        let mut history = build_history(&[
            (1, EntryType::Init, dec!(100)),
            (2, EntryType::Yield, dec!(5)),
            (3, EntryType::Withdrawal, dec!(-40)),
        ]);
        assert!(verify_continuity(&history).is_ok());

        // An edited row breaks the chain at that row only
        history[1].end_balance = dec!(110);
        let breaks = verify_continuity(&history).unwrap_err();
        assert_eq!(breaks.len(), 1);
        assert_eq!(breaks[0].entry_id, 2);
        assert_eq!(breaks[0].expected, Some(dec!(105)));
        assert_eq!(breaks[0].actual, dec!(110));
    }

    #[test]
    fn test_verify_continuity_survives_overflowing_rows() {
        let mut history = build_history(&[
            (1, EntryType::Init, dec!(100)),
            (2, EntryType::Contribution, dec!(5)),
        ]);
        history[0].end_balance = Decimal::MAX;
        history[1].operation_amount = Decimal::MAX;

        let breaks = verify_continuity(&history).unwrap_err();
        assert_eq!(breaks.len(), 2);
        assert_eq!(breaks[1].expected, None);

        // Derived figures saturate instead of panicking
        history[1].end_balance = Decimal::MIN;
        history[1].entry_type = EntryType::Yield;
        assert_eq!(total_yield(&history), Decimal::MIN);
    }

    fn op_strategy() -> impl Strategy<Value = (EntryType, i64)> {
        prop_oneof![
            (1i64..10_000).prop_map(|c| (EntryType::Contribution, c)),
            (1i64..500).prop_map(|c| (EntryType::Yield, c)),
            (1i64..10_000).prop_map(|c| (EntryType::Withdrawal, -c)),
        ]
    }

    proptest! {
        #[test]
        fn prop_admitted_histories_stay_continuous(ops in prop::collection::vec(op_strategy(), 0..40)) {
            let account = create_test_account(true);
            let mut history: Vec<AccountHistory> = Vec::new();

            for (i, (entry_type, cents)) in ops.into_iter().enumerate() {
                let proposed = NewEntry {
                    account_id: 1,
                    operation_amount: Decimal::new(cents, 2),
                    entry_type,
                    date: day(1 + (i as u32 % 28)).max(history.last().map(|h| h.date).unwrap_or(day(1))),
                    description: None,
                };
                if let Ok(valid) = validate_proposed_entry(&account, &history, &proposed) {
                    history.push(AccountHistory {
                        id: i as i64 + 1,
                        account_id: 1,
                        operation_amount: valid.operation_amount,
                        end_balance: valid.end_balance,
                        entry_type: valid.entry_type,
                        date: valid.date,
                        description: None,
                    });
                }
            }

            prop_assert!(verify_continuity(&history).is_ok());
            let sum: Decimal = history.iter().map(|h| h.operation_amount).sum();
            prop_assert_eq!(current_balance(&history), sum);
            prop_assert!(history.iter().all(|h| h.end_balance >= Decimal::ZERO));
            let variation_sum: Decimal = compute_variation(&history).into_iter().sum();
            prop_assert_eq!(variation_sum, sum);
        }
    }
}
