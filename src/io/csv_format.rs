//! CSV format handling for operation records and ledger output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvRecord structure for deserialization
//! - Conversion from CSV records to operations
//! - Wallet and ledger output serialization
//!
//! All functions are pure (no I/O) for easy testing.

use crate::types::{LedgerEntry, Operation, UserId, Wallet};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// CSV record structure for deserialization
///
/// Matches the input CSV format with columns: type, user, counterparty, amount.
/// `counterparty` is only read for transfers.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvRecord {
    #[serde(rename = "type")]
    pub op_type: String,
    pub user: UserId,
    pub counterparty: Option<UserId>,
    pub amount: Option<String>,
}

/// Convert a CsvRecord to an Operation
///
/// The amount is parsed but not validated here; the engine rejects
/// non-positive or over-precise amounts itself.
///
/// # Returns
///
/// * `Ok(Operation)` - Successfully converted record
/// * `Err(String)` - Error message describing the conversion failure
pub fn convert_csv_record(csv_record: CsvRecord) -> Result<Operation, String> {
    let amount = match csv_record.amount.as_deref().map(str::trim) {
        Some(amount_str) if !amount_str.is_empty() => Decimal::from_str(amount_str)
            .map_err(|_| {
                format!(
                    "Invalid amount '{}' for user {}",
                    amount_str, csv_record.user
                )
            })?,
        _ => {
            return Err(format!(
                "{} for user {} requires an amount",
                csv_record.op_type, csv_record.user
            ))
        }
    };

    match csv_record.op_type.to_lowercase().as_str() {
        "topup" => Ok(Operation::TopUp {
            user: csv_record.user,
            amount,
        }),
        "transfer" => {
            let receiver = csv_record.counterparty.ok_or_else(|| {
                format!(
                    "transfer from user {} requires a counterparty",
                    csv_record.user
                )
            })?;
            Ok(Operation::Transfer {
                sender: csv_record.user,
                receiver,
                amount,
            })
        }
        _ => Err(format!(
            "Invalid operation type: '{}' for user {}",
            csv_record.op_type, csv_record.user
        )),
    }
}

/// Write wallet balances to CSV format
///
/// Writes columns `user,balance`, sorted by user id, with two decimal places.
pub fn write_wallets_csv(wallets: &[Wallet], output: &mut dyn Write) -> Result<(), String> {
    let mut writer = csv::Writer::from_writer(output);

    writer
        .write_record(["user", "balance"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted_wallets = wallets.to_vec();
    sorted_wallets.sort_by_key(|wallet| wallet.user_id);

    for wallet in sorted_wallets {
        writer
            .write_record(&[wallet.user_id.to_string(), wallet.balance.to_string()])
            .map_err(|e| format!("Failed to write wallet record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))
}

/// Write ledger entries to CSV format
///
/// Writes columns `tx,sender_wallet,receiver_wallet,amount,status` in id
/// order. A missing side is written as an empty field.
pub fn write_ledger_csv(entries: &[LedgerEntry], output: &mut dyn Write) -> Result<(), String> {
    let mut writer = csv::Writer::from_writer(output);

    writer
        .write_record(["tx", "sender_wallet", "receiver_wallet", "amount", "status"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted_entries = entries.to_vec();
    sorted_entries.sort_by_key(|entry| entry.id);

    let side = |wallet_id: Option<i64>| wallet_id.map(|id| id.to_string()).unwrap_or_default();
    for entry in sorted_entries {
        writer
            .write_record(&[
                entry.id.to_string(),
                side(entry.sender_wallet_id),
                side(entry.receiver_wallet_id),
                entry.amount.to_string(),
                entry.status.to_string(),
            ])
            .map_err(|e| format!("Failed to write ledger record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Money, TransactionStatus};
    use chrono::Utc;
    use rstest::rstest;

    fn record(op_type: &str, counterparty: Option<UserId>, amount: Option<&str>) -> CsvRecord {
        CsvRecord {
            op_type: op_type.to_string(),
            user: 1,
            counterparty,
            amount: amount.map(|s| s.to_string()),
        }
    }

    fn wallet(user_id: UserId, cents: i64) -> Wallet {
        Wallet {
            id: user_id,
            balance: Money::from_minor_units(cents),
            ..Wallet::unopened(user_id)
        }
    }

    #[rstest]
    #[case::top_up("topup", None, Operation::TopUp { user: 1, amount: Decimal::new(1005, 1) })]
    #[case::case_insensitive("TopUp", None, Operation::TopUp { user: 1, amount: Decimal::new(1005, 1) })]
    #[case::top_up_ignores_counterparty("topup", Some(2), Operation::TopUp { user: 1, amount: Decimal::new(1005, 1) })]
    #[case::transfer("transfer", Some(2), Operation::Transfer { sender: 1, receiver: 2, amount: Decimal::new(1005, 1) })]
    fn test_convert_csv_record_valid(
        #[case] op_type: &str,
        #[case] counterparty: Option<UserId>,
        #[case] expected: Operation,
    ) {
        let operation = convert_csv_record(record(op_type, counterparty, Some(" 100.5 "))).unwrap();
        assert_eq!(operation, expected);
    }

    #[rstest]
    #[case::invalid_type("deposit", Some("100.0"), None, "Invalid operation type")]
    #[case::missing_amount("topup", None, None, "requires an amount")]
    #[case::empty_amount("topup", Some("  "), None, "requires an amount")]
    #[case::invalid_amount("topup", Some("ten"), None, "Invalid amount")]
    #[case::missing_counterparty("transfer", Some("5"), None, "requires a counterparty")]
    fn test_convert_csv_record_errors(
        #[case] op_type: &str,
        #[case] amount: Option<&str>,
        #[case] counterparty: Option<UserId>,
        #[case] expected_error: &str,
    ) {
        let err = convert_csv_record(record(op_type, counterparty, amount)).unwrap_err();
        assert!(err.contains(expected_error), "unexpected error: {err}");
    }

    #[test]
    fn test_negative_amount_left_to_engine() {
        let operation = convert_csv_record(record("topup", None, Some("-3"))).unwrap();
        assert_eq!(operation.amount(), Decimal::new(-3, 0));
    }

    #[rstest]
    #[case::empty(vec![], "user,balance\n")]
    #[case::two_decimals(vec![wallet(1, 10_050)], "user,balance\n1,100.50\n")]
    #[case::sorted_by_user(
        vec![wallet(3, 0), wallet(1, 1), wallet(2, 200)],
        "user,balance\n1,0.01\n2,2.00\n3,0.00\n"
    )]
    fn test_write_wallets_csv(#[case] wallets: Vec<Wallet>, #[case] expected_output: &str) {
        let mut output = Vec::new();
        write_wallets_csv(&wallets, &mut output).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), expected_output);
    }

    #[test]
    fn test_write_ledger_csv() {
        let now = Utc::now();
        let entries = vec![
            LedgerEntry {
                id: 2,
                sender_wallet_id: Some(1),
                receiver_wallet_id: Some(2),
                amount: Money::from_minor_units(2_500),
                status: TransactionStatus::Success,
                created_at: now,
                updated_at: now,
            },
            LedgerEntry {
                id: 1,
                sender_wallet_id: None,
                receiver_wallet_id: Some(1),
                amount: Money::from_minor_units(10_000),
                status: TransactionStatus::Success,
                created_at: now,
                updated_at: now,
            },
        ];

        let mut output = Vec::new();
        write_ledger_csv(&entries, &mut output).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "tx,sender_wallet,receiver_wallet,amount,status\n1,,1,100.00,success\n2,1,2,25.00,success\n"
        );
    }
}
