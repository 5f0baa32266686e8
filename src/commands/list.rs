use crate::args::ListArgs;
use crate::commands::Out;
use crate::model::Transaction;
use crate::{Config, Result};
use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;

/// The transactions returned by `ledger list`.
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub transactions: Vec<Transaction>,
}

/// Lists the transactions dated from `--from` through `--to`. A missing bound is open. Both
/// bounds use the same date format as `ledger add`.
pub fn list(config: &Config, args: &ListArgs) -> Result<Out<Listing>> {
    let start = parse_bound(config, args.start())?.unwrap_or(NaiveDate::MIN);
    let end = parse_bound(config, args.end())?.unwrap_or(NaiveDate::MAX);
    let transactions = config
        .store()
        .query_by_date_range(start, end)
        .context("Unable to load the ledger")?;

    let mut message = format!("{} transaction(s)", transactions.len());
    for t in &transactions {
        message.push_str(&format!(
            "\n{}  {:>14}  {}",
            t.date(),
            t.amount().to_money_string(),
            t.category()
        ));
        if let Some(description) = t.description() {
            message.push_str(&format!("  {description}"));
        }
    }
    Ok(Out::new(message, Listing { transactions }))
}

fn parse_bound(config: &Config, value: Option<&str>) -> Result<Option<NaiveDate>> {
    value
        .map(|v| {
            NaiveDate::parse_from_str(v.trim(), config.date_format()).with_context(|| {
                format!(
                    "Invalid date '{v}', expected the format '{}'",
                    config.date_format()
                )
            })
        })
        .transpose()
}
