use crate::args::AddArgs;
use crate::commands::Out;
use crate::model::{Candidate, Transaction};
use crate::{Config, Result};
use anyhow::Context;
use chrono::Local;

/// Validates the transaction described by `args` and appends it to the ledger. The date
/// defaults to today.
pub fn add(config: &Config, args: &AddArgs) -> Result<Out<Transaction>> {
    let date = match args.date() {
        Some(date) => date.to_string(),
        None => Local::now()
            .date_naive()
            .format(config.date_format())
            .to_string(),
    };
    let candidate = Candidate::new(
        date,
        args.amount(),
        args.category(),
        args.description().unwrap_or_default(),
    );

    let transaction = config
        .store()
        .append(&candidate)
        .context("Unable to add the transaction")?;

    Ok(Out::new(
        format!(
            "Added {} of {} in '{}' on {}",
            transaction.kind(),
            transaction.amount().to_money_string(),
            transaction.category(),
            transaction.date()
        ),
        transaction,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Kind;
    use crate::test::TestEnv;

    #[test]
    fn test_add() {
        let env = TestEnv::new();
        let args = AddArgs::new(
            "-$1,250.00",
            "Rent",
            Some("2024-03-01".into()),
            Some("March".into()),
        );
        let out = add(&env.config(), &args).unwrap();
        assert_eq!(out.message(), "Added expense of -$1,250.00 in 'Rent' on 2024-03-01");
        let transaction = out.structure().unwrap();
        assert_eq!(transaction.kind(), Kind::Expense);
        assert!(env.read_ledger().ends_with("\n2024-03-01,-1250.00,Rent,March\n"));
    }

    #[test]
    fn test_add_defaults_to_today() {
        let env = TestEnv::with_settings(5, "%d/%m/%Y");
        let out = add(&env.config(), &AddArgs::new("10", "Gift", None, None)).unwrap();
        let transaction = out.structure().unwrap();
        assert_eq!(transaction.date(), Local::now().date_naive());
        assert_eq!(transaction.description(), None);
    }

    #[test]
    fn test_add_rejects_empty_category() {
        let env = TestEnv::new();
        let before = env.read_ledger();
        let err = add(
            &env.config(),
            &AddArgs::new("-10", "  ", Some("2024-01-06".into()), None),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("category"), "{err:#}");
        assert_eq!(env.read_ledger(), before);
    }
}
