use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Cents;

/// How an amount that does not divide evenly is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitPolicy {
    /// Everyone owes `amount / N` truncated to the cent. Shares can sum to up
    /// to `N - 1` cents less than the amount.
    Equal,
    /// As `Equal`, then the first `amount % N` members owe one extra cent so
    /// the shares always sum to the amount.
    #[default]
    Remainder,
}

impl FromStr for SplitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equal" => Ok(Self::Equal),
            "remainder" => Ok(Self::Remainder),
            other => Err(format!("unknown split policy '{}'", other)),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SplitError {
    #[error("Please select at least one member")]
    EmptySelection,
    #[error("Amount must be greater than zero")]
    NonPositiveAmount,
}

/// One member's share of an expense, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentDraft<M> {
    pub member: M,
    pub amount: Cents,
    pub paid: bool,
}

/// Split `amount` across `members`, one unpaid draft per member in the order given.
pub fn split_amount<M: Clone>(
    amount: Cents,
    members: &[M],
    policy: SplitPolicy,
) -> Result<Vec<PaymentDraft<M>>, SplitError> {
    if members.is_empty() {
        return Err(SplitError::EmptySelection);
    }
    if !amount.is_positive() {
        return Err(SplitError::NonPositiveAmount);
    }

    let count = members.len() as i64;
    let base = amount.0 / count;
    let remainder = match policy {
        SplitPolicy::Equal => 0,
        SplitPolicy::Remainder => amount.0 % count,
    };

    Ok(members
        .iter()
        .enumerate()
        .map(|(i, member)| PaymentDraft {
            member: member.clone(),
            amount: Cents(base + i64::from((i as i64) < remainder)),
            paid: false,
        })
        .collect())
}

/// Drop repeated members, keeping the first occurrence of each.
pub fn dedup_members<M: PartialEq + Clone>(members: &[M]) -> Vec<M> {
    let mut unique: Vec<M> = Vec::with_capacity(members.len());
    for m in members {
        if !unique.contains(m) {
            unique.push(m.clone());
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(drafts: &[PaymentDraft<&str>]) -> Cents {
        drafts.iter().map(|d| d.amount).sum()
    }

    #[test]
    fn test_one_unpaid_draft_per_member() {
        let members = ["ana", "bo", "cy", "di"];
        for n in 1..=members.len() {
            let drafts = split_amount(Cents(10_000), &members[..n], SplitPolicy::Equal).unwrap();
            assert_eq!(drafts.len(), n);
            assert!(drafts.iter().all(|d| !d.paid));
            assert!(drafts.iter().all(|d| d.amount == Cents(10_000 / n as i64)));
            let order: Vec<_> = drafts.iter().map(|d| d.member).collect();
            assert_eq!(order, &members[..n]);
        }
    }

    #[test]
    fn test_equal_policy_keeps_known_shortfall() {
        let drafts = split_amount(Cents(1000), &["a", "b", "c"], SplitPolicy::Equal).unwrap();
        assert!(drafts.iter().all(|d| d.amount == Cents(333)));
        assert_eq!(total(&drafts), Cents(999));
        assert_eq!(total(&drafts).to_string(), "9.99");
    }

    #[test]
    fn test_remainder_policy_sums_exactly() {
        let drafts = split_amount(Cents(1000), &["a", "b", "c"], SplitPolicy::Remainder).unwrap();
        let amounts: Vec<_> = drafts.iter().map(|d| d.amount.0).collect();
        assert_eq!(amounts, vec![334, 333, 333]);
        assert_eq!(total(&drafts), Cents(1000));

        for amount in [1, 2, 99, 101, 12_345, 1_000_001] {
            for n in 1..=7 {
                let members: Vec<&str> = ["a", "b", "c", "d", "e", "f", "g"][..n].to_vec();
                let drafts = split_amount(Cents(amount), &members, SplitPolicy::Remainder).unwrap();
                assert_eq!(total(&drafts), Cents(amount));
                let max = drafts.iter().map(|d| d.amount.0).max().unwrap();
                let min = drafts.iter().map(|d| d.amount.0).min().unwrap();
                assert!(max - min <= 1);
            }
        }
    }

    #[test]
    fn test_even_division_is_exact_under_both_policies() {
        for policy in [SplitPolicy::Equal, SplitPolicy::Remainder] {
            let drafts = split_amount(Cents(900), &["a", "b", "c"], policy).unwrap();
            assert_eq!(total(&drafts), Cents(900));
        }
    }

    #[test]
    fn test_rejects_empty_and_non_positive() {
        let none: [&str; 0] = [];
        assert_eq!(
            split_amount(Cents(100), &none, SplitPolicy::Equal),
            Err(SplitError::EmptySelection)
        );
        assert_eq!(
            split_amount(Cents(0), &["a"], SplitPolicy::Equal),
            Err(SplitError::NonPositiveAmount)
        );
    }

    #[test]
    fn test_dedup_members_keeps_first_occurrence() {
        assert_eq!(dedup_members(&["b", "a", "b", "c", "a"]), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("Equal".parse::<SplitPolicy>(), Ok(SplitPolicy::Equal));
        assert_eq!(" remainder ".parse::<SplitPolicy>(), Ok(SplitPolicy::Remainder));
        assert!("fair".parse::<SplitPolicy>().is_err());
    }
}
