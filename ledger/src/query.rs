//! Sorting and pagination of ledger history.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use wallet_common::{Result, WalletError};

use crate::journal::LedgerEntry;

/// Default page size when the caller does not specify one.
pub const DEFAULT_LIMIT: u32 = 10;

/// Largest page a caller may request.
pub const MAX_LIMIT: u32 = 100;

/// Field a history page is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Entry timestamp (`occurred_at`). Wire name `date`.
    #[default]
    #[serde(rename = "date")]
    OccurredAt,
    /// Signed entry amount.
    Amount,
}

impl FromStr for SortKey {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "date" | "occurredAt" => Ok(SortKey::OccurredAt),
            "amount" => Ok(SortKey::Amount),
            other => Err(WalletError::validation(
                format!("Unknown sort key: {other}"),
                "sortBy",
            )),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::OccurredAt => write!(f, "date"),
            SortKey::Amount => write!(f, "amount"),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortDirection {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(WalletError::validation(
                format!("Unknown sort order: {other}"),
                "order",
            )),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

/// A page of history to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub skip: u64,
    pub limit: u32,
    pub sort_key: SortKey,
    pub direction: SortDirection,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_LIMIT,
            sort_key: SortKey::default(),
            direction: SortDirection::default(),
        }
    }
}

impl PageRequest {
    /// Create a page request.
    pub fn new(skip: u64, limit: u32, sort_key: SortKey, direction: SortDirection) -> Self {
        Self {
            skip,
            limit,
            sort_key,
            direction,
        }
    }

    /// Check `1 <= limit <= max_limit`.
    pub fn validate(&self, max_limit: u32) -> Result<()> {
        if self.limit == 0 || self.limit > max_limit {
            return Err(WalletError::validation(
                format!("Limit must be between 1 and {max_limit}"),
                "limit",
            ));
        }
        Ok(())
    }

    /// SQL `ORDER BY` clause for this page. Built from enums only.
    pub fn order_by_sql(&self) -> &'static str {
        match (self.sort_key, self.direction) {
            (SortKey::OccurredAt, SortDirection::Asc) => "occurred_at ASC, sequence ASC",
            (SortKey::OccurredAt, SortDirection::Desc) => "occurred_at DESC, sequence DESC",
            (SortKey::Amount, SortDirection::Asc) => "amount ASC, sequence ASC",
            (SortKey::Amount, SortDirection::Desc) => "amount DESC, sequence DESC",
        }
    }

    /// Compare two entries by this page's ordering.
    ///
    /// Ties on the sort key fall back to creation order in the same direction.
    pub fn compare(&self, a: &LedgerEntry, b: &LedgerEntry) -> Ordering {
        let ordering = match self.sort_key {
            SortKey::OccurredAt => a.occurred_at.cmp(&b.occurred_at),
            SortKey::Amount => a.amount.cmp(&b.amount),
        }
        .then_with(|| a.sequence.cmp(&b.sequence));

        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }

    /// Sort `entries` and cut out this page.
    pub fn apply(&self, mut entries: Vec<LedgerEntry>) -> Vec<LedgerEntry> {
        entries.sort_by(|a, b| self.compare(a, b));
        entries
            .into_iter()
            .skip(usize::try_from(self.skip).unwrap_or(usize::MAX))
            .take(self.limit as usize)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::NewEntry;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use wallet_common::AccountId;

    fn entries(amounts: &[Decimal]) -> Vec<LedgerEntry> {
        let account_id = AccountId::new();
        let at = chrono::Utc::now();
        amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| {
                let mut entry = LedgerEntry::record(
                    NewEntry::new(account_id, *amount, dec!(1000), "test").unwrap(),
                    i as u64 + 1,
                );
                // Identical timestamps force the tie-break.
                entry.occurred_at = at;
                entry
            })
            .collect()
    }

    #[test]
    fn test_parse_wire_names() {
        assert_eq!("date".parse::<SortKey>().unwrap(), SortKey::OccurredAt);
        assert_eq!("amount".parse::<SortKey>().unwrap(), SortKey::Amount);
        assert!("balance".parse::<SortKey>().is_err());
        assert_eq!("ASC".parse::<SortDirection>().unwrap(), SortDirection::Asc);
        assert!("sideways".parse::<SortDirection>().is_err());
    }

    #[test]
    fn test_limit_bounds() {
        let mut page = PageRequest::default();
        assert!(page.validate(MAX_LIMIT).is_ok());

        page.limit = 0;
        assert!(page.validate(MAX_LIMIT).is_err());

        page.limit = 101;
        assert!(page.validate(MAX_LIMIT).is_err());

        page.limit = 100;
        assert!(page.validate(MAX_LIMIT).is_ok());
    }

    #[test]
    fn test_tied_timestamps_follow_creation_order() {
        let history = entries(&[dec!(1), dec!(2), dec!(3)]);

        let asc = PageRequest::new(0, 10, SortKey::OccurredAt, SortDirection::Asc).apply(history.clone());
        assert_eq!(asc.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![1, 2, 3]);

        let desc = PageRequest::new(0, 10, SortKey::OccurredAt, SortDirection::Desc).apply(history);
        assert_eq!(desc.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![3, 2, 1]);
    }

    #[test]
    fn test_sort_by_amount() {
        let history = entries(&[dec!(5), dec!(-2), dec!(5), dec!(0)]);

        let page = PageRequest::new(0, 10, SortKey::Amount, SortDirection::Asc).apply(history);
        let keys: Vec<_> = page.iter().map(|e| (e.amount, e.sequence)).collect();
        assert_eq!(
            keys,
            vec![(dec!(-2), 2), (dec!(0), 4), (dec!(5), 1), (dec!(5), 3)]
        );
    }

    #[test]
    fn test_pages_have_no_gap_or_overlap() {
        let amounts: Vec<Decimal> = (1..=15).map(Decimal::from).collect();
        let history = entries(&amounts);

        let first = PageRequest::new(0, 10, SortKey::OccurredAt, SortDirection::Desc).apply(history.clone());
        let second = PageRequest::new(10, 10, SortKey::OccurredAt, SortDirection::Desc).apply(history);

        assert_eq!(first.len(), 10);
        assert_eq!(second.len(), 5);

        let mut seen: Vec<u64> = first.iter().chain(second.iter()).map(|e| e.sequence).collect();
        seen.sort_unstable();
        assert_eq!(seen, (1..=15).collect::<Vec<_>>());
    }

    #[test]
    fn test_skip_past_end_is_empty() {
        let history = entries(&[dec!(1)]);
        let page = PageRequest::new(50, 10, SortKey::OccurredAt, SortDirection::Desc).apply(history);
        assert!(page.is_empty());
    }
}
