//! Read-only access to accounts and their ledger.

use std::sync::Arc;

use tracing::{debug, instrument};

use wallet_common::{AccountId, Result};
use wallet_ledger::{Account, LedgerEntry, PageRequest, SharedStorage};

use crate::config::QueryConfig;
use crate::metrics::SharedMetrics;

/// Paginated, sorted history reads. Never mutates state.
#[derive(Clone)]
pub struct QueryService {
    storage: SharedStorage,
    config: QueryConfig,
    metrics: SharedMetrics,
}

impl QueryService {
    /// Create a query service over `storage`.
    pub fn new(storage: SharedStorage, config: QueryConfig, metrics: SharedMetrics) -> Self {
        Self {
            storage,
            config,
            metrics,
        }
    }

    /// Page size used when the caller gives none.
    pub fn default_limit(&self) -> u32 {
        self.config.default_limit
    }

    /// Largest page size accepted.
    pub fn max_limit(&self) -> u32 {
        self.config.max_limit
    }

    /// Fetch one account.
    pub async fn get_account(&self, account_id: &AccountId) -> Result<Account> {
        self.storage.get(account_id).await
    }

    /// One page of an account's entries.
    ///
    /// Fails with `Validation` for an out-of-range limit and `AccountNotFound`
    /// for an unknown account, before any entry is read.
    #[instrument(skip(self, page), fields(skip = page.skip, limit = page.limit))]
    pub async fn list_transactions(
        &self,
        account_id: &AccountId,
        page: &PageRequest,
    ) -> Result<Vec<LedgerEntry>> {
        page.validate(self.config.max_limit)?;
        self.storage.get(account_id).await?;

        let entries = self.storage.list_by_account(account_id, page).await?;
        self.metrics.query_served();

        debug!(
            returned = entries.len(),
            sort_by = %page.sort_key,
            order = %page.direction,
            "History page served"
        );
        Ok(entries)
    }
}

impl std::fmt::Debug for QueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryService")
            .field("backend", &self.storage.backend())
            .field("config", &self.config)
            .finish()
    }
}

/// Shared query service.
pub type SharedQueryService = Arc<QueryService>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use wallet_common::WalletError;
    use wallet_ledger::{CommitBatch, MemoryStorage, NewEntry, SortDirection, SortKey, Storage};

    use crate::metrics::Metrics;

    async fn seeded(extra: usize) -> (QueryService, AccountId) {
        let storage = Arc::new(MemoryStorage::new());
        let (account, _) = storage.open("Alice", dec!(0)).await.unwrap();

        let mut balance = Decimal::ZERO;
        for i in 1..=extra {
            let amount = Decimal::from(i as u64);
            let next = balance + amount;
            let entry = NewEntry::new(account.id, amount, next, "Deposit").unwrap();
            storage.commit(CommitBatch::new(balance, entry)).await.unwrap();
            balance = next;
        }

        let service = QueryService::new(storage, QueryConfig::default(), Arc::new(Metrics::new()));
        (service, account.id)
    }

    #[tokio::test]
    async fn test_pages_have_no_gap_or_overlap() {
        let (service, account_id) = seeded(14).await;

        let first = PageRequest::new(0, 10, SortKey::OccurredAt, SortDirection::Desc);
        let second = PageRequest::new(10, 10, SortKey::OccurredAt, SortDirection::Desc);

        let a = service.list_transactions(&account_id, &first).await.unwrap();
        let b = service.list_transactions(&account_id, &second).await.unwrap();
        assert_eq!(a.len(), 10);
        assert_eq!(b.len(), 5);

        let mut sequences: Vec<u64> = a.iter().chain(b.iter()).map(|e| e.sequence).collect();
        assert!(sequences.windows(2).all(|w| w[0] > w[1]));
        sequences.dedup();
        assert_eq!(sequences.len(), 15);
    }

    #[tokio::test]
    async fn test_sort_by_amount_ascending() {
        let (service, account_id) = seeded(4).await;
        let page = PageRequest::new(0, 10, SortKey::Amount, SortDirection::Asc);

        let amounts: Vec<Decimal> = service
            .list_transactions(&account_id, &page)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.amount)
            .collect();
        assert_eq!(amounts, vec![dec!(0), dec!(1), dec!(2), dec!(3), dec!(4)]);
    }

    #[tokio::test]
    async fn test_rejects_bad_limit_and_unknown_account() {
        let (service, account_id) = seeded(0).await;

        let too_big = PageRequest::new(0, 101, SortKey::OccurredAt, SortDirection::Desc);
        let err = service.list_transactions(&account_id, &too_big).await.unwrap_err();
        assert!(matches!(err, WalletError::Validation { .. }));

        let missing = AccountId::new();
        let page = PageRequest::new(0, 10, SortKey::OccurredAt, SortDirection::Desc);
        let err = service.list_transactions(&missing, &page).await.unwrap_err();
        assert_eq!(err, WalletError::AccountNotFound(missing));
    }

    #[tokio::test]
    async fn test_skip_past_end_is_empty() {
        let (service, account_id) = seeded(2).await;
        let page = PageRequest::new(50, 10, SortKey::OccurredAt, SortDirection::Desc);
        assert!(service.list_transactions(&account_id, &page).await.unwrap().is_empty());
    }
}
