use std::sync::Arc;

use crate::api::client::ApiClient;
use crate::api::types::{BalanceResponse, TransactionRecord};
use crate::errors::WalletResult;

/// Direction of a settled transaction relative to this wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Sent,
    Received,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Completed,
    Failed,
}

/// A past transaction shaped for display.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub direction: TransferDirection,
    pub status: TransactionStatus,
    pub amount: f64,
    pub price: f64,
    pub currency: String,
    pub date: String,
}

impl From<TransactionRecord> for HistoryEntry {
    fn from(record: TransactionRecord) -> Self {
        Self {
            direction: if record.is_receiver {
                TransferDirection::Received
            } else {
                TransferDirection::Sent
            },
            status: if record.is_success {
                TransactionStatus::Completed
            } else {
                TransactionStatus::Failed
            },
            amount: record.amount,
            price: record.price,
            currency: record.iou,
            date: record.transaction_date,
        }
    }
}

/// Read-side queries against the wallet's backend account.
#[derive(Clone)]
pub struct WalletService {
    client: Arc<ApiClient>,
}

impl WalletService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// Per-currency balances for the authenticated account.
    pub async fn get_balance(&self) -> WalletResult<BalanceResponse> {
        self.client.get("/api/wallet/balance").await
    }

    /// One page of past transactions, newest first.
    pub async fn get_history(&self, page: u32, size: u32) -> WalletResult<Vec<HistoryEntry>> {
        let records: Vec<TransactionRecord> = self
            .client
            .get_with_query("/api/transaction/history", &[("page", page), ("size", size)])
            .await?;
        Ok(records.into_iter().map(HistoryEntry::from).collect())
    }
}
