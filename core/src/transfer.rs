//! Two-party payment handshake over backend-issued offers.
//!
//! The requesting device creates an offer and renders its identifier as a
//! QR code; the paying device scans the identifier and submits it to the
//! finish endpoint. The QR payload is the bare identifier — amount and
//! currency are always resolved server-side, never trusted from the code
//! itself.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::api::client::ApiClient;
use crate::api::types::{
    OfferCancelRequest, OfferCreateRequest, OfferCreateResponse, OfferFinishRequest,
    StatusResponse,
};
use crate::currency::Currency;
use crate::errors::{WalletError, WalletResult};
use crate::validation::InputValidator;

/// A pending payment request created by this device.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOffer {
    /// Backend-issued opaque identifier; doubles as the full QR payload.
    pub offer_id: String,
    pub currency: Currency,
    pub amount: String,
    pub created_at: DateTime<Utc>,
}

/// Position in the offer workflow.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferState {
    Idle,
    Creating,
    DisplayingQr(TransferOffer),
    Cancelling,
    Finishing,
}

/// What happened to a scanned QR payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The offer was submitted and settled by the backend.
    Completed,
    /// Ignored: another scan was accepted within the debounce window.
    Debounced,
}

/// Notifications emitted as the workflow moves between states, for the
/// UI layer to surface as in-app notices.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    OfferCreated(TransferOffer),
    OfferCancelled { offer_id: String },
    PaymentSent { offer_id: String },
    OfferFailed { message: String },
}

type TransferListener = Arc<dyn Fn(&TransferEvent) + Send + Sync>;

struct Subscriber {
    id: Uuid,
    listener: TransferListener,
}

/// Handle returned by [`TransferWorkflow::subscribe`].
pub struct TransferSubscription {
    id: Uuid,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl TransferSubscription {
    pub fn unsubscribe(self) {
        self.subscribers.lock().retain(|s| s.id != self.id);
    }
}

struct WorkflowInner {
    state: Mutex<TransferState>,
    /// When the last scan was accepted; arms the debounce window.
    last_scan: Mutex<Option<Instant>>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    scan_debounce: Duration,
}

/// Orchestrates the create / cancel / scan-and-finish offer handshake.
#[derive(Clone)]
pub struct TransferWorkflow {
    client: Arc<ApiClient>,
    inner: Arc<WorkflowInner>,
}

impl TransferWorkflow {
    pub fn new(client: Arc<ApiClient>, scan_debounce: Duration) -> Self {
        Self {
            client,
            inner: Arc::new(WorkflowInner {
                state: Mutex::new(TransferState::Idle),
                last_scan: Mutex::new(None),
                subscribers: Arc::new(Mutex::new(Vec::new())),
                scan_debounce,
            }),
        }
    }

    pub fn state(&self) -> TransferState {
        self.inner.state.lock().clone()
    }

    /// Create a payment request and return the offer to display.
    ///
    /// The amount is validated before any network call; a rejection
    /// leaves the workflow untouched.
    pub async fn create_offer(
        &self,
        currency: Currency,
        amount: &str,
    ) -> WalletResult<TransferOffer> {
        InputValidator::shared().validate_amount(amount)?;
        self.transition_from_idle(TransferState::Creating, "create an offer")?;

        let request = OfferCreateRequest {
            iou: currency.to_string(),
            price: amount.trim().to_string(),
        };
        let result: WalletResult<OfferCreateResponse> = self
            .client
            .post("/api/transaction/offer/create", &request)
            .await;

        match result {
            Ok(response) if response.qr_code.trim().is_empty() => {
                *self.inner.state.lock() = TransferState::Idle;
                let error =
                    WalletError::InvalidResponse("Offer response carried no identifier".to_string());
                self.emit(TransferEvent::OfferFailed {
                    message: error.to_string(),
                });
                Err(error)
            }
            Ok(response) => {
                let offer = TransferOffer {
                    offer_id: response.qr_code,
                    currency,
                    amount: amount.trim().to_string(),
                    created_at: Utc::now(),
                };
                *self.inner.state.lock() = TransferState::DisplayingQr(offer.clone());
                self.emit(TransferEvent::OfferCreated(offer.clone()));
                Ok(offer)
            }
            Err(error) => {
                *self.inner.state.lock() = TransferState::Idle;
                self.emit(TransferEvent::OfferFailed {
                    message: error.to_string(),
                });
                Err(error)
            }
        }
    }

    /// Abort the currently displayed offer.
    ///
    /// The backend owns the cancel/finish race: a peer that already began
    /// finishing wins, and the cancel surfaces the backend's rejection.
    pub async fn cancel_offer(&self) -> WalletResult<()> {
        let offer = {
            let mut state = self.inner.state.lock();
            match state.clone() {
                TransferState::DisplayingQr(offer) => {
                    *state = TransferState::Cancelling;
                    offer
                }
                other => {
                    return Err(WalletError::InvalidState(format!(
                        "No offer to cancel in state {:?}",
                        other
                    )))
                }
            }
        };

        let request = OfferCancelRequest {
            uuid: offer.offer_id.clone(),
        };
        let result: WalletResult<StatusResponse> = self
            .client
            .post("/api/transaction/offer/cancel", &request)
            .await;

        match result {
            Ok(_) => {
                *self.inner.state.lock() = TransferState::Idle;
                self.emit(TransferEvent::OfferCancelled {
                    offer_id: offer.offer_id,
                });
                Ok(())
            }
            Err(error) => {
                // The QR stays visible so the user can retry or close it.
                *self.inner.state.lock() = TransferState::DisplayingQr(offer);
                Err(error)
            }
        }
    }

    /// Submit a scanned QR payload to settle the peer's offer.
    ///
    /// Repeated scans within the debounce window are ignored without a
    /// network call; the server stays the source of truth for
    /// idempotency.
    pub async fn scan_and_finish(&self, raw_payload: &str) -> WalletResult<ScanOutcome> {
        let offer_id = InputValidator::shared().validate_offer_payload(raw_payload)?;

        {
            let mut last_scan = self.inner.last_scan.lock();
            if let Some(accepted_at) = *last_scan {
                if accepted_at.elapsed() < self.inner.scan_debounce {
                    return Ok(ScanOutcome::Debounced);
                }
            }
            *last_scan = Some(Instant::now());
        }

        self.transition_from_idle(TransferState::Finishing, "finish an offer")?;

        let request = OfferFinishRequest {
            uuid: offer_id.clone(),
        };
        let result: WalletResult<StatusResponse> = self
            .client
            .post("/api/transaction/offer/finish", &request)
            .await;

        *self.inner.state.lock() = TransferState::Idle;
        match result {
            Ok(_) => {
                self.emit(TransferEvent::PaymentSent { offer_id });
                Ok(ScanOutcome::Completed)
            }
            Err(error) => {
                self.emit(TransferEvent::OfferFailed {
                    message: error.to_string(),
                });
                Err(error)
            }
        }
    }

    /// Register a callback for workflow events.
    pub fn subscribe<F>(&self, callback: F) -> TransferSubscription
    where
        F: Fn(&TransferEvent) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.inner.subscribers.lock().push(Subscriber {
            id,
            listener: Arc::new(callback),
        });
        TransferSubscription {
            id,
            subscribers: Arc::clone(&self.inner.subscribers),
        }
    }

    fn transition_from_idle(&self, next: TransferState, action: &str) -> WalletResult<()> {
        let mut state = self.inner.state.lock();
        if !matches!(*state, TransferState::Idle) {
            return Err(WalletError::InvalidState(format!(
                "Cannot {} while a transfer is in progress",
                action
            )));
        }
        *state = next;
        Ok(())
    }

    fn emit(&self, event: TransferEvent) {
        let listeners: Vec<TransferListener> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|s| s.listener.clone())
            .collect();

        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                log::error!("Transfer subscriber panicked during notification");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AuthHandle;

    fn unreachable_workflow(debounce: Duration) -> TransferWorkflow {
        let client = Arc::new(
            ApiClient::new(
                "http://127.0.0.1:1",
                Duration::from_millis(200),
                AuthHandle::default(),
            )
            .unwrap(),
        );
        TransferWorkflow::new(client, debounce)
    }

    #[tokio::test]
    async fn invalid_amount_is_rejected_before_any_state_change() {
        let workflow = unreachable_workflow(Duration::from_secs(2));

        let error = workflow
            .create_offer(Currency::Krw, "not-a-number")
            .await
            .expect_err("amount must be rejected");
        assert!(matches!(error, WalletError::InvalidAmount(_)));
        assert_eq!(workflow.state(), TransferState::Idle);
    }

    #[tokio::test]
    async fn failed_create_returns_to_idle_and_emits() {
        let workflow = unreachable_workflow(Duration::from_secs(2));
        let events = Arc::new(Mutex::new(Vec::new()));

        let captured = Arc::clone(&events);
        let _subscription = workflow.subscribe(move |event| {
            captured.lock().push(event.clone());
        });

        let error = workflow
            .create_offer(Currency::Krw, "5000")
            .await
            .expect_err("backend is unreachable");
        assert!(matches!(
            error,
            WalletError::NetworkError(_) | WalletError::ConnectionTimeout
        ));
        assert_eq!(workflow.state(), TransferState::Idle);

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], TransferEvent::OfferFailed { .. }));
    }

    #[tokio::test]
    async fn cancel_without_displayed_offer_is_an_invalid_state() {
        let workflow = unreachable_workflow(Duration::from_secs(2));
        let error = workflow
            .cancel_offer()
            .await
            .expect_err("nothing to cancel");
        assert!(matches!(error, WalletError::InvalidState(_)));
    }

    #[tokio::test]
    async fn rapid_rescan_is_debounced() {
        let workflow = unreachable_workflow(Duration::from_secs(2));

        let first = workflow.scan_and_finish("offer-123").await;
        assert!(first.is_err(), "backend is unreachable");

        // The second scan lands inside the window: no submission happens.
        let second = workflow.scan_and_finish("offer-123").await.unwrap();
        assert_eq!(second, ScanOutcome::Debounced);
        assert_eq!(workflow.state(), TransferState::Idle);
    }

    #[tokio::test]
    async fn retry_is_allowed_after_the_debounce_window() {
        let workflow = unreachable_workflow(Duration::from_millis(30));

        let first = workflow.scan_and_finish("offer-123").await;
        assert!(first.is_err());

        tokio::time::sleep(Duration::from_millis(60)).await;

        let second = workflow.scan_and_finish("offer-123").await;
        assert!(
            second.is_err(),
            "a fresh submission is attempted once the window passes"
        );
    }

    #[tokio::test]
    async fn structured_qr_payloads_are_rejected() {
        let workflow = unreachable_workflow(Duration::from_secs(2));

        let error = workflow
            .scan_and_finish(r#"{"offerId":"abc","amount":"5000"}"#)
            .await
            .expect_err("structured payloads are not trusted");
        assert!(matches!(error, WalletError::InvalidQrPayload(_)));
        assert_eq!(workflow.state(), TransferState::Idle);
    }

    #[tokio::test]
    #[ignore = "requires running backend at localhost:3000"]
    async fn offer_identifier_round_trips_through_scan() {
        let client = Arc::new(
            ApiClient::new(
                "http://localhost:3000",
                Duration::from_secs(30),
                AuthHandle::default(),
            )
            .unwrap(),
        );
        let creator = TransferWorkflow::new(Arc::clone(&client), Duration::from_secs(2));
        let payer = TransferWorkflow::new(client, Duration::from_secs(2));

        let offer = creator
            .create_offer(Currency::Krw, "5000")
            .await
            .expect("offer creation should succeed");
        assert!(!offer.offer_id.is_empty());

        // The identifier alone, whitespace and all, completes the flow.
        let outcome = payer
            .scan_and_finish(&format!(" {} ", offer.offer_id))
            .await
            .expect("finish should succeed");
        assert_eq!(outcome, ScanOutcome::Completed);
    }

    #[tokio::test]
    async fn scanned_payload_is_trimmed_before_submission() {
        let workflow = unreachable_workflow(Duration::from_secs(2));

        // Whitespace padding alone must not fail validation; the attempt
        // reaches the (unreachable) backend instead.
        let error = workflow
            .scan_and_finish("  offer-123  ")
            .await
            .expect_err("backend is unreachable");
        assert!(matches!(
            error,
            WalletError::NetworkError(_) | WalletError::ConnectionTimeout
        ));
    }
}
