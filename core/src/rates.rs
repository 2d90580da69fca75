//! Exchange-rate cache with periodic refresh and change notification.
//!
//! The service keeps one entry per ordered currency pair, replaced
//! wholesale on every refresh. Rate lookups never block and never fail;
//! when the backend is unreachable the table degrades to hardcoded
//! last-known-good defaults so the UI always has a value to show.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::interval;
use uuid::Uuid;

use crate::api::client::ApiClient;
use crate::api::types::{ConvertResponse, KrwToXrpRequest, XrpToKrwRequest};
use crate::currency::Currency;
use crate::errors::{WalletError, WalletResult};

/// A cached conversion factor for one ordered currency pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub from: Currency,
    pub to: Currency,
    /// `to`-units per one `from`-unit.
    pub rate: f64,
    /// Percentage change against the previously cached rate for this pair.
    pub change: f64,
    pub timestamp: DateTime<Utc>,
}

/// Where a conversion's rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSource {
    /// Quoted by the backend for this exact conversion.
    Live,
    /// Derived from the cached table because the backend was unreachable.
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionResult {
    pub rate: f64,
    pub converted_amount: f64,
    pub timestamp: DateTime<Utc>,
    pub source: RateSource,
}

type RateListener = Arc<dyn Fn(&[ExchangeRate]) + Send + Sync>;

struct Subscriber {
    id: Uuid,
    listener: RateListener,
}

/// Handle returned by [`ExchangeRateService::subscribe`].
///
/// Dropping the handle does not deregister; call
/// [`unsubscribe`](Self::unsubscribe).
pub struct RateSubscription {
    id: Uuid,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl RateSubscription {
    pub fn unsubscribe(self) {
        self.subscribers.lock().retain(|s| s.id != self.id);
    }
}

struct RateTable {
    rates: Vec<ExchangeRate>,
    /// Ticket of the refresh that installed the current table.
    installed_ticket: u64,
}

struct RateServiceInner {
    table: RwLock<RateTable>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    refresh_tickets: AtomicU64,
    timer: Mutex<Option<JoinHandle<()>>>,
    refresh_interval: Duration,
}

/// Cache of tracked exchange rates with periodic refresh and a
/// subscriber fan-out.
#[derive(Clone)]
pub struct ExchangeRateService {
    client: Arc<ApiClient>,
    inner: Arc<RateServiceInner>,
}

impl ExchangeRateService {
    pub fn new(client: Arc<ApiClient>, refresh_interval: Duration) -> Self {
        Self {
            client,
            inner: Arc::new(RateServiceInner {
                table: RwLock::new(RateTable {
                    rates: fallback_table(),
                    installed_ticket: 0,
                }),
                subscribers: Arc::new(Mutex::new(Vec::new())),
                refresh_tickets: AtomicU64::new(0),
                timer: Mutex::new(None),
                refresh_interval,
            }),
        }
    }

    /// Snapshot of the current rate table. Never blocks, never fails.
    pub fn get_all_rates(&self) -> Vec<ExchangeRate> {
        self.inner.table.read().rates.clone()
    }

    /// Cached rate for one pair; `0.0` means the pair is unknown.
    pub fn get_current_rate(&self, from: Currency, to: Currency) -> f64 {
        self.inner
            .table
            .read()
            .rates
            .iter()
            .find(|r| r.from == from && r.to == to)
            .map(|r| r.rate)
            .unwrap_or(0.0)
    }

    /// Convert `amount` using the freshest obtainable rate.
    ///
    /// Falls back to the cached rate on any failure; the result's
    /// `source` records which path produced it.
    pub async fn convert(&self, amount: f64, from: Currency, to: Currency) -> ConversionResult {
        match self.fetch_conversion(amount, from, to).await {
            Ok(result) => result,
            Err(error) => {
                log::warn!(
                    "Conversion request for {}->{} failed, using cached rate: {}",
                    from,
                    to,
                    error
                );
                let rate = self.get_current_rate(from, to);
                ConversionResult {
                    rate,
                    converted_amount: amount * rate,
                    timestamp: Utc::now(),
                    source: RateSource::Fallback,
                }
            }
        }
    }

    /// Re-fetch every tracked pair and replace the table atomically.
    ///
    /// A refresh that loses the race against a younger one is discarded,
    /// so subscribers never observe rates moving backwards in time.
    pub async fn refresh(&self) {
        let ticket = self.inner.refresh_tickets.fetch_add(1, Ordering::SeqCst) + 1;

        let (xrp_to_krw, krw_to_xrp) = tokio::join!(
            self.fetch_conversion(1.0, Currency::Xrp, Currency::Krw),
            self.fetch_conversion(1.0, Currency::Krw, Currency::Xrp),
        );

        let rates = match (xrp_to_krw, krw_to_xrp) {
            (Ok(xrp_to_krw), Ok(krw_to_xrp)) => {
                let previous_xrp_to_krw = self.get_current_rate(Currency::Xrp, Currency::Krw);
                let previous_krw_to_xrp = self.get_current_rate(Currency::Krw, Currency::Xrp);

                vec![
                    ExchangeRate {
                        from: Currency::Xrp,
                        to: Currency::Krw,
                        rate: xrp_to_krw.rate,
                        change: percentage_change(previous_xrp_to_krw, xrp_to_krw.rate),
                        timestamp: xrp_to_krw.timestamp,
                    },
                    ExchangeRate {
                        from: Currency::Krw,
                        to: Currency::Xrp,
                        rate: krw_to_xrp.rate,
                        change: percentage_change(previous_krw_to_xrp, krw_to_xrp.rate),
                        timestamp: krw_to_xrp.timestamp,
                    },
                ]
            }
            (xrp_result, krw_result) => {
                for error in [xrp_result.err(), krw_result.err()].into_iter().flatten() {
                    log::warn!("Rate refresh failed: {}", error);
                }
                fallback_table()
            }
        };

        if self.install(ticket, rates) {
            self.notify_subscribers();
        } else {
            log::debug!("Discarding stale rate refresh result");
        }
    }

    /// Register a callback invoked with the full snapshot after every
    /// completed refresh.
    pub fn subscribe<F>(&self, callback: F) -> RateSubscription
    where
        F: Fn(&[ExchangeRate]) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.inner.subscribers.lock().push(Subscriber {
            id,
            listener: Arc::new(callback),
        });
        RateSubscription {
            id,
            subscribers: Arc::clone(&self.inner.subscribers),
        }
    }

    /// Start the periodic refresh task, restarting any previous one.
    ///
    /// The first refresh fires immediately, then once per configured
    /// period. Must be called from within a Tokio runtime.
    pub fn start_auto_update(&self) {
        let mut slot = self.inner.timer.lock();
        if let Some(handle) = slot.take() {
            handle.abort();
        }

        let service = self.clone();
        let period = self.inner.refresh_interval;
        *slot = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                service.refresh().await;
            }
        }));
    }

    /// Stop the periodic refresh task. No-op when not running.
    pub fn stop_auto_update(&self) {
        if let Some(handle) = self.inner.timer.lock().take() {
            handle.abort();
        }
    }

    pub fn is_auto_updating(&self) -> bool {
        self.inner
            .timer
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Ask the backend to convert `amount` and derive the effective rate.
    async fn fetch_conversion(
        &self,
        amount: f64,
        from: Currency,
        to: Currency,
    ) -> WalletResult<ConversionResult> {
        let response: ConvertResponse = match (from, to) {
            (Currency::Krw, Currency::Xrp) => {
                self.client
                    .post(
                        "/api/transaction/convert/krw-to-xrp",
                        &KrwToXrpRequest { krw_amount: amount },
                    )
                    .await?
            }
            (Currency::Xrp, Currency::Krw) => {
                self.client
                    .post(
                        "/api/transaction/convert/xrp-to-krw",
                        &XrpToKrwRequest { xrp_amount: amount },
                    )
                    .await?
            }
            _ => {
                return Err(WalletError::ValidationError(format!(
                    "No conversion endpoint for {} to {}",
                    from, to
                )))
            }
        };

        Ok(self.resolve_conversion(amount, from, to, response))
    }

    /// Apply the explicit fallback rules for optional response fields.
    fn resolve_conversion(
        &self,
        amount: f64,
        from: Currency,
        to: Currency,
        response: ConvertResponse,
    ) -> ConversionResult {
        let amount_of = |currency: Currency| match currency {
            Currency::Krw => response.krw_amount,
            Currency::Xrp => response.xrp_amount,
            Currency::Usd => None,
        };

        let (rate, converted_amount) = match (amount_of(from), amount_of(to)) {
            (Some(from_amount), Some(to_amount)) if from_amount != 0.0 => {
                let rate = to_amount / from_amount;
                (rate, amount * rate)
            }
            _ => {
                let rate = response
                    .rate
                    .unwrap_or_else(|| self.get_current_rate(from, to));
                let converted = response.converted_amount.unwrap_or(amount * rate);
                (rate, converted)
            }
        };

        ConversionResult {
            rate,
            converted_amount,
            timestamp: Utc::now(),
            source: RateSource::Live,
        }
    }

    fn install(&self, ticket: u64, rates: Vec<ExchangeRate>) -> bool {
        let mut table = self.inner.table.write();
        if ticket <= table.installed_ticket {
            return false;
        }
        table.rates = rates;
        table.installed_ticket = ticket;
        true
    }

    fn notify_subscribers(&self) {
        let snapshot = self.get_all_rates();
        let listeners: Vec<RateListener> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|s| s.listener.clone())
            .collect();

        for listener in listeners {
            // A panicking subscriber must not starve the ones behind it.
            if panic::catch_unwind(AssertUnwindSafe(|| listener(&snapshot))).is_err() {
                log::error!("Rate subscriber panicked during notification");
            }
        }
    }
}

/// Last-known-good defaults shown when the rate source is unreachable.
fn fallback_table() -> Vec<ExchangeRate> {
    let now = Utc::now();
    vec![
        ExchangeRate {
            from: Currency::Xrp,
            to: Currency::Krw,
            rate: 4162.0,
            change: 0.0,
            timestamp: now,
        },
        ExchangeRate {
            from: Currency::Krw,
            to: Currency::Xrp,
            rate: 0.000_240_38, // 1/4162
            change: 0.0,
            timestamp: now,
        },
    ]
}

fn percentage_change(previous: f64, current: f64) -> f64 {
    if previous > 0.0 {
        (((current - previous) / previous) * 100.0 * 100.0).round() / 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AuthHandle;
    use std::sync::atomic::AtomicUsize;

    fn unreachable_service() -> ExchangeRateService {
        let client = Arc::new(
            ApiClient::new(
                "http://127.0.0.1:1",
                Duration::from_millis(200),
                AuthHandle::default(),
            )
            .unwrap(),
        );
        ExchangeRateService::new(client, Duration::from_secs(30))
    }

    #[test]
    fn starts_with_nonempty_fallback_table() {
        let service = unreachable_service();
        let rates = service.get_all_rates();
        assert!(!rates.is_empty());
        assert!(rates.iter().all(|r| r.rate > 0.0));
    }

    #[test]
    fn unknown_pair_rate_is_zero() {
        let service = unreachable_service();
        assert_eq!(service.get_current_rate(Currency::Usd, Currency::Krw), 0.0);
    }

    #[test]
    fn tracked_pair_rate_is_positive() {
        let service = unreachable_service();
        assert!(service.get_current_rate(Currency::Xrp, Currency::Krw) > 0.0);
    }

    #[tokio::test]
    async fn convert_falls_back_when_backend_unreachable() {
        let service = unreachable_service();
        let cached = service.get_current_rate(Currency::Krw, Currency::Xrp);

        let result = service.convert(100.0, Currency::Krw, Currency::Xrp).await;
        assert_eq!(result.source, RateSource::Fallback);
        assert_eq!(result.rate, cached);
        assert_eq!(result.converted_amount, 100.0 * cached);
    }

    #[tokio::test]
    async fn failed_refresh_installs_fallback_and_notifies() {
        let service = unreachable_service();
        let notifications = Arc::new(Mutex::new(Vec::new()));

        let captured = Arc::clone(&notifications);
        let _subscription = service.subscribe(move |rates| {
            captured.lock().push(rates.to_vec());
        });

        service.refresh().await;

        let notifications = notifications.lock();
        assert_eq!(notifications.len(), 1);
        let snapshot = &notifications[0];
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|r| r.rate > 0.0 && r.change == 0.0));
    }

    #[tokio::test]
    async fn unsubscribe_stops_notifications() {
        let service = unreachable_service();
        let first_count = Arc::new(AtomicUsize::new(0));
        let second_count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&first_count);
        let first = service.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&second_count);
        let _second = service.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        service.refresh().await;
        first.unsubscribe();
        service.refresh().await;

        assert_eq!(first_count.load(Ordering::SeqCst), 1);
        assert_eq!(second_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_subscriber_does_not_block_the_rest() {
        let service = unreachable_service();
        let delivered = Arc::new(AtomicUsize::new(0));

        let _panicky = service.subscribe(|_| {
            panic!("subscriber failure");
        });
        let counter = Arc::clone(&delivered);
        let _healthy = service.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        service.refresh().await;
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_refresh_results_are_discarded() {
        let service = unreachable_service();

        assert!(service.install(2, fallback_table()));
        let newer = service.get_all_rates();

        let mut stale = fallback_table();
        stale[0].rate = 9999.0;
        assert!(!service.install(1, stale));

        assert_eq!(service.get_all_rates(), newer);
    }

    #[tokio::test]
    async fn restarting_auto_update_keeps_a_single_timer() {
        let service = unreachable_service();

        service.start_auto_update();
        service.start_auto_update();
        assert!(service.is_auto_updating());

        service.stop_auto_update();
        assert!(!service.is_auto_updating());

        // Second stop is a no-op.
        service.stop_auto_update();
        assert!(!service.is_auto_updating());
    }

    #[test]
    fn reciprocal_fallback_rates_are_consistent() {
        let service = unreachable_service();
        let product = service.get_current_rate(Currency::Xrp, Currency::Krw)
            * service.get_current_rate(Currency::Krw, Currency::Xrp);
        // The two directions come from separate quotes, so the product is
        // only approximately 1.
        assert!((product - 1.0).abs() < 0.01, "product was {}", product);
    }

    #[test]
    fn percentage_change_rounds_to_two_decimals() {
        assert_eq!(percentage_change(100.0, 101.0), 1.0);
        assert_eq!(percentage_change(3.0, 4.0), 33.33);
        assert_eq!(percentage_change(0.0, 4.0), 0.0);
    }

    #[test]
    fn resolve_conversion_prefers_paired_amounts() {
        let service = unreachable_service();
        let response = ConvertResponse {
            krw_amount: Some(4000.0),
            xrp_amount: Some(1.0),
            rate: Some(12345.0),
            converted_amount: None,
        };

        let result =
            service.resolve_conversion(2.0, Currency::Xrp, Currency::Krw, response);
        assert_eq!(result.rate, 4000.0);
        assert_eq!(result.converted_amount, 8000.0);
        assert_eq!(result.source, RateSource::Live);
    }

    #[test]
    fn resolve_conversion_falls_back_to_reported_rate() {
        let service = unreachable_service();
        let response = ConvertResponse {
            krw_amount: None,
            xrp_amount: None,
            rate: Some(4100.0),
            converted_amount: None,
        };

        let result =
            service.resolve_conversion(2.0, Currency::Xrp, Currency::Krw, response);
        assert_eq!(result.rate, 4100.0);
        assert_eq!(result.converted_amount, 8200.0);
    }
}
