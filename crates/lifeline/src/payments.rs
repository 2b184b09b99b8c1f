//! Donation payments processed off the request path.
//!
//! [`PaymentProcessor::submit`] validates the request and hands back a [`PaymentTicket`] in
//! the `Processing` state straight away. The gateway call runs on a blocking task and the
//! terminal state is published through a watch channel that both the ticket and
//! [`PaymentProcessor::status`] observe.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::registry::{RequestId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub u64);

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "payment-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    BankTransfer,
    MobileWallet,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// A donation towards the registry, optionally earmarked for one recipient request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub payer: UserId,
    pub amount_cents: u64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub method: PaymentMethod,
    #[serde(default)]
    pub request_id: Option<RequestId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub payment_id: PaymentId,
    pub reference: String,
    pub amount_cents: u64,
    pub currency: String,
    pub processed_at: DateTime<Utc>,
}

/// Observable progress of a payment: `Processing`, then exactly one terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PaymentState {
    Processing,
    Succeeded { receipt: PaymentReceipt },
    Failed { reason: String },
}

impl PaymentState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentState::Processing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("charge declined: {0}")]
    Declined(String),
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
}

/// Outbound boundary to the card processor. Calls may block.
pub trait PaymentGateway: Send + Sync + 'static {
    /// Charge the payer and return the processor's reference on success.
    fn charge(&self, id: PaymentId, request: &PaymentRequest) -> Result<String, GatewayError>;
}

/// Gateway used by the service binary and the demo: sleeps for `latency` and declines
/// charges above `per_charge_limit_cents`.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    latency: Duration,
    per_charge_limit_cents: u64,
}

impl SimulatedGateway {
    pub fn new(latency: Duration, per_charge_limit_cents: u64) -> Self {
        Self {
            latency,
            per_charge_limit_cents,
        }
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), 1_000_000)
    }
}

impl PaymentGateway for SimulatedGateway {
    fn charge(&self, id: PaymentId, request: &PaymentRequest) -> Result<String, GatewayError> {
        std::thread::sleep(self.latency);
        if request.amount_cents > self.per_charge_limit_cents {
            return Err(GatewayError::Declined(format!(
                "amount exceeds the per-charge limit of {} cents",
                self.per_charge_limit_cents
            )));
        }
        Ok(format!("sim-{:06}", id.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    #[error("payment amount must be greater than zero")]
    InvalidAmount,
    #[error("{field} must not be blank")]
    BlankField { field: &'static str },
    #[error("payments can only be submitted from within a tokio runtime")]
    NoRuntime,
}

/// Handle returned by [`PaymentProcessor::submit`].
#[derive(Debug)]
pub struct PaymentTicket {
    id: PaymentId,
    receiver: watch::Receiver<PaymentState>,
}

impl PaymentTicket {
    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn current(&self) -> PaymentState {
        self.receiver.borrow().clone()
    }

    /// Resolve once the payment reaches a terminal state.
    pub async fn wait(mut self) -> PaymentState {
        loop {
            let state = self.receiver.borrow_and_update().clone();
            if state.is_terminal() {
                return state;
            }
            if self.receiver.changed().await.is_err() {
                let state = self.receiver.borrow().clone();
                if state.is_terminal() {
                    return state;
                }
                return PaymentState::Failed {
                    reason: "payment task ended without a result".to_string(),
                };
            }
        }
    }
}

/// Settled payments kept queryable by [`PaymentProcessor::new`].
pub const DEFAULT_RETAINED_PAYMENTS: usize = 10_000;

pub struct PaymentProcessor<G> {
    gateway: Arc<G>,
    next_id: AtomicU64,
    retention: usize,
    payments: RwLock<BTreeMap<PaymentId, watch::Receiver<PaymentState>>>,
}

impl<G: PaymentGateway> PaymentProcessor<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self::with_retention(gateway, DEFAULT_RETAINED_PAYMENTS)
    }

    /// Track at most `retention` payments. Once over the limit the oldest settled payments
    /// are forgotten; payments still processing are always kept.
    pub fn with_retention(gateway: Arc<G>, retention: usize) -> Self {
        Self {
            gateway,
            next_id: AtomicU64::new(1),
            retention,
            payments: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn submit(&self, request: PaymentRequest) -> Result<PaymentTicket, PaymentError> {
        let request = validate(request)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| PaymentError::NoRuntime)?;

        let id = PaymentId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = watch::channel(PaymentState::Processing);
        self.track(id, receiver.clone());

        info!(
            payment = %id,
            payer = %request.payer,
            amount_cents = request.amount_cents,
            "payment processing"
        );
        let gateway = Arc::clone(&self.gateway);
        runtime.spawn_blocking(move || {
            let state = match gateway.charge(id, &request) {
                Ok(reference) => {
                    info!(payment = %id, %reference, "payment succeeded");
                    PaymentState::Succeeded {
                        receipt: PaymentReceipt {
                            payment_id: id,
                            reference,
                            amount_cents: request.amount_cents,
                            currency: request.currency,
                            processed_at: Utc::now(),
                        },
                    }
                }
                Err(error) => {
                    warn!(payment = %id, %error, "payment failed");
                    PaymentState::Failed {
                        reason: error.to_string(),
                    }
                }
            };
            sender.send_replace(state);
        });

        Ok(PaymentTicket { id, receiver })
    }

    fn track(&self, id: PaymentId, receiver: watch::Receiver<PaymentState>) {
        let mut payments = self.payments.write().unwrap_or_else(PoisonError::into_inner);
        payments.insert(id, receiver);

        let excess = payments.len().saturating_sub(self.retention);
        if excess == 0 {
            return;
        }
        let evicted: Vec<PaymentId> = payments
            .iter()
            .filter(|(_, state)| state.borrow().is_terminal())
            .map(|(settled, _)| *settled)
            .take(excess)
            .collect();
        for settled in &evicted {
            payments.remove(settled);
        }
        debug!(evicted = evicted.len(), tracked = payments.len(), "settled payments evicted");
    }

    /// Latest known state, or `None` for an id this processor never issued or has
    /// since evicted.
    pub fn status(&self, id: PaymentId) -> Option<PaymentState> {
        self.payments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|receiver| receiver.borrow().clone())
    }
}

fn validate(mut request: PaymentRequest) -> Result<PaymentRequest, PaymentError> {
    if request.amount_cents == 0 {
        return Err(PaymentError::InvalidAmount);
    }
    if request.payer.as_str().trim().is_empty() {
        return Err(PaymentError::BlankField { field: "payer" });
    }
    let currency = request.currency.trim().to_ascii_uppercase();
    if currency.is_empty() {
        return Err(PaymentError::BlankField { field: "currency" });
    }
    request.currency = currency;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn donation(amount_cents: u64) -> PaymentRequest {
        PaymentRequest {
            payer: UserId::new("dana"),
            amount_cents,
            currency: "usd".to_string(),
            method: PaymentMethod::Card,
            request_id: Some(RequestId(7)),
        }
    }

    fn processor(limit: u64) -> PaymentProcessor<SimulatedGateway> {
        PaymentProcessor::new(Arc::new(SimulatedGateway::new(
            Duration::from_millis(20),
            limit,
        )))
    }

    struct OfflineGateway;

    impl PaymentGateway for OfflineGateway {
        fn charge(
            &self,
            _id: PaymentId,
            _request: &PaymentRequest,
        ) -> Result<String, GatewayError> {
            Err(GatewayError::Unavailable("processor offline".to_string()))
        }
    }

    #[tokio::test]
    async fn ticket_starts_processing_then_succeeds() {
        let processor = processor(10_000);
        let ticket = processor.submit(donation(2_500)).expect("payment accepted");
        let id = ticket.id();
        assert_eq!(ticket.current(), PaymentState::Processing);

        match ticket.wait().await {
            PaymentState::Succeeded { receipt } => {
                assert_eq!(receipt.payment_id, id);
                assert_eq!(receipt.amount_cents, 2_500);
                assert_eq!(receipt.currency, "USD");
                assert_eq!(receipt.reference, "sim-000001");
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert!(processor.status(id).expect("known payment").is_terminal());
    }

    #[tokio::test]
    async fn charges_over_the_limit_fail() {
        let processor = processor(1_000);
        let ticket = processor.submit(donation(5_000)).expect("payment accepted");
        match ticket.wait().await {
            PaymentState::Failed { reason } => assert!(reason.contains("per-charge limit")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn gateway_outage_is_reported_as_failure() {
        let processor = PaymentProcessor::new(Arc::new(OfflineGateway));
        let ticket = processor.submit(donation(100)).expect("payment accepted");
        let id = ticket.id();
        let state = ticket.wait().await;
        assert!(matches!(state, PaymentState::Failed { .. }));
        assert_eq!(processor.status(id), Some(state));
    }

    #[tokio::test]
    async fn rejects_invalid_requests_before_processing() {
        let processor = processor(10_000);
        assert_eq!(
            processor.submit(donation(0)).expect_err("zero amount"),
            PaymentError::InvalidAmount
        );

        let mut anonymous = donation(100);
        anonymous.payer = UserId::new("  ");
        assert_eq!(
            processor.submit(anonymous).expect_err("blank payer"),
            PaymentError::BlankField { field: "payer" }
        );
        assert_eq!(processor.status(PaymentId(1)), None);
    }

    #[tokio::test]
    async fn settled_payments_beyond_retention_are_forgotten() {
        let gateway = Arc::new(SimulatedGateway::new(Duration::from_millis(200), 10_000));
        let processor = PaymentProcessor::with_retention(gateway, 1);

        let first = processor.submit(donation(100)).expect("payment accepted");
        let second = processor.submit(donation(200)).expect("payment accepted");
        let (first_id, second_id) = (first.id(), second.id());
        assert!(processor.status(first_id).is_some());
        assert!(processor.status(second_id).is_some());

        assert!(first.wait().await.is_terminal());
        assert!(second.wait().await.is_terminal());
        let third = processor.submit(donation(300)).expect("payment accepted");

        assert_eq!(processor.status(first_id), None);
        assert_eq!(processor.status(second_id), None);
        assert!(processor.status(third.id()).is_some());
    }

    #[test]
    fn submit_requires_a_runtime() {
        let processor = processor(10_000);
        assert_eq!(
            processor.submit(donation(100)).expect_err("no runtime"),
            PaymentError::NoRuntime
        );
    }
}
