use lifeline::config::AppConfig;
use lifeline::payments::{PaymentProcessor, SimulatedGateway};
use lifeline::registry::{
    BroadcastPublisher, InMemoryProfileStore, InMemoryUserDirectory, MatchingConfig,
    RegistryService, StatusChangeEvent,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub(crate) type Registry =
    RegistryService<InMemoryProfileStore, BroadcastPublisher, InMemoryUserDirectory>;
pub(crate) type Payments = PaymentProcessor<SimulatedGateway>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) directory: Arc<InMemoryUserDirectory>,
    pub(crate) payments: Arc<Payments>,
}

/// The in-process collaborators behind one running registry.
pub(crate) struct Wiring {
    pub(crate) registry: Arc<Registry>,
    pub(crate) directory: Arc<InMemoryUserDirectory>,
    pub(crate) events: Arc<BroadcastPublisher>,
    pub(crate) payments: Arc<Payments>,
}

impl Wiring {
    pub(crate) fn from_config(config: &AppConfig) -> Self {
        Self::build(&config.access.admin_ids, config.matching)
    }

    pub(crate) fn build(admin_ids: &[String], matching: MatchingConfig) -> Self {
        let directory = Arc::new(InMemoryUserDirectory::with_admins(admin_ids.iter().cloned()));
        let events = Arc::new(BroadcastPublisher::default());
        let registry = Arc::new(RegistryService::new(
            Arc::new(InMemoryProfileStore::new()),
            events.clone(),
            directory.clone(),
            matching,
        ));
        let payments = Arc::new(PaymentProcessor::new(Arc::new(SimulatedGateway::default())));

        Self {
            registry,
            directory,
            events,
            payments,
        }
    }
}

/// Log every committed status change until the publisher is dropped.
pub(crate) fn spawn_audit_log(events: &BroadcastPublisher) -> JoinHandle<()> {
    let receiver = events.subscribe();
    tokio::spawn(audit_log(receiver))
}

async fn audit_log(mut receiver: broadcast::Receiver<StatusChangeEvent>) {
    loop {
        match receiver.recv().await {
            Ok(event) => {
                let (from, to) = event.change.labels();
                info!(
                    record = %event.change.record(),
                    from,
                    to,
                    actor = %event.actor,
                    at = %event.at,
                    "status changed"
                );
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "audit log fell behind; status changes dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
