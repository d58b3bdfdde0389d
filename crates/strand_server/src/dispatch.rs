//! Hook delivery.

use crate::config::DeliveryConfig;
use std::sync::Arc;
use strand_core::{Hook, HookEnvelope};
use tracing::{debug, info, warn};

/// Network client used to deliver hook envelopes.
///
/// Implement this trait to provide the actual transport (an HTTP client in
/// production, a recorder in tests).
pub trait HookTransport: Send + Sync {
    /// Posts a JSON body to `url`.
    fn post(&self, url: &str, body: &[u8]) -> Result<(), String>;
}

/// A transport that only logs what it would deliver.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

impl HookTransport for LogTransport {
    fn post(&self, url: &str, body: &[u8]) -> Result<(), String> {
        info!(url, bytes = body.len(), "hook delivery");
        Ok(())
    }
}

/// Hands envelopes to a [`HookTransport`], one delivery per subscriber.
///
/// Deliveries are fire-and-forget inside a tokio runtime, where each one
/// runs on its own task. Without a runtime the whole attempt schedule,
/// backoff sleeps included, runs on the calling thread, so a synchronous
/// caller blocks until every delivery has settled. A failed
/// attempt is retried with exponential backoff up to
/// [`DeliveryConfig::max_attempts`], so a subscriber may see the same
/// envelope more than once. Subscribers are independent and no order is
/// kept between them.
#[derive(Clone)]
pub struct HookDispatcher {
    transport: Arc<dyn HookTransport>,
    config: DeliveryConfig,
}

impl HookDispatcher {
    /// Creates a dispatcher.
    pub fn new(transport: Arc<dyn HookTransport>, config: DeliveryConfig) -> Self {
        Self { transport, config }
    }

    /// Creates a dispatcher backed by [`LogTransport`].
    pub fn logging(config: DeliveryConfig) -> Self {
        Self::new(Arc::new(LogTransport), config)
    }

    /// Delivery settings.
    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Sends `envelope` to every hook, tagged with each hook's kind.
    ///
    /// Returns the number of deliveries started.
    pub fn dispatch(&self, hooks: &[Hook], envelope: &HookEnvelope) -> usize {
        let mut started = 0;
        for hook in hooks {
            let body = match envelope.for_kind(hook.kind()).to_bytes() {
                Ok(body) => body,
                Err(err) => {
                    warn!(hook_id = hook.id(), error = %err, "cannot encode hook envelope");
                    continue;
                }
            };
            self.deliver(Delivery {
                url: hook.url().to_string(),
                body: body.into(),
            });
            started += 1;
        }
        started
    }

    fn deliver(&self, delivery: Delivery) {
        let transport = Arc::clone(&self.transport);
        let config = self.config.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let attempts = config.max_attempts.max(1);
                    for attempt in 0..attempts {
                        let transport = Arc::clone(&transport);
                        let job = delivery.clone();
                        let outcome =
                            tokio::task::spawn_blocking(move || transport.post(&job.url, &job.body))
                                .await
                                .unwrap_or_else(|e| Err(e.to_string()));
                        if delivery.settle(outcome, attempt, attempts) {
                            return;
                        }
                        tokio::time::sleep(config.delay_for_attempt(attempt)).await;
                    }
                });
            }
            Err(_) => {
                let attempts = config.max_attempts.max(1);
                for attempt in 0..attempts {
                    let outcome = transport.post(&delivery.url, &delivery.body);
                    if delivery.settle(outcome, attempt, attempts) {
                        return;
                    }
                    std::thread::sleep(config.delay_for_attempt(attempt));
                }
            }
        }
    }
}

impl std::fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookDispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct Delivery {
    url: String,
    body: Arc<[u8]>,
}

impl Delivery {
    /// Logs the outcome of one attempt. Returns true when no further
    /// attempt should be made.
    fn settle(&self, outcome: Result<(), String>, attempt: u32, attempts: u32) -> bool {
        match outcome {
            Ok(()) => {
                debug!(url = %self.url, attempt, "hook delivered");
                true
            }
            Err(err) if attempt + 1 < attempts => {
                debug!(url = %self.url, attempt, error = %err, "hook delivery failed, retrying");
                false
            }
            Err(err) => {
                warn!(url = %self.url, attempts, error = %err, "hook delivery abandoned");
                true
            }
        }
    }
}
