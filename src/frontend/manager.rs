use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{FrontendProvider, InboundMessage};
use crate::capsule::{Capsule, FrontendLink};
use crate::config::FrontendConfig;
use crate::consts::INBOUND_CAPACITY;
use crate::error::{Error, Result};
use crate::registry::ProviderRegistry;

/// Owns the activated front-end providers. Merges their user messages into
/// one stream towards the back-end and routes returned capsules to the
/// provider that produced them.
pub struct FrontendManager {
    providers: Vec<Arc<dyn FrontendProvider>>,
    inbound: mpsc::Receiver<InboundMessage>,
}

impl FrontendManager {
    /// Resolve and initialize every activated front-end provider.
    ///
    /// All-or-nothing: the first unknown label or failed initialization
    /// aborts, and providers built so far are stopped again.
    pub async fn initialize(configs: &[FrontendConfig], registry: &ProviderRegistry) -> Result<Self> {
        let (tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
        let mut providers: Vec<Arc<dyn FrontendProvider>> = Vec::new();
        let mut labels = HashSet::new();

        for config in configs {
            match Self::build(config, registry, &tx, &mut labels).await {
                Ok(Some(provider)) => providers.push(provider),
                Ok(None) => {}
                Err(err) => {
                    for provider in &providers {
                        provider.stop().await;
                    }
                    return Err(err);
                }
            }
        }

        if providers.is_empty() {
            return Err(Error::config("no frontend provider is activated"));
        }

        Ok(Self { providers, inbound })
    }

    async fn build(
        config: &FrontendConfig,
        registry: &ProviderRegistry,
        tx: &mpsc::Sender<InboundMessage>,
        labels: &mut HashSet<String>,
    ) -> Result<Option<Arc<dyn FrontendProvider>>> {
        let descriptor = registry
            .frontend(&config.label)
            .ok_or_else(|| Error::provider_not_found(&config.label))?;

        if !config.is_activated {
            debug!(provider = %config.label, "frontend provider not activated");
            return Ok(None);
        }
        if !labels.insert(config.label.clone()) {
            return Err(Error::config(format!(
                "frontend provider `{}` is activated more than once",
                config.label
            )));
        }

        let provider = descriptor
            .initialize(config, tx.clone())
            .await
            .map_err(|e| Error::provider_init(&config.label, e))?;
        info!(provider = provider.label(), "frontend provider initialized");
        Ok(Some(Arc::from(provider)))
    }

    /// Labels of the running providers.
    pub fn labels(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.label()).collect()
    }

    /// Run every provider in its own task and dispatch capsules until
    /// cancellation, or until the inbound stream or the back-end link closes.
    ///
    /// Shutdown drains the link: events already accepted are still forwarded,
    /// then the back-end side is closed and every capsule it returns is
    /// delivered. Only then are the providers stopped and their tasks joined.
    pub async fn start(self, link: FrontendLink, cancel: CancellationToken) {
        let FrontendManager {
            providers,
            mut inbound,
        } = self;
        let FrontendLink {
            to_backend,
            mut from_backend,
        } = link;

        let tasks: Vec<_> = providers
            .iter()
            .map(|provider| {
                let provider = Arc::clone(provider);
                tokio::spawn(async move {
                    if let Err(e) = provider.start().await {
                        error!(provider = provider.label(), error = %e, "frontend provider stopped with an error");
                    }
                })
            })
            .collect();

        info!(providers = tasks.len(), "starting frontend listening loop");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = inbound.recv() => {
                    let Some(event) = event else {
                        info!("inbound stream closed");
                        break;
                    };
                    if !forward(&providers, event, &to_backend, &mut from_backend).await {
                        break;
                    }
                }
                returned = from_backend.recv() => {
                    let Some(capsule) = returned else {
                        info!("backend link closed");
                        break;
                    };
                    report(deliver(&providers, &capsule).await, &capsule);
                }
            }
        }

        info!("draining in-flight capsules");
        inbound.close();
        while let Some(event) = inbound.recv().await {
            if !forward(&providers, event, &to_backend, &mut from_backend).await {
                break;
            }
        }
        drop(to_backend);
        while let Some(capsule) = from_backend.recv().await {
            report(deliver(&providers, &capsule).await, &capsule);
        }

        info!("closing frontend providers");
        for provider in &providers {
            provider.stop().await;
        }
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                error!(error = %e, "frontend provider task failed");
            }
        }
    }
}

/// Turn an inbound event into a capsule and send it to the back-end.
///
/// Returned capsules keep being delivered while the send waits, so a full
/// link in each direction cannot block both managers. Returns `false` once
/// the back-end link is closed.
async fn forward(
    providers: &[Arc<dyn FrontendProvider>],
    event: InboundMessage,
    to_backend: &mpsc::Sender<Capsule>,
    from_backend: &mut mpsc::Receiver<Capsule>,
) -> bool {
    let capsule = Capsule::from(event);
    if let Err(err) = capsule.validate() {
        warn!(provider = %capsule.frontend_provider, error = %err, "rejecting inbound message");
        let rejected = capsule.with_error(&err);
        report(deliver(providers, &rejected).await, &rejected);
        return true;
    }

    debug!(
        id = %capsule.original_message,
        provider = %capsule.frontend_provider,
        user = %capsule.user,
        "capsule received"
    );

    loop {
        tokio::select! {
            permit = to_backend.reserve() => {
                return match permit {
                    Ok(permit) => {
                        permit.send(capsule);
                        true
                    }
                    Err(_) => {
                        warn!("backend link closed");
                        false
                    }
                };
            }
            returned = from_backend.recv() => match returned {
                Some(returned) => report(deliver(providers, &returned).await, &returned),
                None => {
                    warn!("backend link closed");
                    return false;
                }
            },
        }
    }
}

/// Hand a capsule to the provider whose label it carries.
async fn deliver(providers: &[Arc<dyn FrontendProvider>], capsule: &Capsule) -> Result<()> {
    let provider = providers
        .iter()
        .find(|p| p.label() == capsule.frontend_provider)
        .ok_or_else(|| Error::UnknownFrontend {
            label: capsule.frontend_provider.clone(),
        })?;
    provider.message(capsule).await
}

fn report(result: Result<()>, capsule: &Capsule) {
    if let Err(err) = result {
        error!(
            id = %capsule.original_message,
            provider = %capsule.frontend_provider,
            error = %err,
            "cannot deliver capsule"
        );
    }
}
