use tracing::{debug, error, info, warn};

use super::BackendProvider;
use crate::capsule::{BackendLink, Capsule};
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::registry::ProviderRegistry;

/// Applies the single active NLU provider to every capsule it receives and
/// sends each one back with responses or an error attached.
pub struct BackendManager {
    provider: Box<dyn BackendProvider>,
}

impl BackendManager {
    /// Resolve and initialize the one activated back-end provider.
    ///
    /// Every configured label must be known to the registry. Zero or several
    /// activated entries is a configuration error.
    pub async fn initialize(configs: &[BackendConfig], registry: &ProviderRegistry) -> Result<Self> {
        let mut activated = Vec::new();
        for config in configs {
            let descriptor = registry
                .backend(&config.label)
                .ok_or_else(|| Error::provider_not_found(&config.label))?;
            if config.is_activated {
                activated.push((descriptor, config));
            }
        }

        let (descriptor, config) = match activated.len() {
            1 => activated.remove(0),
            0 => return Err(Error::config("no backend provider is activated")),
            n => {
                return Err(Error::config(format!(
                    "{n} backend providers are activated, exactly one is required"
                )));
            }
        };

        let provider = descriptor
            .initialize(config)
            .await
            .map_err(|e| Error::provider_init(&config.label, e))?;
        info!(provider = provider.label(), "backend provider initialized");

        Ok(Self::new(provider))
    }

    /// Wrap an already running provider.
    pub fn new(provider: Box<dyn BackendProvider>) -> Self {
        Self { provider }
    }

    pub fn label(&self) -> &str {
        self.provider.label()
    }

    /// Run the provider over one capsule. Always returns the capsule, with
    /// either its responses or an error set.
    pub async fn process(&self, capsule: Capsule) -> Capsule {
        if let Err(err) = capsule.validate() {
            warn!(error = %err, provider = %capsule.frontend_provider, "rejecting capsule");
            return capsule.with_error(&err);
        }

        let text = match capsule.content.as_text() {
            Some(text) => text.to_owned(),
            None => {
                let err = Error::not_implemented(format!(
                    "{} message handling",
                    capsule.content.kind()
                ));
                debug!(id = %capsule.original_message, error = %err, "unsupported content");
                return capsule.with_error(&err);
            }
        };

        match self.provider.message(&text).await {
            Ok(response) => {
                debug!(
                    id = %capsule.original_message,
                    provider = self.provider.label(),
                    %response,
                    "response received"
                );
                capsule.with_responses(response.into_texts())
            }
            Err(source) => {
                let err = Error::provider_call(self.provider.label(), source);
                warn!(id = %capsule.original_message, error = %err, "backend call failed");
                capsule.with_error(&err)
            }
        }
    }

    /// Listening loop. Receives one capsule at a time, processes it and
    /// returns it. Ends when the front-end side of the link closes, so
    /// capsules already on the link are still answered. Then stops the
    /// provider.
    pub async fn start(self, link: BackendLink) {
        let BackendLink {
            mut from_frontend,
            to_frontend,
        } = link;

        info!(provider = self.label(), "starting backend listening loop");
        while let Some(capsule) = from_frontend.recv().await {
            debug!(
                id = %capsule.original_message,
                from = %capsule.frontend_provider,
                kind = capsule.content.kind(),
                "capsule received"
            );
            let capsule = self.process(capsule).await;

            if to_frontend.send(capsule).await.is_err() {
                warn!("frontend link closed before a capsule could be returned");
                break;
            }
        }
        debug!("frontend link closed");
        drop(to_frontend);

        info!(provider = self.label(), "closing backend provider");
        if let Err(e) = self.provider.stop().await {
            error!(provider = self.label(), error = %e, "failed to stop backend provider");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, MockReply};
    use crate::capsule::{CapsuleErrorKind, Content};
    use uuid::Uuid;

    fn manager(replies: Vec<MockReply>) -> (BackendManager, MockBackend) {
        let mock = MockBackend::new("beta", replies);
        (BackendManager::new(Box::new(mock.clone())), mock)
    }

    fn capsule(content: Content) -> Capsule {
        Capsule::new(Uuid::new_v4(), "alpha", content, "bob").unwrap()
    }

    #[tokio::test]
    async fn process_flattens_outputs_in_order() {
        let (manager, _) = manager(vec![MockReply::Outputs(vec!["A".into(), "B".into()])]);
        let out = manager.process(capsule(Content::Text("hi".into()))).await;
        assert_eq!(out.responses, vec!["A", "B"]);
        assert!(out.error.is_none());
    }

    #[tokio::test]
    async fn process_attaches_provider_failure() {
        let (manager, _) = manager(vec![MockReply::Fail("service unavailable".into())]);
        let out = manager.process(capsule(Content::Text("hi".into()))).await;
        assert!(out.responses.is_empty());
        let err = out.error.unwrap();
        assert_eq!(err.kind, CapsuleErrorKind::ProviderCall);
        assert!(err.message.contains("service unavailable"));
    }

    #[tokio::test]
    async fn image_and_audio_never_reach_provider() {
        let (manager, mock) = manager(vec![]);

        let image = manager.process(capsule(Content::Image(vec![1, 2, 3]))).await;
        let audio = manager.process(capsule(Content::Audio(vec![4, 5]))).await;

        assert_eq!(image.error.unwrap().kind, CapsuleErrorKind::NotImplemented);
        assert_eq!(audio.error.unwrap().kind, CapsuleErrorKind::NotImplemented);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn nil_identifier_is_rejected_without_call() {
        let (manager, mock) = manager(vec![]);
        let mut bad = capsule(Content::Text("hi".into()));
        bad.original_message = Uuid::nil();

        let out = manager.process(bad).await;
        assert_eq!(out.error.unwrap().kind, CapsuleErrorKind::InvalidCapsule);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn start_answers_queued_capsules_before_stopping() {
        let (manager, mock) = manager(vec![
            MockReply::Outputs(vec!["one".into()]),
            MockReply::Outputs(vec!["two".into()]),
        ]);
        let (front, back) = crate::capsule::link(2);
        let crate::capsule::FrontendLink {
            to_backend,
            mut from_backend,
        } = front;

        to_backend.send(capsule(Content::Text("1".into()))).await.unwrap();
        to_backend.send(capsule(Content::Text("2".into()))).await.unwrap();
        drop(to_backend);

        let worker = tokio::spawn(manager.start(back));
        let first = from_backend.recv().await.unwrap();
        let second = from_backend.recv().await.unwrap();
        assert_eq!(first.responses, vec!["one"]);
        assert_eq!(second.responses, vec!["two"]);
        assert!(from_backend.recv().await.is_none());

        worker.await.unwrap();
        assert!(mock.is_stopped());
    }

    #[tokio::test]
    async fn start_stops_provider_when_frontend_link_closes() {
        let (manager, mock) = manager(vec![]);
        let (front, back) = crate::capsule::link(1);

        let worker = tokio::spawn(manager.start(back));
        drop(front);
        worker.await.unwrap();

        assert!(mock.is_stopped());
    }
}
