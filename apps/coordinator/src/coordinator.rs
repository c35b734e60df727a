//! Wiring of the outbound and inbound halves.
//!
//! A [`Coordinator`] is built once from [`Config`] and shared. Every call that
//! may produce a release response gets its own [`Dispatcher`], because the
//! release handlers send returns on behalf of the caller's identity.

use std::sync::Arc;

use serde_json::Value;

use eps_signature::{SignatureVerifier, VerifiedSignature};
use eps_spine_client::{
    EnvelopeBuilder, Exchange, HealthStatus, LiveSpineClient, SandboxSpineClient, SpineTransport, TerminalResponse,
};
use eps_spine_response::{Dispatcher, DispenseReturnSender, HandlerRegistry, RequestContext, TranslatedResponse};

use crate::config::{Config, SignatureConfig};
use crate::error::{Error, Result};
use crate::polling::FixedIntervalPolicy;

pub struct Coordinator {
    transport: Arc<dyn SpineTransport>,
    envelopes: EnvelopeBuilder,
    handlers: Arc<HandlerRegistry>,
    verifier: Arc<SignatureVerifier>,
    policy: FixedIntervalPolicy,
    from_asid: String,
    to_asid: String,
    sandbox: bool,
}

impl Coordinator {
    /// Validates `config` and builds the transport it selects.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let routing = Arc::new(config.routing_table()?);
        let transport: Arc<dyn SpineTransport> = if config.spine.sandbox {
            Arc::new(SandboxSpineClient::new())
        } else {
            Arc::new(LiveSpineClient::new(config.live_client()?)?)
        };
        let verifier = load_verifier(&config.signature)?;

        tracing::info!(
            sandbox = config.spine.sandbox,
            base_url = %config.spine.base_url,
            routes = routing.len(),
            trusted_issuers = verifier.trusted_issuer_count(),
            "Coordinator configured"
        );

        Ok(Self {
            transport,
            envelopes: EnvelopeBuilder::new(
                routing,
                config.spine.from_party_key.clone(),
                config.spine.to_party_key.clone(),
            ),
            handlers: Arc::new(HandlerRegistry::base()),
            verifier: Arc::new(verifier),
            policy: FixedIntervalPolicy::from(&config.polling),
            from_asid: config.spine.from_asid.clone(),
            to_asid: config.spine.to_asid.clone(),
            sandbox: config.spine.sandbox,
        })
    }

    pub fn with_transport(mut self, transport: Arc<dyn SpineTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_envelopes(mut self, envelopes: EnvelopeBuilder) -> Self {
        self.envelopes = envelopes;
        self
    }

    pub fn is_sandbox(&self) -> bool {
        self.sandbox
    }

    pub fn policy(&self) -> &FixedIntervalPolicy {
        &self.policy
    }

    /// Base handlers followed by release handlers bound to `context`.
    pub fn dispatcher(&self, context: RequestContext) -> Dispatcher {
        let returns = DispenseReturnSender::new(
            self.transport.clone(),
            self.envelopes.clone(),
            context,
            self.from_asid.clone(),
            self.to_asid.clone(),
        );
        Dispatcher::new(self.handlers.clone()).with_release_handlers(self.verifier.clone(), Arc::new(returns))
    }

    /// Wraps `payload`, sends it and follows polling until Spine answers.
    pub async fn send(&self, interaction_id: &str, payload: &str) -> Result<TerminalResponse> {
        let outbound = self.envelopes.build(interaction_id, payload)?.into_outbound()?;
        tracing::info!(
            interaction_id,
            message_id = %outbound.message_id,
            "Sending message to Spine"
        );

        let terminal = Exchange::new(self.transport.clone(), outbound)
            .run_to_completion(&self.policy)
            .await?;

        tracing::info!(interaction_id, status_code = terminal.status_code, "Spine exchange complete");
        Ok(terminal)
    }

    pub async fn send_and_translate(
        &self,
        interaction_id: &str,
        payload: &str,
        context: RequestContext,
    ) -> TranslatedResponse {
        match self.send(interaction_id, payload).await {
            Ok(terminal) => self.translate(terminal, context).await,
            Err(e) => failure(e),
        }
    }

    /// Resumes an exchange from a polling URL handed out earlier.
    pub async fn poll(&self, polling_url: &str, context: RequestContext) -> TranslatedResponse {
        tracing::info!(polling_url, "Resuming Spine exchange");
        let result = Exchange::resume(self.transport.clone(), polling_url)
            .run_to_completion(&self.policy)
            .await;
        match result {
            Ok(terminal) => self.translate(terminal, context).await,
            Err(e) => failure(e.into()),
        }
    }

    /// Answers already in FHIR (sandbox rejections) pass through; everything
    /// else goes to the dispatcher.
    pub async fn translate(&self, terminal: TerminalResponse, context: RequestContext) -> TranslatedResponse {
        if let Ok(body @ Value::Object(_)) = serde_json::from_slice::<Value>(&terminal.body) {
            return TranslatedResponse::new(terminal.status_code, body);
        }
        self.dispatcher(context).translate(&terminal.body).await
    }

    pub fn verify(&self, document: &[u8]) -> Result<VerifiedSignature> {
        let root = eps_xml::parse(document)?;
        Ok(self.verifier.verify(&root)?)
    }

    pub async fn status(&self) -> Result<HealthStatus> {
        Ok(self.transport.status().await?)
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("sandbox", &self.sandbox)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn load_verifier(config: &SignatureConfig) -> Result<SignatureVerifier> {
    let mut verifier = SignatureVerifier::new();
    for path in &config.trusted_issuers {
        let pem = std::fs::read(path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        verifier = verifier.with_trusted_issuer_pem(&pem)?;
    }
    Ok(verifier)
}

fn failure(error: Error) -> TranslatedResponse {
    tracing::error!(error = %error, "Spine exchange failed");
    match error {
        Error::Client(e) => eps_spine_response::Error::from(e).into_translated_response(),
        _ => TranslatedResponse::server_error(),
    }
}
