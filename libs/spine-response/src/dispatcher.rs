//! Routing a Spine response to the handler that claims it.

use std::sync::Arc;

use eps_signature::SignatureVerifier;

use crate::dispense_return::DispenseReturnSender;
use crate::error::{Error, Result};
use crate::handlers::{
    AcknowledgementHandler, CancellationHandler, ReleaseRejectionHandler, ReleaseResponseHandler, ResponseHandler,
};
use crate::message::SpineMessage;
use crate::translated::TranslatedResponse;

/// Ordered handlers. Built once, read-only afterwards.
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn ResponseHandler>>,
}

impl HandlerRegistry {
    pub fn empty() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Acknowledgement, cancellation, release rejection, in that order.
    pub fn base() -> Self {
        Self::empty()
            .with_handler(Arc::new(AcknowledgementHandler))
            .with_handler(Arc::new(CancellationHandler))
            .with_handler(Arc::new(ReleaseRejectionHandler))
    }

    /// Appends a handler; earlier registrations win ties.
    pub fn with_handler(mut self, handler: Arc<dyn ResponseHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn interaction_ids(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.interaction_id()).collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::base()
    }
}

/// Dispatches one response: the shared base registry followed by any
/// handlers bound to the current request.
pub struct Dispatcher {
    base: Arc<HandlerRegistry>,
    request_handlers: Vec<Arc<dyn ResponseHandler>>,
}

impl Dispatcher {
    pub fn new(base: Arc<HandlerRegistry>) -> Self {
        Self {
            base,
            request_handlers: Vec::new(),
        }
    }

    /// Adds the nominated and patient release handlers, which send returns
    /// on behalf of the current request.
    pub fn with_release_handlers(mut self, verifier: Arc<SignatureVerifier>, returns: Arc<DispenseReturnSender>) -> Self {
        self.request_handlers.push(Arc::new(ReleaseResponseHandler::nominated(
            verifier.clone(),
            returns.clone(),
        )));
        self.request_handlers
            .push(Arc::new(ReleaseResponseHandler::patient(verifier, returns)));
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn ResponseHandler>) -> Self {
        self.request_handlers.push(handler);
        self
    }

    fn handlers(&self) -> impl Iterator<Item = &Arc<dyn ResponseHandler>> {
        self.base.handlers.iter().chain(self.request_handlers.iter())
    }

    /// First handler to claim the message wins.
    pub async fn dispatch(&self, body: &[u8]) -> Result<TranslatedResponse> {
        let message = SpineMessage::parse(body)?;
        for handler in self.handlers() {
            if let Some(response) = handler.try_handle(&message).await {
                return Ok(response);
            }
        }
        Err(Error::DispatchUnmatched {
            interaction_id: Some(message.interaction_id().to_string()),
        })
    }

    /// [`dispatch`](Self::dispatch) with failures turned into their
    /// translated response. The raw body is logged when nothing matched.
    pub async fn translate(&self, body: &[u8]) -> TranslatedResponse {
        match self.dispatch(body).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    body = %String::from_utf8_lossy(body),
                    "Unhandled Spine response"
                );
                e.into_translated_response()
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<&str> = self.handlers().map(|h| h.interaction_id()).collect();
        f.debug_struct("Dispatcher").field("handlers", &ids).finish()
    }
}
