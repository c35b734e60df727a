//! Inbound side of the Spine integration: turning HL7v3 responses into FHIR.
//!
//! [`Dispatcher`] parses a response body, finds the payload's interaction id
//! and hands it to the first [`ResponseHandler`] that claims it. Release
//! responses additionally verify each prescription's signature and return
//! the ones that fail through [`DispenseReturnSender`].

pub mod dispatcher;
pub mod dispense_return;
pub mod error;
pub mod fhir;
pub mod handlers;
pub mod message;
pub mod translated;

pub use dispatcher::{Dispatcher, HandlerRegistry};
pub use dispense_return::{DispenseReturnSender, RequestContext, ReturnRequest, DISPENSE_PROPOSAL_RETURN};
pub use error::{Error, Result};
pub use handlers::{
    AcknowledgementHandler, CancellationHandler, ReleaseRejectionHandler, ReleaseResponseHandler, ResponseHandler,
};
pub use message::SpineMessage;
pub use translated::TranslatedResponse;
