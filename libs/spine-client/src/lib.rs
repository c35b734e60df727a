//! Outbound side of the Spine integration.
//!
//! - [`RoutingTable`] maps interaction identifiers to CPA ids.
//! - [`EnvelopeBuilder`] wraps an HL7 payload in the ebXML/SOAP multipart
//!   envelope the backbone expects.
//! - [`SpineTransport`] sends and polls; [`LiveSpineClient`] talks HTTP and
//!   [`SandboxSpineClient`] answers from canned responses.
//! - [`Exchange`] drives a request from send to a terminal response.
//!
//! ```no_run
//! # async fn run() -> eps_spine_client::Result<()> {
//! use std::sync::Arc;
//! use eps_spine_client::{EnvelopeBuilder, LiveClientConfig, LiveSpineClient, RoutingTable, SpineTransport};
//!
//! let routing = Arc::new(RoutingTable::from_json(r#"[["PORX_IN020101SM31","S20001A000100"]]"#)?);
//! let builder = EnvelopeBuilder::new(routing, "T141D-822234", "YES-0000806");
//! let message = builder.build("PORX_IN020101SM31", "<PORX_IN020101SM31/>")?.into_outbound()?;
//!
//! let client = LiveSpineClient::new(LiveClientConfig::new("https://spine.example/".parse()?, "200000001285"))?;
//! let response = client.send(&message).await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```

pub mod envelope;
pub mod error;
pub mod exchange;
pub mod live;
pub mod routing;
pub mod sandbox;
pub mod transport;

pub use envelope::{
    Clock, Envelope, EnvelopeBuilder, IdGenerator, OutboundMessage, SystemClock, UuidGenerator,
};
pub use error::{Error, Result};
pub use exchange::{Exchange, ExchangeState, PollPolicy};
pub use live::{LiveClientConfig, LiveSpineClient};
pub use routing::RoutingTable;
pub use sandbox::SandboxSpineClient;
pub use transport::{classify, HealthStatus, SpineTransport, TerminalResponse, TransportResponse};
