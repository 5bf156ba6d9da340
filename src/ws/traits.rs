//! Core traits for pluggable transports.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};
use url::Url;

use crate::Result;
use crate::error::Error;

/// Outbound half of a transport. Accepts serialized text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = Error> + Send>>;

/// Inbound half of a transport. Yields text frames until the remote side goes away.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// An open, message-oriented, full-duplex channel.
#[non_exhaustive]
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Transport {
    pub fn new<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<String, Error = Error> + Send + 'static,
        St: Stream<Item = Result<String>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// Opens transports to an endpoint.
///
/// The session calls [`Connector::connect`] once per connection attempt and owns the
/// returned [`Transport`] exclusively until the attempt ends.
///
/// # Example
///
/// ```ignore
/// struct Loopback;
///
/// #[async_trait]
/// impl Connector for Loopback {
///     async fn connect(&self, _endpoint: &Url) -> Result<Transport> {
///         let (tx, rx) = futures::channel::mpsc::unbounded();
///         let sink = tx.sink_map_err(|e| Error::from(WsError::SendFailed(e.to_string())));
///         Ok(Transport::new(sink, rx.map(Ok)))
///     }
/// }
/// ```
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &Url) -> Result<Transport>;
}
