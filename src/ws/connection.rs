use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt as _, StreamExt as _, future};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::error::WsError;
use super::traits::{Connector, Transport};
use crate::Result;
use crate::error::Error;

/// Upper bound on the graceful close handshake of a released link.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// [`Connector`] backed by `tokio-tungstenite`.
///
/// Text frames are passed through; binary frames and control frames are ignored. A close
/// frame from the server ends the transport with [`WsError::ConnectionClosed`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &Url) -> Result<Transport> {
        let (ws_stream, _) = connect_async(endpoint.as_str()).await?;
        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(Error::from)
            .with(|text: String| future::ready(Ok::<_, Error>(Message::Text(text.into()))));

        let stream = read.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(_)) => Some(Err(Error::from(WsError::ConnectionClosed))),
                Ok(_) => None,
                Err(e) => Some(Err(Error::from(e))),
            })
        });

        Ok(Transport::new(sink, stream))
    }
}

/// Something that happened on a link, tagged with the link's generation.
#[derive(Debug)]
pub(crate) struct LinkEvent {
    pub(crate) generation: u64,
    pub(crate) kind: LinkEventKind,
}

#[derive(Debug)]
pub(crate) enum LinkEventKind {
    /// The transport is open and frames may flow
    Opened,
    /// A text frame arrived
    Frame(String),
    /// The attempt failed or the open transport ended
    Closed(Option<Error>),
}

/// Handle to one connection attempt and, if it succeeds, the transport it opened.
///
/// The attempt runs in its own task and reports back through [`LinkEvent`]s carrying its
/// generation. Dropping the handle cancels the task, which then closes the transport on its
/// own within [`CLOSE_TIMEOUT`]. The drop itself never waits for the close handshake.
#[derive(Debug)]
pub(crate) struct Link {
    generation: u64,
    outbound: mpsc::UnboundedSender<String>,
    token: CancellationToken,
}

impl Link {
    pub(crate) fn spawn(
        connector: Arc<dyn Connector>,
        endpoint: Url,
        generation: u64,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        tokio::spawn(Self::run(
            connector,
            endpoint,
            generation,
            outbound_rx,
            events,
            token.clone(),
        ));

        Self {
            generation,
            outbound,
            token,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a frame for the transport.
    pub(crate) fn send(&self, frame: String) -> Result<()> {
        self.outbound
            .send(frame)
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }

    async fn run(
        connector: Arc<dyn Connector>,
        endpoint: Url,
        generation: u64,
        mut outbound_rx: mpsc::UnboundedReceiver<String>,
        events: mpsc::UnboundedSender<LinkEvent>,
        token: CancellationToken,
    ) {
        let emit = |kind| {
            _ = events.send(LinkEvent { generation, kind });
        };

        let connected = tokio::select! {
            biased;
            () = token.cancelled() => return,
            result = connector.connect(&endpoint) => result,
        };

        let Transport {
            mut sink,
            mut stream,
        } = match connected {
            Ok(transport) => transport,
            Err(e) => {
                emit(LinkEventKind::Closed(Some(e)));
                return;
            }
        };

        emit(LinkEventKind::Opened);

        let reason = loop {
            tokio::select! {
                biased;

                () = token.cancelled() => {
                    if timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(generation, "Transport did not close in time");
                    }
                    return;
                }

                frame = stream.next() => {
                    match frame {
                        Some(Ok(text)) => emit(LinkEventKind::Frame(text)),
                        Some(Err(e)) => break Some(e),
                        None => break None,
                    }
                }

                Some(text) = outbound_rx.recv() => {
                    if let Err(e) = sink.send(text).await {
                        break Some(e);
                    }
                }
            }
        };

        emit(LinkEventKind::Closed(reason));
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
