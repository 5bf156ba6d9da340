//! Connection lifecycle and reconnection policy.
//!
//! A single task owns the session. It consumes caller commands, link events and reconnect
//! timer firings one at a time, so every transition runs to completion before the next
//! input is looked at. Links and timers carry the generation that was current when they
//! were created; anything arriving with an older generation is discarded.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::{Backoff as _, Constant};
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::codec;
use super::registry::SubscriptionRegistry;
use super::router::Router;
use super::types::request::Request;
use crate::Result;
use crate::error::Error;
use crate::ws::Connector;
use crate::ws::WsError;
use crate::ws::config::ReconnectConfig;
use crate::ws::connection::{Link, LinkEvent, LinkEventKind};

/// Lifecycle state of the session.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum SessionState {
    /// Never connected
    Idle,
    /// A connection attempt is in flight
    Connecting,
    /// The transport is open and frames are being dispatched
    Open,
    /// The last attempt failed or the connection dropped; a retry is scheduled
    ReconnectPending,
    /// Explicitly disconnected; nothing happens until the next connect
    Closed,
}

impl SessionState {
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Requests from the client facade.
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Disconnect,
    /// The device was added to the registry
    Subscribe(String),
    /// The device was removed from the registry
    Unsubscribe(String),
    /// Fire-and-forget request, dropped unless the session is open
    Send(Request),
}

/// Caller side of a running session.
#[derive(Debug, Clone)]
pub(crate) struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    pub(crate) state: watch::Receiver<SessionState>,
    pub(crate) status: watch::Receiver<bool>,
}

impl SessionHandle {
    pub(crate) fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_e| WsError::SessionClosed)?;
        Ok(())
    }
}

/// Receivers consumed by [`Session::run`].
#[derive(Debug)]
pub(crate) struct Inputs {
    commands: mpsc::UnboundedReceiver<Command>,
    link_events: mpsc::UnboundedReceiver<LinkEvent>,
    timers: mpsc::UnboundedReceiver<u64>,
}

/// The link of the current generation plus the devices subscribed on it.
#[derive(Debug)]
struct ActiveLink {
    link: Link,
    subscribed: HashSet<String>,
}

impl ActiveLink {
    fn send(&self, request: &Request) -> bool {
        match self.link.send(codec::encode(request)) {
            Ok(()) => true,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %e, "Link refused outbound frame");
                #[cfg(not(feature = "tracing"))]
                let _: &Error = &e;
                false
            }
        }
    }
}

/// Pending reconnect. Dropping it cancels the timer.
#[derive(Debug)]
struct ReconnectTimer {
    token: CancellationToken,
}

impl ReconnectTimer {
    fn spawn(delay: Duration, generation: u64, fire: mpsc::UnboundedSender<u64>) -> Self {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => {}
                () = sleep(delay) => {
                    _ = fire.send(generation);
                }
            }
        });

        Self { token }
    }
}

impl Drop for ReconnectTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub(crate) struct Session {
    state: SessionState,
    generation: u64,
    link: Option<ActiveLink>,
    reconnect: Option<ReconnectTimer>,
    backoff: Constant,
    connector: Arc<dyn Connector>,
    endpoint: Url,
    registry: Arc<SubscriptionRegistry>,
    router: Arc<Router>,
    state_tx: watch::Sender<SessionState>,
    status_tx: watch::Sender<bool>,
    link_events_tx: mpsc::UnboundedSender<LinkEvent>,
    timers_tx: mpsc::UnboundedSender<u64>,
}

impl Session {
    pub(crate) fn new(
        connector: Arc<dyn Connector>,
        endpoint: Url,
        reconnect: ReconnectConfig,
        registry: Arc<SubscriptionRegistry>,
        router: Arc<Router>,
    ) -> (Self, SessionHandle, Inputs) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (link_events_tx, link_events) = mpsc::unbounded_channel();
        let (timers_tx, timers) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (status_tx, status_rx) = watch::channel(false);

        let session = Self {
            state: SessionState::Idle,
            generation: 0,
            link: None,
            reconnect: None,
            backoff: reconnect.into(),
            connector,
            endpoint,
            registry,
            router,
            state_tx,
            status_tx,
            link_events_tx,
            timers_tx,
        };
        let handle = SessionHandle {
            commands: commands_tx,
            state: state_rx,
            status: status_rx,
        };
        let inputs = Inputs {
            commands,
            link_events,
            timers,
        };

        (session, handle, inputs)
    }

    /// Create a session and drive it on a background task.
    pub(crate) fn spawn(
        connector: Arc<dyn Connector>,
        endpoint: Url,
        reconnect: ReconnectConfig,
        registry: Arc<SubscriptionRegistry>,
        router: Arc<Router>,
    ) -> SessionHandle {
        let (session, handle, inputs) = Self::new(connector, endpoint, reconnect, registry, router);
        tokio::spawn(session.run(inputs));
        handle
    }

    /// Process inputs until every [`SessionHandle`] is gone.
    pub(crate) async fn run(mut self, inputs: Inputs) {
        let Inputs {
            mut commands,
            mut link_events,
            mut timers,
        } = inputs;

        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => break,
                    }
                }
                Some(event) = link_events.recv() => self.handle_link_event(event),
                Some(generation) = timers.recv() => self.handle_reconnect_due(generation),
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("All client handles dropped, stopping telemetry session");
        self.release();
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect => self.disconnect(),
            Command::Subscribe(device_id) => self.subscribe(device_id),
            Command::Unsubscribe(device_id) => self.unsubscribe(&device_id),
            Command::Send(request) => self.send(&request),
        }
    }

    pub(crate) fn handle_link_event(&mut self, event: LinkEvent) {
        let current = self.link.as_ref().map(|active| active.link.generation());
        if current != Some(event.generation) || event.generation != self.generation {
            #[cfg(feature = "tracing")]
            tracing::trace!(
                generation = event.generation,
                current = self.generation,
                "Ignoring event from superseded link"
            );
            return;
        }

        match event.kind {
            LinkEventKind::Opened => self.on_opened(),
            LinkEventKind::Frame(text) => self.on_frame(&text),
            LinkEventKind::Closed(reason) => self.on_link_closed(reason),
        }
    }

    pub(crate) fn handle_reconnect_due(&mut self, generation: u64) {
        if generation != self.generation || self.state != SessionState::ReconnectPending {
            #[cfg(feature = "tracing")]
            tracing::trace!(
                generation,
                current = self.generation,
                "Ignoring stale reconnect timer"
            );
            return;
        }

        self.start_connecting();
    }

    fn connect(&mut self) {
        match self.state {
            SessionState::Connecting | SessionState::Open => {
                #[cfg(feature = "tracing")]
                tracing::debug!(state = %self.state, "Connect requested while already active");
            }
            SessionState::Idle | SessionState::ReconnectPending | SessionState::Closed => {
                self.start_connecting();
            }
        }
    }

    fn disconnect(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        self.generation += 1;
        self.release();
        self.set_state(SessionState::Closed);
    }

    fn start_connecting(&mut self) {
        self.reconnect = None;
        self.generation += 1;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            generation = self.generation,
            endpoint = %self.endpoint,
            "Connecting to telemetry endpoint"
        );

        let link = Link::spawn(
            Arc::clone(&self.connector),
            self.endpoint.clone(),
            self.generation,
            self.link_events_tx.clone(),
        );
        self.link = Some(ActiveLink {
            link,
            subscribed: HashSet::new(),
        });
        self.set_state(SessionState::Connecting);
    }

    fn on_opened(&mut self) {
        if self.state != SessionState::Connecting {
            return;
        }

        self.set_state(SessionState::Open);

        let Some(active) = self.link.as_mut() else {
            return;
        };
        self.registry.replay(|request| {
            if active.send(&request) {
                active.subscribed.insert(request.device_id().to_owned());
            }
        });
    }

    fn on_frame(&mut self, text: &str) {
        if self.state != SessionState::Open {
            #[cfg(feature = "tracing")]
            tracing::trace!(state = %self.state, "Dropping frame received before open");
            return;
        }

        if text.trim().is_empty() {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(%text, "Received telemetry frame");

        match codec::decode(text) {
            Ok(message) => {
                self.router.route(message);
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%text, error = %e, "Dropping undecodable frame");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
            }
        }
    }

    fn on_link_closed(&mut self, reason: Option<Error>) {
        #[cfg(feature = "tracing")]
        let cause = reason
            .as_ref()
            .map_or_else(|| "closed by peer".to_owned(), ToString::to_string);
        #[cfg(feature = "tracing")]
        tracing::warn!(state = %self.state, %cause, "Telemetry transport ended");
        #[cfg(not(feature = "tracing"))]
        let _ = &reason;

        match self.state {
            SessionState::Connecting | SessionState::Open => self.schedule_reconnect(),
            _ => {}
        }
    }

    fn schedule_reconnect(&mut self) {
        self.release();
        self.generation += 1;

        let delay = self
            .backoff
            .next_backoff()
            .unwrap_or(ReconnectConfig::default().delay);

        #[cfg(feature = "tracing")]
        tracing::debug!(?delay, generation = self.generation, "Scheduling reconnect");

        self.reconnect = Some(ReconnectTimer::spawn(
            delay,
            self.generation,
            self.timers_tx.clone(),
        ));
        self.set_state(SessionState::ReconnectPending);
    }

    fn subscribe(&mut self, device_id: String) {
        if !self.state.is_open() || !self.registry.contains(&device_id) {
            return;
        }
        let Some(active) = self.link.as_mut() else {
            return;
        };
        if active.subscribed.contains(&device_id) {
            return;
        }

        if active.send(&Request::subscribe(device_id.as_str())) {
            active.subscribed.insert(device_id);
        }
    }

    fn unsubscribe(&mut self, device_id: &str) {
        if !self.state.is_open() || self.registry.contains(device_id) {
            return;
        }
        let Some(active) = self.link.as_mut() else {
            return;
        };

        if active.subscribed.remove(device_id) {
            active.send(&Request::unsubscribe(device_id));
        }
    }

    fn send(&self, request: &Request) {
        match &self.link {
            Some(active) if self.state.is_open() => {
                active.send(request);
            }
            _ => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    device_id = request.device_id(),
                    state = %self.state,
                    "Dropping request while session is not open"
                );
            }
        }
    }

    /// Drop the link and the reconnect timer, and forget the connection's client id.
    fn release(&mut self) {
        self.link = None;
        self.reconnect = None;
        self.router.clear_client_id();
    }

    fn set_state(&mut self, state: SessionState) {
        #[cfg(feature = "tracing")]
        tracing::debug!(from = %self.state, to = %state, "Session state changed");

        self.state = state;
        self.state_tx.send_replace(state);
        self.status_tx.send_if_modified(|open| {
            let changed = *open != state.is_open();
            *open = state.is_open();
            changed
        });
    }
}
