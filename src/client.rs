//! Client builder and runtime loop.
//!
//! The [`ClientBuilder`] configures the engine and binds it to a transport.
//! The [`Client`] owns the transport and drives the protocol:
//! 1. Open the channel and perform the handshake
//! 2. Turn submitted activities into `SET_ACTIVITY` commands
//! 3. Write queued commands, then peek for one inbound message
//! 4. Correlate responses to their callbacks by nonce
//! 5. Reconnect and resubmit the last activity when the channel drops
//!
//! A [`ClientHandle`] is the cloneable way in once the loop is running.
//!
//! # Example
//!
//! ```ignore
//! use presence_client::activity::Activity;
//! use presence_client::transport::PipeTransport;
//! use presence_client::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder("1355907951155740785").build(PipeTransport::new());
//!     let handle = client.handle();
//!     tokio::spawn(client.run());
//!
//!     let mut activity = Activity::new();
//!     activity.set_details("Editing main.rs");
//!     let reply = handle.set_activity(activity).await?;
//!     println!("{reply}");
//!
//!     handle.shutdown();
//!     Ok(())
//! }
//! ```

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::activity::Activity;
use crate::codec::payload::{Envelope, Handshake, SetActivityCommand};
use crate::codec::JsonCodec;
use crate::error::{PresenceError, Result};
use crate::nonce::NonceGenerator;
use crate::outbound::{OutboundMessage, OutboundQueue};
use crate::pending::{Callback, PendingCalls};
use crate::protocol::{opcode, read_message, write_message, Message};
use crate::settings::{ClientSettings, DEFAULT_EVENT_CAPACITY};
use crate::transport::Transport;

/// Connection lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Handshake completed.
    Connected,
    /// An open channel was closed, deliberately or after a failure.
    Disconnected,
}

/// Whether the channel to the host is currently usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Requests executed by the loop task.
enum Command {
    SetActivity {
        activity: Option<Activity>,
        callback: Callback,
    },
    Reconnect(oneshot::Sender<Result<()>>),
    Disconnect(oneshot::Sender<Result<()>>),
}

impl Command {
    /// Answer the command without executing it.
    fn reject(self) {
        match self {
            Command::SetActivity { callback, .. } => callback(Err(PresenceError::ChannelNotOpen)),
            Command::Reconnect(reply) | Command::Disconnect(reply) => {
                let _ = reply.send(Err(PresenceError::ChannelNotOpen));
            }
        }
    }
}

/// Builder for configuring and creating a presence client.
pub struct ClientBuilder {
    client_id: String,
    settings: ClientSettings,
    nonce_seed: Option<u64>,
    event_capacity: usize,
}

impl ClientBuilder {
    /// Create a builder for the given application id.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            settings: ClientSettings::default(),
            nonce_seed: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Reconnect from the loop when the channel is closed.
    ///
    /// Default: true
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.settings.auto_reconnect = enabled;
        self
    }

    /// Set the wait after a failed reconnect attempt.
    ///
    /// Default: 5 seconds
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.settings.reconnect_interval = interval;
        self
    }

    /// Set the wait between loop iterations.
    ///
    /// Default: 100 milliseconds
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.settings.poll_interval = interval;
        self
    }

    /// Set the upper bound for the handshake reply.
    ///
    /// Default: 10 seconds
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.settings.handshake_timeout = timeout;
        self
    }

    /// Set the upper bound for finishing a frame once it has started
    /// arriving.
    ///
    /// Default: 5 seconds
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.settings.read_timeout = timeout;
        self
    }

    /// Set the largest inbound payload accepted.
    ///
    /// Default: 64 KiB
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.settings.max_payload_size = size;
        self
    }

    /// Replace all settings at once.
    pub fn settings(mut self, settings: ClientSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Seed the nonce generator for a reproducible sequence.
    pub fn nonce_seed(mut self, seed: u64) -> Self {
        self.nonce_seed = Some(seed);
        self
    }

    /// Set the lifecycle event channel capacity.
    ///
    /// Default: 16
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Bind the engine to a transport. Nothing is opened yet.
    pub fn build<T: Transport>(self, transport: T) -> Client<T> {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(self.event_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let nonces = match self.nonce_seed {
            Some(seed) => NonceGenerator::with_seed(seed),
            None => NonceGenerator::new(),
        };

        Client {
            transport,
            client_id: self.client_id,
            settings: self.settings,
            nonces,
            pending: PendingCalls::new(),
            outbound: OutboundQueue::new(),
            snapshot: None,
            handle: ClientHandle {
                commands: commands_tx,
                events,
                shutdown: Arc::new(shutdown_tx),
            },
            commands: commands_rx,
            shutdown: shutdown_rx,
            finished: false,
        }
    }
}

/// Cloneable handle for talking to a [`Client`] from any task.
#[derive(Clone)]
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<LifecycleEvent>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl ClientHandle {
    /// Publish an activity.
    ///
    /// Never blocks. The callback runs on the loop task with the host's
    /// response, or with the error that prevented one.
    ///
    /// Once the engine has stopped there is no loop task left: the callback
    /// then runs right here, before this returns, with
    /// [`ChannelNotOpen`](PresenceError::ChannelNotOpen). Do not hold a lock
    /// the callback takes while submitting.
    pub fn submit_activity<F>(&self, activity: Activity, callback: F)
    where
        F: FnOnce(Result<Message>) + Send + 'static,
    {
        self.submit(Some(activity), Box::new(callback));
    }

    /// Clear the activity. Same delivery rules as [`submit_activity`](Self::submit_activity).
    pub fn clear_activity<F>(&self, callback: F)
    where
        F: FnOnce(Result<Message>) + Send + 'static,
    {
        self.submit(None, Box::new(callback));
    }

    /// Publish an activity and wait for the host's answer.
    pub async fn set_activity(&self, activity: Activity) -> Result<Message> {
        self.request(Some(activity)).await
    }

    /// Clear the activity and wait for the host's answer.
    pub async fn clear(&self) -> Result<Message> {
        self.request(None).await
    }

    /// Close and reopen the channel on the loop task.
    pub async fn reconnect(&self) -> Result<()> {
        self.lifecycle(Command::Reconnect).await
    }

    /// Close the channel on the loop task. With auto-reconnect enabled the
    /// loop opens it again on a later iteration.
    pub async fn disconnect(&self) -> Result<()> {
        self.lifecycle(Command::Disconnect).await
    }

    /// Receive lifecycle events raised from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Ask the loop to stop. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Whether the engine has stopped accepting commands.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn submit(&self, activity: Option<Activity>, callback: Callback) {
        if let Err(mpsc::error::SendError(command)) =
            self.commands.send(Command::SetActivity { activity, callback })
        {
            command.reject();
        }
    }

    async fn request(&self, activity: Option<Activity>) -> Result<Message> {
        let (tx, rx) = oneshot::channel();
        self.submit(
            activity,
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        );
        rx.await.unwrap_or(Err(PresenceError::ChannelNotOpen))
    }

    async fn lifecycle(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<()>>) -> Command,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(command(tx)).is_err() {
            return Err(PresenceError::ChannelNotOpen);
        }
        rx.await.unwrap_or(Err(PresenceError::ChannelNotOpen))
    }
}

/// The protocol engine.
///
/// Owns the transport. Lifecycle methods take `&mut self`; once
/// [`run`](Self::run) consumes the client, use a [`ClientHandle`].
pub struct Client<T> {
    transport: T,
    client_id: String,
    settings: ClientSettings,
    nonces: NonceGenerator,
    pending: PendingCalls,
    outbound: OutboundQueue,
    /// Last submitted activity, resubmitted after a reconnect.
    snapshot: Option<Activity>,
    handle: ClientHandle,
    commands: mpsc::UnboundedReceiver<Command>,
    shutdown: watch::Receiver<bool>,
    finished: bool,
}

impl Client<()> {
    /// Create a new client builder.
    pub fn builder(client_id: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(client_id)
    }
}

impl<T: Transport> Client<T> {
    /// Open the channel and perform the handshake.
    ///
    /// On any failure the channel is closed again so a later attempt starts
    /// clean. Failures are returned, never retried here.
    pub async fn connect(&mut self) -> Result<()> {
        match self.handshake().await {
            Ok(()) => {
                tracing::info!(client_id = %self.client_id, "Connected to presence host");
                let _ = self.handle.events.send(LifecycleEvent::Connected);
                Ok(())
            }
            Err(e) => {
                self.transport.cancel_pending_io();
                if let Err(close_err) = self.transport.close().await {
                    tracing::warn!(error = %close_err, "Failed to close after handshake failure");
                }
                Err(e)
            }
        }
    }

    /// Close the channel. Idempotent; raises `Disconnected` only if it was open.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.drop_connection(|| PresenceError::ChannelNotOpen).await
    }

    /// Disconnect, then connect.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.disconnect().await?;
        self.connect().await
    }

    /// Queue an activity for publishing. See [`ClientHandle::submit_activity`],
    /// including how the callback runs once the engine has stopped.
    pub fn submit_activity<F>(&self, activity: Activity, callback: F)
    where
        F: FnOnce(Result<Message>) + Send + 'static,
    {
        self.handle.submit_activity(activity, callback);
    }

    /// Queue an activity clear. See [`ClientHandle::clear_activity`].
    pub fn clear_activity<F>(&self, callback: F)
    where
        F: FnOnce(Result<Message>) + Send + 'static,
    {
        self.handle.clear_activity(callback);
    }

    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.handle.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        if self.transport.is_open() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Last activity submitted, `None` after a clear.
    pub fn activity(&self) -> Option<&Activity> {
        self.snapshot.as_ref()
    }

    /// Commands awaiting a response (including ones not yet written).
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// Commands not yet written.
    pub fn queued_commands(&self) -> usize {
        self.outbound.len()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run one loop iteration.
    ///
    /// Returns how long to wait before the next one, or `None` once shutdown
    /// has been requested and carried out.
    pub async fn poll_once(&mut self) -> Option<Duration> {
        let stop = *self.shutdown.borrow();
        if stop || self.finished {
            self.finish().await;
            return None;
        }

        self.absorb_commands().await;

        if !self.transport.is_open() {
            if !self.settings.auto_reconnect {
                return Some(self.settings.poll_interval);
            }
            return match self.connect().await {
                Ok(()) => {
                    self.resubmit_snapshot();
                    Some(self.settings.poll_interval)
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retry_in = ?self.settings.reconnect_interval,
                        "Reconnect failed"
                    );
                    Some(self.settings.reconnect_interval)
                }
            };
        }

        let report = self.outbound.drain(&mut self.transport, &mut self.pending).await;
        if report.connection_lost {
            tracing::error!(failed = report.failed, "Lost connection while writing");
            if let Err(e) = self.drop_connection(|| PresenceError::ChannelNotOpen).await {
                tracing::warn!(error = %e, "Failed to close channel");
            }
            return Some(self.settings.poll_interval);
        }

        let read = read_message(&mut self.transport, true, self.settings.max_payload_size);
        let read = match tokio::time::timeout(self.settings.read_timeout, read).await {
            Ok(read) => read,
            Err(_) => Err(timed_out("host stalled in the middle of a frame")),
        };
        match read {
            Ok(message) => self.dispatch(message),
            Err(e) if e.is_no_data() => {}
            Err(e) => {
                tracing::error!(error = %e, "Failed to read from host");
                if e.is_transport_failure() {
                    let lost = || {
                        PresenceError::ReadFailed(io::Error::new(
                            io::ErrorKind::ConnectionAborted,
                            "connection lost before the host answered",
                        ))
                    };
                    if let Err(e) = self.drop_connection(lost).await {
                        tracing::warn!(error = %e, "Failed to close channel");
                    }
                }
            }
        }

        Some(self.settings.poll_interval)
    }

    /// Drive the loop until [`ClientHandle::shutdown`] is called.
    ///
    /// Remaining callbacks are failed with
    /// [`ChannelNotOpen`](PresenceError::ChannelNotOpen) and the channel is
    /// closed before this returns.
    pub async fn run(mut self) -> Result<()> {
        tracing::debug!(client_id = %self.client_id, "Presence loop started");
        let mut shutdown = self.shutdown.clone();

        loop {
            // An iteration stuck on the transport is abandoned on shutdown;
            // the next one finishes.
            let wait = tokio::select! {
                biased;
                wait = self.poll_once() => wait,
                _ = shutdown.wait_for(|stop| *stop) => continue,
            };
            let Some(wait) = wait else {
                break;
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.wait_for(|stop| *stop) => {}
            }
        }

        Ok(())
    }

    async fn handshake(&mut self) -> Result<()> {
        self.transport.open().await?;

        let payload = JsonCodec::encode(&Handshake::new(&self.client_id))?;
        write_message(&mut self.transport, opcode::HANDSHAKE, &payload).await?;

        let read = read_message(&mut self.transport, false, self.settings.max_payload_size);
        let reply = match tokio::time::timeout(self.settings.handshake_timeout, read).await {
            Ok(reply) => reply?,
            Err(_) => return Err(timed_out("no handshake reply from host")),
        };

        tracing::trace!(message = %reply, "Handshake reply");
        if reply.opcode != opcode::FRAME {
            return Err(PresenceError::HandshakeFailed {
                opcode: reply.opcode,
            });
        }
        Ok(())
    }

    /// Close the channel and fail calls that were written but never answered.
    /// Commands still queued survive for the next connection.
    async fn drop_connection(&mut self, reason: impl FnMut() -> PresenceError) -> Result<()> {
        let was_open = self.transport.is_open();
        self.transport.cancel_pending_io();
        let closed = self.transport.close().await;

        if was_open {
            let queued = self.outbound.nonces();
            let failed = self
                .pending
                .fail_matching(|nonce| !queued.contains(nonce), reason);
            tracing::info!(failed, "Disconnected from presence host");
            let _ = self.handle.events.send(LifecycleEvent::Disconnected);
        }
        closed
    }

    async fn absorb_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::SetActivity { activity, callback } => self.enqueue(activity, callback),
                Command::Reconnect(reply) => {
                    let _ = reply.send(self.reconnect().await);
                }
                Command::Disconnect(reply) => {
                    let _ = reply.send(self.disconnect().await);
                }
            }
        }
    }

    fn enqueue(&mut self, activity: Option<Activity>, callback: Callback) {
        let nonce = self.nonces.next_nonce();
        let payload = match SetActivityCommand::new(activity.as_ref(), &nonce).encode() {
            Ok(payload) => payload,
            Err(e) => {
                callback(Err(e));
                return;
            }
        };

        tracing::debug!(
            nonce = %nonce,
            clear = activity.is_none(),
            queued = self.outbound.len() + 1,
            "Queued SET_ACTIVITY"
        );
        self.pending.insert(nonce.clone(), callback);
        self.outbound
            .push(OutboundMessage::new(opcode::FRAME, payload, nonce));
        self.snapshot = activity;
    }

    /// Queue the last activity again after a reconnect. Anything already
    /// queued carries a newer state, so nothing is added in that case.
    fn resubmit_snapshot(&mut self) {
        if !self.outbound.is_empty() {
            return;
        }
        let Some(activity) = self.snapshot.clone() else {
            return;
        };

        tracing::info!("Resubmitting activity after reconnect");
        self.enqueue(
            Some(activity),
            Box::new(|outcome: Result<Message>| match outcome {
                Ok(message) => {
                    tracing::debug!(nonce = ?message.nonce, "Resubmitted activity accepted")
                }
                Err(e) => tracing::warn!(error = %e, "Resubmitted activity failed"),
            }),
        );
    }

    fn dispatch(&mut self, message: Message) {
        tracing::trace!(%message, "Received message");

        let Some(nonce) = message.nonce.clone() else {
            let envelope = Envelope::peek(&message.payload);
            tracing::debug!(
                opcode = message.opcode,
                cmd = ?envelope.cmd,
                evt = ?envelope.evt,
                "Unsolicited host event"
            );
            return;
        };

        let outcome = if message.is_success() {
            tracing::debug!(opcode = message.opcode, nonce = %nonce, "Command succeeded");
            Ok(message)
        } else {
            let envelope = Envelope::peek(&message.payload);
            tracing::warn!(
                opcode = message.opcode,
                nonce = %nonce,
                cmd = ?envelope.cmd,
                evt = ?envelope.evt,
                "Host reported failure"
            );
            Err(PresenceError::CommandFailed(message.text().to_string()))
        };
        if !self.pending.complete(&nonce, outcome) {
            tracing::warn!(nonce = %nonce, "No pending call for response");
        }
    }

    async fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            command.reject();
        }
        self.outbound.clear();
        let failed = self.pending.fail_all(|| PresenceError::ChannelNotOpen);

        let was_open = self.transport.is_open();
        self.transport.cancel_pending_io();
        if let Err(e) = self.transport.close().await {
            tracing::warn!(error = %e, "Failed to close channel on shutdown");
        }
        if was_open {
            let _ = self.handle.events.send(LifecycleEvent::Disconnected);
        }
        tracing::info!(failed, "Presence loop stopped");
    }
}

fn timed_out(context: &'static str) -> PresenceError {
    PresenceError::ReadFailed(io::Error::new(io::ErrorKind::TimedOut, context))
}
