//! Shard connection controller
//!
//! One controller per shard, each in its own task. The controller owns the
//! socket, the heartbeat timer and the session, and is the only writer of all
//! three: socket reads, heartbeat ticks, identify turns, user commands and the
//! shutdown signal are multiplexed in a single `select!` loop. Dispatch
//! handlers run on a second per-shard task fed in arrival order.

use super::handle::{CommandRequest, ShardHandle};
use super::{ConnectionPhase, GatewayCommand, LifecycleListener};
use crate::backoff::Backoff;
use crate::config::GatewayConfig;
use crate::dispatch::DispatchRouter;
use crate::error::{CommandError, DisconnectCause, FatalRejection, TransportError};
use crate::heartbeat::{HeartbeatAction, HeartbeatState, HeartbeatTimer};
use crate::protocol::{
    codec, CloseCode, Envelope, IdentifyPayload, KnownEvent, OpCode, NORMAL_CLOSURE,
    RESUMABLE_CLOSURE,
};
use crate::session::{SessionState, ShardInfo};
use crate::shard::{IdentifyGate, IdentifyPermit};
use crate::transport::{CloseFrame, Connector, Frame, Transport};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Sleep};
use tracing::{Instrument, Span};

/// How long to wait for our own close frame to be flushed
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

const COMMAND_BUFFER: usize = 32;

type IdentifyTurn = Pin<Box<dyn Future<Output = IdentifyPermit> + Send>>;

/// How a connection ended
#[derive(Debug)]
enum Exit {
    Reconnect(DisconnectCause),
    Stop(FatalRejection),
}

/// Per-connection state, dropped when the connection ends
struct Link {
    transport: Box<dyn Transport>,
    heartbeat: Option<HeartbeatState>,
    timer: Option<HeartbeatTimer>,
    identify: Option<IdentifyTurn>,
    hello_deadline: Option<Pin<Box<Sleep>>>,
}

/// Feeds dispatches to the shard's handler task in arrival order
///
/// The task is aborted when the queue is dropped, so a handler that never
/// finishes cannot outlive its shard.
struct DispatchQueue {
    sender: mpsc::UnboundedSender<Envelope>,
    task: JoinHandle<()>,
}

impl DispatchQueue {
    fn spawn(shard: ShardInfo, router: Arc<DispatchRouter>, span: Span) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Envelope>();
        let task = tokio::spawn(
            async move {
                while let Some(envelope) = receiver.recv().await {
                    router.route(shard, &envelope).await;
                }
            }
            .instrument(span),
        );
        Self { sender, task }
    }

    fn push(&self, envelope: Envelope) {
        if self.sender.send(envelope).is_err() {
            tracing::warn!("Dispatch task stopped, dropping event");
        }
    }
}

impl Drop for DispatchQueue {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Everything a controller needs from its owner
#[derive(Clone)]
pub struct ControllerContext {
    pub config: Arc<GatewayConfig>,
    pub connector: Arc<dyn Connector>,
    pub router: Arc<DispatchRouter>,
    pub gate: IdentifyGate,
    pub listener: Arc<dyn LifecycleListener>,
}

/// The per-shard connection state machine
pub struct ShardController {
    ctx: ControllerContext,
    session: SessionState,
    backoff: Backoff,
    phase: watch::Sender<ConnectionPhase>,
    commands: mpsc::Receiver<CommandRequest>,
    shutdown: watch::Receiver<bool>,
    dispatches: DispatchQueue,
}

impl ShardController {
    /// Start a controller task for `shard` and return its handle
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(shard: ShardInfo, ctx: ControllerContext) -> ShardHandle {
        let (phase_tx, phase_rx) = watch::channel(ConnectionPhase::Disconnected);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let span = tracing::info_span!("shard", shard_id = shard.id, shard_count = shard.count);
        let dispatches = DispatchQueue::spawn(shard, Arc::clone(&ctx.router), span.clone());

        let controller = Self {
            session: SessionState::new(ctx.config.token.clone(), shard),
            backoff: Backoff::new(ctx.config.reconnect.clone()),
            ctx,
            phase: phase_tx,
            commands: command_rx,
            shutdown: shutdown_rx,
            dispatches,
        };

        let task = tokio::spawn(controller.run().instrument(span));

        ShardHandle::new(shard, phase_rx, command_tx, shutdown_tx, task)
    }

    fn shard(&self) -> ShardInfo {
        self.session.shard()
    }

    fn current_phase(&self) -> ConnectionPhase {
        *self.phase.borrow()
    }

    fn set_phase(&self, next: ConnectionPhase) {
        let current = self.current_phase();
        if current == next {
            return;
        }
        if !current.allows(next) {
            tracing::warn!(from = %current, to = %next, "Unexpected phase transition");
        }
        tracing::debug!(from = %current, to = %next, "Phase changed");
        self.phase.send_replace(next);
        self.ctx.listener.on_phase(self.shard(), next);
    }

    fn publish_session(&self) {
        self.ctx.listener.on_session(self.shard(), &self.session.snapshot());
    }

    async fn run(mut self) {
        tracing::info!("Shard starting");

        let rejection = loop {
            if *self.shutdown.borrow() {
                break FatalRejection::Shutdown;
            }

            let exit = match self.connect().await {
                Ok(transport) => self.drive(transport).await,
                Err(exit) => exit,
            };

            match exit {
                Exit::Reconnect(cause) => {
                    if let Err(rejection) = self.wait_backoff(cause).await {
                        break rejection;
                    }
                }
                Exit::Stop(rejection) => break rejection,
            }
        };

        self.set_phase(ConnectionPhase::FatallyClosed);
        match &rejection {
            FatalRejection::Shutdown => tracing::info!("Shard stopped"),
            FatalRejection::Rejected { code } => {
                tracing::error!(close_code = code.as_u16(), reason = %code, "Shard rejected by gateway");
            }
        }
        self.ctx.listener.on_fatal(self.shard(), &rejection);
    }

    /// Open a socket, resuming at the session's resume URL when possible
    async fn connect(&mut self) -> Result<Box<dyn Transport>, Exit> {
        self.set_phase(ConnectionPhase::Connecting);

        let base = match self.session.resume_url() {
            Some(url) if self.session.can_resume() => url,
            _ => self.ctx.config.url.as_str(),
        };
        let url = self.ctx.config.connect_url(base);
        tracing::debug!(url = %url, resume = self.session.can_resume(), "Connecting");

        let connector = Arc::clone(&self.ctx.connector);
        let timeout = self.ctx.config.connect_timeout;
        let attempt = async move { time::timeout(timeout, connector.connect(&url)).await };
        tokio::pin!(attempt);

        loop {
            tokio::select! {
                biased;
                () = shutdown_requested(&mut self.shutdown) => {
                    return Err(Exit::Stop(FatalRejection::Shutdown));
                }
                result = &mut attempt => {
                    return match result {
                        Ok(Ok(transport)) => Ok(transport),
                        Ok(Err(e)) => Err(Exit::Reconnect(e.into())),
                        Err(_) => Err(Exit::Reconnect(TransportError::Timeout.into())),
                    };
                }
                Some((_, reply)) = self.commands.recv() => {
                    let _ = reply.send(Err(CommandError::NotConnected));
                }
            }
        }
    }

    /// Sleep out the backoff delay; `Err` if shutdown was requested meanwhile
    async fn wait_backoff(&mut self, cause: DisconnectCause) -> Result<(), FatalRejection> {
        self.set_phase(ConnectionPhase::Reconnecting);

        let delay = self.backoff.next_delay();
        let attempt = self.backoff.attempts();
        tracing::warn!(
            cause = %cause,
            attempt = attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            resumable = self.session.can_resume(),
            "Connection lost, reconnecting"
        );
        self.ctx
            .listener
            .on_reconnect_scheduled(self.shard(), attempt, delay, &cause);

        let sleep = time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                () = shutdown_requested(&mut self.shutdown) => return Err(FatalRejection::Shutdown),
                () = &mut sleep => return Ok(()),
                Some((_, reply)) = self.commands.recv() => {
                    let _ = reply.send(Err(CommandError::NotConnected));
                }
            }
        }
    }

    /// Run one connection until it ends
    async fn drive(&mut self, transport: Box<dyn Transport>) -> Exit {
        self.set_phase(ConnectionPhase::AwaitingHello);

        let mut link = Link {
            transport,
            heartbeat: None,
            timer: None,
            identify: None,
            hello_deadline: Some(Box::pin(time::sleep(self.ctx.config.connect_timeout))),
        };

        let exit = loop {
            tokio::select! {
                biased;
                () = shutdown_requested(&mut self.shutdown) => {
                    break Exit::Stop(FatalRejection::Shutdown);
                }
                frame = link.transport.recv() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => break Exit::Reconnect(e.into()),
                        None => break Exit::Reconnect(DisconnectCause::ServerClosed {
                            code: None,
                            reason: "connection dropped".to_string(),
                        }),
                    };
                    if let Some(exit) = self.on_frame(&mut link, frame).await {
                        break exit;
                    }
                }
                Some(()) = next_tick(&mut link.timer) => {
                    if let Some(exit) = self.on_heartbeat_tick(&mut link).await {
                        break exit;
                    }
                }
                permit = next_turn(&mut link.identify) => {
                    link.identify = None;
                    if let Err(exit) = self.send_identify(&mut link, permit).await {
                        break exit;
                    }
                }
                () = deadline(&mut link.hello_deadline) => {
                    break Exit::Reconnect(DisconnectCause::Transport("no hello received".to_string()));
                }
                Some((command, reply)) = self.commands.recv() => {
                    let result = self.send_command(&mut link, command).await;
                    let _ = reply.send(result);
                }
            }
        };

        // The timer must stop before the socket goes away
        link.timer = None;
        link.identify = None;

        let code = match exit {
            Exit::Stop(FatalRejection::Shutdown) => NORMAL_CLOSURE,
            _ => RESUMABLE_CLOSURE,
        };
        match time::timeout(CLOSE_TIMEOUT, link.transport.close(code, "")).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "Error closing socket"),
            Err(_) => tracing::debug!("Timed out closing socket"),
        }

        exit
    }

    async fn on_frame(&mut self, link: &mut Link, frame: Frame) -> Option<Exit> {
        let decoded = match frame {
            Frame::Text(text) => codec::decode(&text),
            Frame::Binary(data) => codec::decode_binary(&data),
            Frame::Close(close) => return Some(self.on_close(close)),
        };

        match decoded {
            Ok(envelope) => self.on_envelope(link, envelope).await,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed frame");
                None
            }
        }
    }

    fn on_close(&mut self, close: Option<CloseFrame>) -> Exit {
        let Some(CloseFrame { code, reason }) = close else {
            return Exit::Reconnect(DisconnectCause::ServerClosed {
                code: None,
                reason: String::new(),
            });
        };

        match CloseCode::from_u16(code) {
            Some(close_code) if close_code.is_fatal() => {
                Exit::Stop(FatalRejection::Rejected { code: close_code })
            }
            Some(close_code) => {
                if close_code.invalidates_session() {
                    tracing::info!(close_code = code, "Session invalidated by close code");
                    self.session.invalidate();
                    self.publish_session();
                }
                Exit::Reconnect(DisconnectCause::ServerClosed {
                    code: Some(code),
                    reason,
                })
            }
            None => Exit::Reconnect(DisconnectCause::ServerClosed {
                code: Some(code),
                reason,
            }),
        }
    }

    async fn on_envelope(&mut self, link: &mut Link, envelope: Envelope) -> Option<Exit> {
        match envelope.op {
            OpCode::Hello => self.on_hello(link, &envelope).await.err(),
            OpCode::HeartbeatAck => {
                if let Some(heartbeat) = link.heartbeat.as_mut() {
                    let latency = heartbeat.on_ack();
                    tracing::trace!(latency_ms = ?latency.map(|l| l.as_millis()), "Heartbeat acknowledged");
                    self.ctx.listener.on_heartbeat_ack(self.shard(), latency);
                }
                None
            }
            OpCode::Heartbeat => {
                tracing::debug!("Server requested heartbeat");
                write_envelope(link, &Envelope::heartbeat(self.session.last_sequence()))
                    .await
                    .err()
            }
            OpCode::Dispatch => {
                self.on_dispatch(envelope);
                None
            }
            OpCode::Reconnect => {
                tracing::info!("Server requested reconnect");
                self.session.request_reconnect();
                Some(Exit::Reconnect(DisconnectCause::ReconnectRequested))
            }
            OpCode::InvalidSession => {
                let resumable = envelope.as_invalid_session().unwrap_or(false);
                tracing::info!(resumable = resumable, "Session invalidated by server");
                if !resumable {
                    self.session.invalidate();
                    self.publish_session();
                }
                Some(Exit::Reconnect(DisconnectCause::SessionInvalidated { resumable }))
            }
            op => {
                tracing::debug!(op = %op, "Ignoring unexpected op code");
                None
            }
        }
    }

    /// Start heartbeating, then resume or queue for an identify turn
    async fn on_hello(&mut self, link: &mut Link, envelope: &Envelope) -> Result<(), Exit> {
        if self.current_phase() != ConnectionPhase::AwaitingHello {
            tracing::warn!(phase = %self.current_phase(), "Ignoring duplicate hello");
            return Ok(());
        }
        let Some(hello) = envelope.as_hello() else {
            tracing::warn!(payload = %envelope.d, "Hello without heartbeat interval");
            return Ok(());
        };

        let interval = Duration::from_millis(hello.heartbeat_interval);
        let first_delay = interval.mul_f64(self.ctx.config.heartbeat_jitter.sample());
        link.hello_deadline = None;
        link.heartbeat = Some(HeartbeatState::new(interval));
        link.timer = Some(HeartbeatTimer::start(interval, first_delay));

        let reconnect_requested = self.session.take_reconnect_request();

        if let Some(resume) = self.session.resume_payload() {
            tracing::info!(
                session_id = %resume.session_id,
                seq = ?resume.seq,
                reconnect_requested = reconnect_requested,
                "Resuming session"
            );
            self.set_phase(ConnectionPhase::Resuming);
            let envelope = Envelope::resume(&resume)
                .map_err(|e| Exit::Reconnect(DisconnectCause::Transport(e.to_string())))?;
            write_envelope(link, &envelope).await
        } else {
            tracing::debug!(heartbeat_interval_ms = hello.heartbeat_interval, "Waiting for identify turn");
            self.set_phase(ConnectionPhase::Identifying);
            link.identify = Some(Box::pin(self.ctx.gate.acquire()));
            Ok(())
        }
    }

    async fn send_identify(&mut self, link: &mut Link, permit: IdentifyPermit) -> Result<(), Exit> {
        let config = &self.ctx.config;
        let payload = IdentifyPayload {
            token: self.session.token().to_string(),
            properties: config.properties.clone(),
            shard: self.shard().as_array(),
            intents: config.intents,
            large_threshold: config.large_threshold,
            compress: false,
        };
        let envelope = Envelope::identify(&payload)
            .map_err(|e| Exit::Reconnect(DisconnectCause::Transport(e.to_string())))?;

        tracing::info!(intents = payload.intents.bits(), "Identifying");
        let result = write_envelope(link, &envelope).await;
        drop(permit);
        result
    }

    async fn on_heartbeat_tick(&mut self, link: &mut Link) -> Option<Exit> {
        let action = link.heartbeat.as_mut()?.on_tick();
        match action {
            HeartbeatAction::LivenessFailure => Some(Exit::Reconnect(DisconnectCause::LivenessFailure)),
            HeartbeatAction::Send => {
                let seq = self.session.last_sequence();
                tracing::trace!(seq = ?seq, "Sending heartbeat");
                write_envelope(link, &Envelope::heartbeat(seq)).await.err()
            }
        }
    }

    /// Update the session, then queue the event for handlers
    fn on_dispatch(&mut self, envelope: Envelope) {
        if let Some(seq) = envelope.s {
            self.session.record_dispatch(seq);
        }

        let event = envelope.event_name().and_then(KnownEvent::parse);
        match event {
            Some(KnownEvent::Ready) => match envelope.as_ready() {
                Some(ready) => {
                    tracing::info!(session_id = %ready.session_id, "Session ready");
                    self.session
                        .capture_identity(ready.session_id, ready.resume_gateway_url);
                }
                None => tracing::warn!("READY without session id"),
            },
            Some(KnownEvent::Resumed) => {
                tracing::info!(seq = ?self.session.last_sequence(), "Session resumed");
            }
            _ => {}
        }
        if event.is_some_and(KnownEvent::completes_handshake) {
            self.mark_connected();
        }
        self.publish_session();

        self.dispatches.push(envelope);
    }

    fn mark_connected(&mut self) {
        match self.current_phase() {
            ConnectionPhase::Identifying | ConnectionPhase::Resuming => {
                self.backoff.reset();
                self.set_phase(ConnectionPhase::Connected);
            }
            phase => tracing::debug!(phase = %phase, "Handshake event outside of handshake"),
        }
    }

    async fn send_command(
        &self,
        link: &mut Link,
        command: GatewayCommand,
    ) -> Result<(), CommandError> {
        if !self.current_phase().accepts_commands() {
            return Err(CommandError::NotConnected);
        }
        let text = codec::encode(&command.into_envelope())?;
        link.transport.send_text(text).await?;
        Ok(())
    }
}

async fn write_envelope(link: &mut Link, envelope: &Envelope) -> Result<(), Exit> {
    let text = codec::encode(envelope)
        .map_err(|e| Exit::Reconnect(DisconnectCause::Transport(e.to_string())))?;
    link.transport
        .send_text(text)
        .await
        .map_err(|e| Exit::Reconnect(e.into()))
}

/// Resolves once shutdown has been requested or the handle is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn next_tick(timer: &mut Option<HeartbeatTimer>) -> Option<()> {
    match timer {
        Some(timer) => timer.tick().await,
        None => std::future::pending().await,
    }
}

async fn next_turn(turn: &mut Option<IdentifyTurn>) -> IdentifyPermit {
    match turn {
        Some(turn) => turn.await,
        None => std::future::pending().await,
    }
}

async fn deadline(sleep: &mut Option<Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.await,
        None => std::future::pending().await,
    }
}
