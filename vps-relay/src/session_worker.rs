//! Session-handling unit.
//!
//! Owns the client listener and the session registry. Every accepted
//! socket gets a framed reader task and a writer task; the worker loop
//! itself stays single-threaded over the registry, so admission and
//! fan-out need no locking. Device-bound work leaves through the
//! supervisor channel; mirroring traffic arrives on it.

use std::collections::HashMap;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;

use vps_core::frame::Frame;
use vps_core::{command, ConnectionType, FrameCodec, RelayConfig, RelayMessage};

use crate::multiplexer::SessionRegistry;
use crate::session::{ClientSession, SessionAction};

enum SocketEvent {
    Frame { token: u64, frame: Frame },
    Closed { token: u64 },
}

pub struct SessionWorker {
    config: RelayConfig,
    registry: SessionRegistry,
    readers: HashMap<u64, JoinHandle<()>>,
    next_token: u64,
}

impl SessionWorker {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            registry: SessionRegistry::new(),
            readers: HashMap::new(),
            next_token: 0,
        }
    }

    /// Run until the supervisor channel closes.
    pub async fn run(
        mut self,
        listener: TcpListener,
        mut inbound: mpsc::Receiver<RelayMessage>,
        outbound: mpsc::Sender<RelayMessage>,
    ) {
        let (events_tx, mut events_rx) = mpsc::channel::<SocketEvent>(256);
        tracing::info!(addr = ?listener.local_addr().ok(), "session worker listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "client connected");
                        self.accept(stream, events_tx.clone());
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                },
                Some(event) = events_rx.recv() => match event {
                    SocketEvent::Frame { token, frame } => {
                        self.handle_client_frame(token, frame, &outbound).await;
                    }
                    SocketEvent::Closed { token } => {
                        self.close_session(token, &outbound).await;
                    }
                },
                message = inbound.recv() => match message {
                    Some(message) => self.handle_relay_message(message),
                    None => {
                        tracing::info!("session worker stopping");
                        break;
                    }
                },
            }
        }

        for (_, handle) in self.readers.drain() {
            handle.abort();
        }
    }

    fn accept(&mut self, stream: tokio::net::TcpStream, events: mpsc::Sender<SocketEvent>) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(error = %e, "set_nodelay failed");
        }
        self.next_token += 1;
        let token = self.next_token;

        let (read_half, write_half) = stream.into_split();
        let (writer_tx, writer_rx) = mpsc::channel::<Bytes>(100);
        tokio::spawn(write_loop(write_half, writer_rx));

        let codec = FrameCodec::new(self.config.device.max_devices);
        let reader = tokio::spawn(async move {
            let mut frames = FramedRead::new(read_half, codec);
            while let Some(result) = frames.next().await {
                match result {
                    Ok(frame) => {
                        if events.send(SocketEvent::Frame { token, frame }).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        // Desynchronized stream: drop the connection.
                        tracing::warn!(token, error = %e, "malformed client frame, closing");
                        break;
                    }
                }
            }
            let _ = events.send(SocketEvent::Closed { token }).await;
        });

        self.registry.insert_pending(token, ClientSession::new(writer_tx));
        self.readers.insert(token, reader);
    }

    async fn handle_client_frame(
        &mut self,
        token: u64,
        frame: Frame,
        outbound: &mpsc::Sender<RelayMessage>,
    ) {
        let Some(session) = self.registry.get_mut(token) else {
            return;
        };
        let actions = match session.handle_frame(frame) {
            Ok(actions) => actions,
            Err(e) => {
                tracing::warn!(token, error = %e, "bad client frame, closing session");
                self.close_session(token, outbound).await;
                return;
            }
        };

        for action in actions {
            match action {
                SessionAction::Register => self.register_session(token, outbound).await,
                SessionAction::Disconnect => self.close_session(token, outbound).await,
                SessionAction::DisconnectGuest { guest_id, frame } => {
                    let device = frame.device;
                    match self.registry.find_guest(device, &guest_id) {
                        Some(guest) => {
                            if let Some(session) = self.registry.get_mut(guest) {
                                session.send(&frame);
                            }
                            self.close_session(guest, outbound).await;
                        }
                        None => {
                            tracing::warn!(device, guest_id = %guest_id, "guest to evict not found");
                        }
                    }
                }
                SessionAction::UpdateGuestTime(frame)
                | SessionAction::BroadcastSessions(frame) => {
                    self.registry.broadcast_frame(frame.device, &frame);
                }
                SessionAction::SendController(frame) => {
                    if !self.registry.send_controller(&frame) {
                        tracing::debug!(
                            command = frame.command,
                            "no controller installed, frame dropped"
                        );
                    }
                }
                SessionAction::Relay(message) => {
                    if outbound.send(message).await.is_err() {
                        tracing::error!("supervisor channel closed");
                    }
                }
            }
        }
    }

    async fn register_session(&mut self, token: u64, outbound: &mpsc::Sender<RelayMessage>) {
        let outcome = self.registry.register(token);

        // The evicted session leaves through the regular disconnect
        // path, so guest departures still broadcast their status.
        if let Some(old) = outcome.evicted {
            self.close_session(old, outbound).await;
        }
        if outcome.rejected_guest {
            // Already notified by the registry; tear the socket down
            // without a disconnect notification.
            if let Some(handle) = self.readers.remove(&token) {
                handle.abort();
            }
            self.registry.remove(token);
            return;
        }
        if outcome.duplicate_controller {
            return;
        }

        if let Some(session) = self.registry.get_mut(token) {
            let (device, kind) = (session.device, session.kind);
            let _ = outbound
                .send(RelayMessage::ClientConnect { device, kind })
                .await;
        }
    }

    async fn close_session(&mut self, token: u64, outbound: &mpsc::Sender<RelayMessage>) {
        if let Some(handle) = self.readers.remove(&token) {
            handle.abort();
        }
        let Some(session) = self.registry.remove(token) else {
            return;
        };
        if !session.is_registered() {
            return;
        }

        tracing::info!(id = %session.id, device = session.device, kind = session.kind.describe(),
            sent = session.sent_frames(), "session closed");

        // Remaining watchers of the device learn that a guest left.
        if session.kind.contains(ConnectionType::GUEST) {
            let status = Frame::new(
                command::CONNECTION_UPDATE_GUEST_STATUS,
                session.device,
                session.id.clone().into_bytes(),
            );
            self.registry.broadcast_frame(session.device, &status);
        }

        let _ = outbound
            .send(RelayMessage::ClientDisconnect {
                device: session.device,
                kind: session.kind,
            })
            .await;
    }

    fn handle_relay_message(&mut self, message: RelayMessage) {
        match message {
            RelayMessage::Mirroring { frame } => {
                let device = frame.device;
                if self.registry.session_count(device) == 0 {
                    return;
                }
                let wire = frame.encode();
                self.registry.broadcast_mirroring(device, &wire);
            }
            // Device-pushed notifications ride the mirroring channel and
            // reach the device's watchers like any other device frame.
            RelayMessage::MirroringUncaught { frame } => {
                self.registry.broadcast_frame(frame.device, &frame);
            }
            // Relay-synthesized breakage reports address the controller.
            RelayMessage::MirroringBroken { frame } => {
                if !self.registry.send_controller(&frame) {
                    tracing::debug!(command = frame.command, "breakage report dropped, no controller");
                }
            }
            RelayMessage::FileResponse { device, kind, filename } => {
                tracing::info!(device, ?kind, filename = %filename, "artifact saved");
                let frame = Frame::new(command::FILE, device, filename.into_bytes());
                if !self.registry.send_controller(&frame) {
                    tracing::debug!(device, "file response dropped, no controller");
                }
            }
            other => {
                tracing::warn!(?other, "unexpected message for session worker");
            }
        }
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<Bytes>) {
    while let Some(wire) = rx.recv().await {
        if let Err(e) = writer.write_all(&wire).await {
            tracing::debug!(error = %e, "client write failed");
            break;
        }
    }
    let _ = writer.shutdown().await;
}
