//! Worker orchestrator.
//!
//! Spawns one session worker and one device worker per slot, owns
//! every inter-worker channel, and routes messages by their routing
//! predicates. Per-device ordering is FIFO because each device worker
//! has exactly one inbound channel. Status notifications terminate
//! here as log lines.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use vps_core::{RelayConfig, RelayMessage, VpsError};

use crate::device_worker::DeviceWorker;
use crate::session_worker::SessionWorker;
use crate::storage::Storage;
use crate::transform::{AnimationComposer, ImageTransform};

pub struct Supervisor {
    config: RelayConfig,
    storage: Storage,
    transform: Arc<dyn ImageTransform>,
    composer: Arc<dyn AnimationComposer>,
}

impl Supervisor {
    pub fn new(
        config: RelayConfig,
        storage: Storage,
        transform: Arc<dyn ImageTransform>,
        composer: Arc<dyn AnimationComposer>,
    ) -> Self {
        Self {
            config,
            storage,
            transform,
            composer,
        }
    }

    /// Bind the client listener and run until ctrl-c.
    pub async fn run(self) -> Result<(), VpsError> {
        let addr = format!("0.0.0.0:{}", self.config.network.listen_port);
        let listener = TcpListener::bind(&addr).await?;
        self.run_with_listener(listener).await
    }

    /// Run against an already-bound listener.
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<(), VpsError> {
        let (to_supervisor, mut from_workers) = mpsc::channel::<RelayMessage>(1024);

        let (session_tx, session_rx) = mpsc::channel::<RelayMessage>(1024);
        let session_worker = SessionWorker::new(self.config.clone());
        tokio::spawn(session_worker.run(listener, session_rx, to_supervisor.clone()));

        let mut device_txs: HashMap<u8, mpsc::Sender<RelayMessage>> = HashMap::new();
        for device in 1..=self.config.device.max_devices {
            let (tx, rx) = mpsc::channel::<RelayMessage>(256);
            let worker = DeviceWorker::new(
                device,
                self.config.clone(),
                self.storage.clone(),
                Arc::clone(&self.transform),
                Arc::clone(&self.composer),
            );
            tokio::spawn(worker.run(rx, to_supervisor.clone()));
            device_txs.insert(device, tx);
        }

        tracing::info!(
            devices = self.config.device.max_devices,
            "relay running"
        );

        loop {
            tokio::select! {
                message = from_workers.recv() => match message {
                    Some(message) => route(message, &device_txs, &session_tx).await,
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown requested");
                    break;
                }
            }
        }

        // Dropping the worker senders stops every unit.
        Ok(())
    }
}

async fn route(
    message: RelayMessage,
    device_txs: &HashMap<u8, mpsc::Sender<RelayMessage>>,
    session_tx: &mpsc::Sender<RelayMessage>,
) {
    if message.is_device_bound() {
        let device = message.device_number();
        match device_txs.get(&device) {
            Some(tx) => {
                if tx.send(message).await.is_err() {
                    tracing::error!(device, "device worker gone, message dropped");
                }
            }
            None => {
                let e = VpsError::WorkerUnavailable { device };
                tracing::error!(error = %e, "message dropped");
            }
        }
        return;
    }

    if message.is_session_bound() {
        if session_tx.send(message).await.is_err() {
            tracing::error!("session worker gone, message dropped");
        }
        return;
    }

    // Status notifications terminate at the supervisor.
    match message {
        RelayMessage::ClientConnect { device, kind } => {
            tracing::info!(device, kind = kind.describe(), "client connected");
        }
        RelayMessage::ClientDisconnect { device, kind } => {
            tracing::info!(device, kind = kind.describe(), "client disconnected");
        }
        RelayMessage::AnimateStarted { device } => {
            tracing::info!(device, "animation recording started");
        }
        RelayMessage::AnimateStopped { device } => {
            tracing::info!(device, "animation recording stopped");
        }
        other => {
            tracing::warn!(?other, "unroutable message");
        }
    }
}
