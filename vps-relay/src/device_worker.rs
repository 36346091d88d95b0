//! Device-handling unit.
//!
//! Each worker is pinned to one device number and owns at most one
//! endpoint. Lifecycle and capability commands arrive from the
//! supervisor; mirroring traffic flows back up through it. Commands
//! for a slot with no active device are a topology error: logged and
//! dropped, never fatal.

use std::sync::Arc;

use tokio::sync::mpsc;

use vps_core::frame::DeviceFrame;
use vps_core::{FileKind, RelayConfig, RelayMessage, TouchEvent};

use crate::device::DeviceEndpoint;
use crate::storage::Storage;
use crate::transform::{AnimationComposer, ImageTransform};

enum Next {
    Message(Option<RelayMessage>),
    Mirror(Option<DeviceFrame>),
}

pub struct DeviceWorker {
    device: u8,
    config: RelayConfig,
    storage: Storage,
    transform: Arc<dyn ImageTransform>,
    composer: Arc<dyn AnimationComposer>,
    endpoint: Option<DeviceEndpoint>,
    animate_sequence: u32,
    staged_events: Vec<TouchEvent>,
}

impl DeviceWorker {
    pub fn new(
        device: u8,
        config: RelayConfig,
        storage: Storage,
        transform: Arc<dyn ImageTransform>,
        composer: Arc<dyn AnimationComposer>,
    ) -> Self {
        Self {
            device,
            config,
            storage,
            transform,
            composer,
            endpoint: None,
            animate_sequence: 0,
            staged_events: Vec::new(),
        }
    }

    /// Run until the supervisor channel closes.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<RelayMessage>,
        outbound: mpsc::Sender<RelayMessage>,
    ) {
        loop {
            let next = tokio::select! {
                message = inbound.recv() => Next::Message(message),
                frame = Self::next_mirror(&mut self.endpoint) => Next::Mirror(frame),
            };

            match next {
                Next::Message(Some(message)) => self.handle_message(message, &outbound).await,
                Next::Message(None) => {
                    tracing::info!(device = self.device, "device worker stopping");
                    break;
                }
                Next::Mirror(Some(frame)) => self.handle_device_frame(frame, &outbound).await,
                Next::Mirror(None) => self.handle_mirror_closed(&outbound).await,
            }
        }
    }

    /// Pends forever while no endpoint is active, so the select loop
    /// only ever wakes for supervisor messages.
    async fn next_mirror(endpoint: &mut Option<DeviceEndpoint>) -> Option<DeviceFrame> {
        match endpoint {
            Some(endpoint) => endpoint.next_mirror().await,
            None => std::future::pending().await,
        }
    }

    async fn handle_message(&mut self, message: RelayMessage, outbound: &mpsc::Sender<RelayMessage>) {
        match message {
            RelayMessage::DeviceStart { device, width, height } => {
                self.start_device(device, width, height).await;
            }
            RelayMessage::DeviceStop { .. } => {
                match self.endpoint.take() {
                    Some(mut endpoint) => {
                        let frames = endpoint.frame_delta();
                        if let Err(e) = endpoint.stop().await {
                            tracing::warn!(device = self.device, error = %e, "device stop failed");
                        }
                        tracing::info!(device = self.device, frames, "device stopped");
                    }
                    None => tracing::error!(device = self.device, "stop for inactive device"),
                }
            }
            RelayMessage::DeviceOrientation { vertical, .. } => {
                let Some(endpoint) = self.active_endpoint() else { return };
                // A fresh keyframe re-seeds the remapped geometry for
                // the new orientation.
                if endpoint.set_orientation(vertical) {
                    if let Err(e) = endpoint.request_keyframe().await {
                        tracing::warn!(device = self.device, error = %e, "keyframe request failed");
                    }
                }
            }
            RelayMessage::DeviceQuality { frame, .. } => {
                let Some(endpoint) = self.active_endpoint() else { return };
                let result = endpoint.set_quality(frame).await;
                let result = match result {
                    Ok(()) => endpoint.request_keyframe().await,
                    err => err,
                };
                if let Err(e) = result {
                    tracing::warn!(device = self.device, error = %e, "quality change failed");
                }
            }
            RelayMessage::DeviceFramerate { frame, .. } => {
                let Some(endpoint) = self.active_endpoint() else { return };
                let result = endpoint.set_framerate(frame).await;
                let result = match result {
                    Ok(()) => endpoint.request_keyframe().await,
                    err => err,
                };
                if let Err(e) = result {
                    tracing::warn!(device = self.device, error = %e, "framerate change failed");
                }
            }
            RelayMessage::DeviceKeyframe { .. } => {
                let Some(endpoint) = self.active_endpoint() else { return };
                if let Err(e) = endpoint.request_keyframe().await {
                    tracing::warn!(device = self.device, error = %e, "keyframe request failed");
                }
            }
            RelayMessage::ScreenCapture { .. } => {
                let Some(endpoint) = self.active_endpoint() else { return };
                endpoint.capture_once();
            }
            RelayMessage::ScreenAnimate { .. } => {
                self.toggle_animate(outbound).await;
            }
            RelayMessage::ScreenRecord { .. } => {
                // Accepted for compatibility; recording is not serviced.
                tracing::debug!(device = self.device, "screen record ignored");
            }
            RelayMessage::ScreenEvent { event, .. } => {
                let Some(endpoint) = self.active_endpoint() else { return };
                endpoint.arm_animate_capture();
                self.staged_events.push(event);
            }
            other => {
                tracing::warn!(device = self.device, ?other, "unexpected message for device worker");
            }
        }
    }

    fn active_endpoint(&mut self) -> Option<&mut DeviceEndpoint> {
        if self.endpoint.is_none() {
            tracing::error!(device = self.device, "command for inactive device dropped");
        }
        self.endpoint.as_mut()
    }

    async fn start_device(&mut self, device: u8, width: u16, height: u16) {
        if self.endpoint.is_some() {
            tracing::warn!(device, "device already started, restarting");
            self.endpoint = None;
        }
        match DeviceEndpoint::connect(&self.config, device, width, height).await {
            Ok(mut endpoint) => {
                let powered = endpoint.set_on(true).await;
                let powered = match powered {
                    Ok(()) => endpoint.request_keyframe().await,
                    err => err,
                };
                match powered {
                    Ok(()) => self.endpoint = Some(endpoint),
                    Err(e) => tracing::error!(device, error = %e, "device power-on failed"),
                }
            }
            Err(e) => {
                tracing::error!(device, error = %e, "device connect failed");
            }
        }
    }

    async fn toggle_animate(&mut self, outbound: &mpsc::Sender<RelayMessage>) {
        let device = self.device;
        let Some(endpoint) = self.active_endpoint() else { return };

        if endpoint.toggle_animate() {
            self.animate_sequence = 0;
            self.staged_events.clear();
            if let Err(e) = self.storage.clear_staged(device).await {
                tracing::warn!(device, error = %e, "staging cleanup failed");
            }
            let _ = outbound.send(RelayMessage::AnimateStarted { device }).await;
            return;
        }

        tracing::info!(device, frames = self.animate_sequence,
            events = self.staged_events.len(), "composing animation");
        match self
            .composer
            .compose(
                device,
                &self.storage.image_dir(device),
                &self.storage.shared_dir(device),
                &self.staged_events,
            )
            .await
        {
            Ok(filename) => {
                let _ = outbound
                    .send(RelayMessage::FileResponse {
                        device,
                        kind: FileKind::Animation,
                        filename,
                    })
                    .await;
            }
            Err(e) => {
                tracing::error!(device, error = %e, "animation composition failed");
            }
        }
        if let Err(e) = self.storage.clear_staged(device).await {
            tracing::warn!(device, error = %e, "staging cleanup failed");
        }
        self.staged_events.clear();
        let _ = outbound.send(RelayMessage::AnimateStopped { device }).await;
    }

    async fn handle_device_frame(
        &mut self,
        frame: DeviceFrame,
        outbound: &mpsc::Sender<RelayMessage>,
    ) {
        match frame {
            DeviceFrame::Mirror(frame) => {
                let Some(endpoint) = self.endpoint.as_mut() else { return };
                let Some(processed) = endpoint.process(frame, self.transform.as_ref()).await
                else {
                    return;
                };

                if processed.capture {
                    match self
                        .storage
                        .save_capture(self.device, &processed.frame.image)
                        .await
                    {
                        Ok(filename) => {
                            let _ = outbound
                                .send(RelayMessage::FileResponse {
                                    device: self.device,
                                    kind: FileKind::Still,
                                    filename,
                                })
                                .await;
                        }
                        Err(e) => {
                            tracing::error!(device = self.device, error = %e, "capture write failed");
                        }
                    }
                }
                if processed.animate_capture {
                    let sequence = self.animate_sequence;
                    self.animate_sequence += 1;
                    if let Err(e) = self
                        .storage
                        .stage_animation_frame(self.device, sequence, &processed.frame.image)
                        .await
                    {
                        tracing::warn!(device = self.device, error = %e, "frame staging failed");
                    }
                }

                let _ = outbound
                    .send(RelayMessage::Mirroring { frame: processed.frame })
                    .await;
            }
            DeviceFrame::Control(frame) => {
                let _ = outbound
                    .send(RelayMessage::MirroringUncaught { frame })
                    .await;
            }
        }
    }

    /// The mirroring socket closed underneath an active endpoint:
    /// report the broken capture upstream and drop the endpoint.
    async fn handle_mirror_closed(&mut self, outbound: &mpsc::Sender<RelayMessage>) {
        if self.endpoint.take().is_none() {
            return;
        }
        tracing::warn!(device = self.device, "mirroring socket closed while active");
        let _ = outbound
            .send(RelayMessage::MirroringBroken {
                frame: DeviceEndpoint::broken_notice(self.device),
            })
            .await;
    }
}
