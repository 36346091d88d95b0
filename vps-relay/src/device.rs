//! Device endpoint: the relay's side of one mirrored device.
//!
//! Each active device slot holds two outbound TCP connections, a
//! control socket for command frames and a mirroring socket for image
//! frames. The mirroring socket announces readiness with the `sendme`
//! token before any framing starts. Until the power handshake
//! completes, outbound control frames queue in FIFO order; the TURN_ON
//! frame itself always transmits and drains the queue behind it.

use std::collections::VecDeque;

use bytes::BufMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use vps_core::frame::{DeviceFrame, Frame, MirrorFrame};
use vps_core::orientation::{self, OrientationState};
use vps_core::{command, Connection, FrameCodec, MirrorCodec, RelayConfig, VpsError};

use crate::transform::ImageTransform;

/// Readiness token written on the mirroring socket at connect.
const READY_TOKEN: &[u8] = b"sendme";

/// One normalized mirroring frame ready for fan-out, plus the capture
/// decisions resolved against this frame.
#[derive(Debug)]
pub struct ProcessedMirror {
    pub frame: MirrorFrame,
    /// This keyframe satisfies a pending one-shot capture.
    pub capture: bool,
    /// This keyframe should be staged for animation composition.
    pub animate_capture: bool,
}

pub struct DeviceEndpoint {
    device: u8,
    control: Connection<Frame, Frame>,
    mirror: Connection<DeviceFrame, Frame>,
    on: bool,
    send_queue: VecDeque<Frame>,
    orientation: OrientationState,
    width: u16,
    height: u16,
    quality: u8,
    framerate: u8,
    capture_armed: bool,
    animate: bool,
    animate_capture_armed: bool,
    received_frames: u64,
    reported_frames: u64,
}

impl DeviceEndpoint {
    /// Connect both sockets for one device slot and announce mirroring
    /// readiness.
    pub async fn connect(
        config: &RelayConfig,
        device: u8,
        width: u16,
        height: u16,
    ) -> Result<Self, VpsError> {
        let max = config.device.max_devices;
        let control =
            Connection::connect(&config.control_addr(device), FrameCodec::new(max)).await?;

        let mut stream = TcpStream::connect(config.mirroring_addr(device)).await?;
        stream.set_nodelay(true)?;
        stream.write_all(READY_TOKEN).await?;
        let mirror = Connection::new(stream, MirrorCodec::new(max));

        tracing::info!(device, width, height, "device endpoint connected");

        Ok(Self {
            device,
            control,
            mirror,
            on: false,
            send_queue: VecDeque::new(),
            orientation: OrientationState::new(width, height),
            width,
            height,
            quality: config.device.default_quality,
            framerate: config.device.default_framerate,
            capture_armed: false,
            animate: false,
            animate_capture_armed: false,
            received_frames: 0,
            reported_frames: 0,
        })
    }

    pub fn device(&self) -> u8 {
        self.device
    }

    pub fn is_animating(&self) -> bool {
        self.animate
    }

    // ── Control frame builders ───────────────────────────────────

    pub fn turn_on_frame(device: u8, on: bool) -> Frame {
        Frame::new(command::TURN_ON, device, vec![on as u8])
    }

    pub fn change_resolution_frame(device: u8, vertical: bool, width: u16, height: u16) -> Frame {
        let mut payload = Vec::with_capacity(5);
        payload.put_u8(vertical as u8);
        payload.put_u16(width);
        payload.put_u16(height);
        Frame::new(command::CHANGE_RESOLUTION, device, payload)
    }

    pub fn change_ratio_frame(device: u8, ratio: u8) -> Frame {
        Frame::new(command::CHANGE_RATIO, device, vec![ratio])
    }

    pub fn keyframe_frame(device: u8) -> Frame {
        Frame::new(command::SEND_KEYFRAME, device, Vec::new())
    }

    /// Capture-failed notification for a mirroring socket that broke
    /// while the endpoint was active.
    pub fn broken_notice(device: u8) -> Frame {
        Frame::new(
            command::NXPTC_CAPTURE_FAILED,
            device,
            command::CAPTURE_FAILED_REASON_BROKEN.to_be_bytes().to_vec(),
        )
    }

    // ── Power and transmission ───────────────────────────────────

    /// Queue or transmit one control frame. TURN_ON bypasses the
    /// queue; everything else waits until the device is powered.
    pub async fn send(&mut self, frame: Frame) -> Result<(), VpsError> {
        if frame.command == command::TURN_ON || self.on {
            self.control.send(frame).await
        } else {
            self.send_queue.push_back(frame);
            Ok(())
        }
    }

    /// Flip the power state. Powering on drains the queued frames in
    /// their original order.
    pub async fn set_on(&mut self, on: bool) -> Result<(), VpsError> {
        self.control
            .send(Self::turn_on_frame(self.device, on))
            .await?;
        self.on = on;
        if on {
            while let Some(frame) = self.send_queue.pop_front() {
                self.control.send(frame).await?;
            }
        }
        Ok(())
    }

    /// Ask the device for a fresh keyframe.
    pub async fn request_keyframe(&mut self) -> Result<(), VpsError> {
        self.send(Self::keyframe_frame(self.device)).await
    }

    /// Switch viewer orientation; idempotent. The flip is local state
    /// only; geometry remapping picks it up on the next frame.
    pub fn set_orientation(&mut self, vertical: bool) -> bool {
        if !self.orientation.set_vertical(vertical) {
            return false;
        }
        tracing::info!(device = self.device, vertical,
            width = self.width, height = self.height, "orientation changed");
        true
    }

    /// Forward a quality change and remember the new value.
    pub async fn set_quality(&mut self, frame: Frame) -> Result<(), VpsError> {
        if let Some(&q) = frame.payload.first() {
            self.quality = q;
        }
        tracing::debug!(device = self.device, quality = self.quality, "quality changed");
        self.send(frame).await
    }

    /// Forward a framerate change and remember the new value.
    pub async fn set_framerate(&mut self, frame: Frame) -> Result<(), VpsError> {
        if let Some(&f) = frame.payload.first() {
            self.framerate = f;
        }
        tracing::debug!(device = self.device, framerate = self.framerate, "framerate changed");
        self.send(frame).await
    }

    /// Arm a one-shot still capture; the next keyframe satisfies it.
    pub fn capture_once(&mut self) {
        self.capture_armed = true;
    }

    /// Toggle animation recording; returns the new state.
    pub fn toggle_animate(&mut self) -> bool {
        self.animate = !self.animate;
        if !self.animate {
            self.animate_capture_armed = false;
        }
        self.animate
    }

    /// Mark the next keyframe for animation staging.
    pub fn arm_animate_capture(&mut self) {
        if self.animate {
            self.animate_capture_armed = true;
        }
    }

    /// Frames received since the last call.
    pub fn frame_delta(&mut self) -> u64 {
        let delta = self.received_frames - self.reported_frames;
        self.reported_frames = self.received_frames;
        delta
    }

    /// Next frame off the mirroring socket; `None` once it closed or
    /// desynchronized.
    pub async fn next_mirror(&mut self) -> Option<DeviceFrame> {
        self.mirror.recv().await
    }

    /// Power the device down. Buffered frames are discarded with the
    /// endpoint.
    pub async fn stop(&mut self) -> Result<(), VpsError> {
        self.set_on(false).await
    }

    // ── Mirroring pipeline ───────────────────────────────────────

    /// Normalize one mirroring frame for fan-out: capture keyframe
    /// dimensions, resolve the command rewrite and rotation, remap the
    /// bounding box, and rotate the image through the external
    /// transform when required. A failed transform drops the frame.
    pub async fn process(
        &mut self,
        frame: MirrorFrame,
        transform: &dyn ImageTransform,
    ) -> Option<ProcessedMirror> {
        self.received_frames += 1;
        if frame.keyframe {
            self.orientation.observe_keyframe(&frame.region);
        }

        let normalized = orientation::normalize(&self.orientation, frame.command, frame.region);

        let image = match normalized.rotation {
            Some(rotation) => {
                match transform
                    .rotate_and_reencode(&frame.image, rotation.degrees())
                    .await
                {
                    Ok(rotated) => rotated,
                    Err(e) => {
                        tracing::warn!(device = self.device, error = %e, "image transform failed, frame dropped");
                        return None;
                    }
                }
            }
            None => frame.image,
        };

        let capture = frame.keyframe && std::mem::take(&mut self.capture_armed);
        let animate_capture = frame.keyframe && std::mem::take(&mut self.animate_capture_armed);

        Some(ProcessedMirror {
            frame: MirrorFrame {
                command: normalized.command,
                device: self.device,
                checksum: frame.checksum,
                region: normalized.region,
                keyframe: frame.keyframe,
                image,
            },
            capture,
            animate_capture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio_util::codec::FramedRead;

    async fn endpoint_with_fake_device() -> (DeviceEndpoint, TcpStream, TcpStream) {
        let mut config = RelayConfig::default();
        let control_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mirror_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        // Device number 1, so the base ports sit one below the bound ones.
        config.network.control_base_port = control_listener.local_addr().unwrap().port() - 1;
        config.network.mirroring_base_port = mirror_listener.local_addr().unwrap().port() - 1;

        let connect = tokio::spawn(async move {
            DeviceEndpoint::connect(&config, 1, 1080, 1920).await.unwrap()
        });
        let (control, _) = control_listener.accept().await.unwrap();
        let (mirror, _) = mirror_listener.accept().await.unwrap();
        (connect.await.unwrap(), control, mirror)
    }

    #[tokio::test]
    async fn mirroring_connect_announces_readiness() {
        let (_endpoint, _control, mut mirror) = endpoint_with_fake_device().await;
        let mut token = [0u8; 6];
        mirror.read_exact(&mut token).await.unwrap();
        assert_eq!(&token, b"sendme");
    }

    #[tokio::test]
    async fn frames_queue_until_power_on_then_drain_in_order() {
        let (mut endpoint, control, _mirror) = endpoint_with_fake_device().await;

        endpoint
            .send(Frame::new(command::IMAGE_QUALITY, 1, vec![80]))
            .await
            .unwrap();
        endpoint
            .send(Frame::new(command::VIDEO_FRAMERATE, 1, vec![15]))
            .await
            .unwrap();
        endpoint.set_on(true).await.unwrap();

        let mut reader = FramedRead::new(control, FrameCodec::default());
        let first = reader.next().await.unwrap().unwrap();
        assert_eq!(first.command, command::TURN_ON);
        assert_eq!(first.payload, vec![1]);
        assert_eq!(
            reader.next().await.unwrap().unwrap().command,
            command::IMAGE_QUALITY
        );
        assert_eq!(
            reader.next().await.unwrap().unwrap().command,
            command::VIDEO_FRAMERATE
        );
    }

    #[tokio::test]
    async fn orientation_change_flips_state_without_device_traffic() {
        let (mut endpoint, control, _mirror) = endpoint_with_fake_device().await;
        endpoint.set_on(true).await.unwrap();

        assert!(endpoint.set_orientation(false));
        // Repeat is idempotent.
        assert!(!endpoint.set_orientation(false));
        endpoint.request_keyframe().await.unwrap();

        let mut reader = FramedRead::new(control, FrameCodec::default());
        assert_eq!(reader.next().await.unwrap().unwrap().command, command::TURN_ON);
        // The flip itself put nothing on the wire; the keyframe request
        // follows the power-on directly.
        assert_eq!(
            reader.next().await.unwrap().unwrap().command,
            command::SEND_KEYFRAME
        );
    }

    #[test]
    fn control_builders_lay_out_their_payloads() {
        let frame = DeviceEndpoint::change_resolution_frame(3, true, 1080, 1920);
        assert_eq!(frame.command, command::CHANGE_RESOLUTION);
        assert_eq!(frame.payload, vec![1, 0x04, 0x38, 0x07, 0x80]);

        let frame = DeviceEndpoint::change_ratio_frame(3, 2);
        assert_eq!(frame.command, command::CHANGE_RATIO);
        assert_eq!(frame.payload, vec![2]);
    }

    #[tokio::test]
    async fn capture_arms_for_one_keyframe_only() {
        let (mut endpoint, _control, _mirror) = endpoint_with_fake_device().await;
        let transform = crate::transform::PassthroughTransform;

        endpoint.capture_once();
        let keyframe = MirrorFrame {
            command: command::DEVICE_PORTRAIT_IMAGE_PORTRAIT,
            device: 1,
            checksum: 1,
            region: vps_core::Region::new(0, 0, 1080, 1920),
            keyframe: true,
            image: vec![1, 2, 3],
        };

        let processed = endpoint.process(keyframe.clone(), &transform).await.unwrap();
        assert!(processed.capture);
        let processed = endpoint.process(keyframe, &transform).await.unwrap();
        assert!(!processed.capture);
        assert_eq!(endpoint.frame_delta(), 2);
        assert_eq!(endpoint.frame_delta(), 0);
    }
}
