//! Cross-worker messages.
//!
//! Units never share state by reference — only these messages travel
//! between the session worker, the device workers, and the
//! supervisor. The supervisor routes device-bound messages to the
//! worker whose assigned number matches and everything else to the
//! session worker; within one device number, channel order is FIFO.

use crate::command::ConnectionType;
use crate::frame::{Frame, MirrorFrame};
use crate::input::TouchEvent;

/// Kind of persisted artifact reported to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// A captured still image.
    Still,
    /// A composed animation.
    Animation,
}

/// One cross-worker message.
#[derive(Debug, Clone)]
pub enum RelayMessage {
    // ── Device lifecycle (session → device worker) ───────────────
    DeviceStart {
        device: u8,
        width: u16,
        height: u16,
    },
    DeviceStop {
        device: u8,
    },

    // ── Capability changes (session → device worker) ─────────────
    DeviceOrientation {
        device: u8,
        vertical: bool,
    },
    DeviceQuality {
        device: u8,
        frame: Frame,
    },
    DeviceFramerate {
        device: u8,
        frame: Frame,
    },
    DeviceKeyframe {
        device: u8,
    },

    // ── Screen actions (session → device worker) ─────────────────
    ScreenCapture {
        device: u8,
    },
    ScreenAnimate {
        device: u8,
    },
    ScreenRecord {
        device: u8,
    },
    ScreenEvent {
        device: u8,
        event: TouchEvent,
    },

    // ── Device traffic (device worker → session worker) ──────────
    Mirroring {
        frame: MirrorFrame,
    },
    /// A non-image frame the device pushed over the mirroring socket.
    MirroringUncaught {
        frame: Frame,
    },
    /// Synthesized capture-failed notification for a broken socket.
    MirroringBroken {
        frame: Frame,
    },
    FileResponse {
        device: u8,
        kind: FileKind,
        filename: String,
    },

    // ── Status notifications (→ supervisor sink) ─────────────────
    AnimateStarted {
        device: u8,
    },
    AnimateStopped {
        device: u8,
    },
    ClientConnect {
        device: u8,
        kind: ConnectionType,
    },
    ClientDisconnect {
        device: u8,
        kind: ConnectionType,
    },
}

impl RelayMessage {
    /// The device number this message is scoped to; 0 for
    /// system-level messages.
    pub fn device_number(&self) -> u8 {
        match self {
            RelayMessage::DeviceStart { device, .. }
            | RelayMessage::DeviceStop { device }
            | RelayMessage::DeviceOrientation { device, .. }
            | RelayMessage::DeviceQuality { device, .. }
            | RelayMessage::DeviceFramerate { device, .. }
            | RelayMessage::DeviceKeyframe { device }
            | RelayMessage::ScreenCapture { device }
            | RelayMessage::ScreenAnimate { device }
            | RelayMessage::ScreenRecord { device }
            | RelayMessage::ScreenEvent { device, .. }
            | RelayMessage::FileResponse { device, .. }
            | RelayMessage::AnimateStarted { device }
            | RelayMessage::AnimateStopped { device }
            | RelayMessage::ClientConnect { device, .. }
            | RelayMessage::ClientDisconnect { device, .. } => *device,
            RelayMessage::Mirroring { frame } => frame.device,
            RelayMessage::MirroringUncaught { frame }
            | RelayMessage::MirroringBroken { frame } => frame.device,
        }
    }

    /// `true` for messages the supervisor routes to a device worker.
    pub fn is_device_bound(&self) -> bool {
        matches!(
            self,
            RelayMessage::DeviceStart { .. }
                | RelayMessage::DeviceStop { .. }
                | RelayMessage::DeviceOrientation { .. }
                | RelayMessage::DeviceQuality { .. }
                | RelayMessage::DeviceFramerate { .. }
                | RelayMessage::DeviceKeyframe { .. }
                | RelayMessage::ScreenCapture { .. }
                | RelayMessage::ScreenAnimate { .. }
                | RelayMessage::ScreenRecord { .. }
                | RelayMessage::ScreenEvent { .. }
        )
    }

    /// `true` for messages the supervisor routes to the session
    /// worker.
    pub fn is_session_bound(&self) -> bool {
        matches!(
            self,
            RelayMessage::Mirroring { .. }
                | RelayMessage::MirroringUncaught { .. }
                | RelayMessage::MirroringBroken { .. }
                | RelayMessage::FileResponse { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Region;

    #[test]
    fn device_number_routing() {
        let msg = RelayMessage::DeviceStart {
            device: 7,
            width: 1080,
            height: 1920,
        };
        assert_eq!(msg.device_number(), 7);
        assert!(msg.is_device_bound());
        assert!(!msg.is_session_bound());
    }

    #[test]
    fn mirroring_carries_its_frame_device() {
        let frame = MirrorFrame {
            command: crate::command::DEVICE_PORTRAIT_IMAGE_PORTRAIT,
            device: 4,
            checksum: 1,
            region: Region::default(),
            keyframe: false,
            image: Vec::new(),
        };
        let msg = RelayMessage::Mirroring { frame };
        assert_eq!(msg.device_number(), 4);
        assert!(msg.is_session_bound());
        assert!(!msg.is_device_bound());
    }

    #[test]
    fn notifications_route_to_neither_worker() {
        let msg = RelayMessage::AnimateStarted { device: 2 };
        assert!(!msg.is_device_bound());
        assert!(!msg.is_session_bound());
    }
}
