//! Client session state and frame classification.
//!
//! A session's identity and role are fixed by its first connect frame
//! and never change afterwards. Every subsequent frame classifies into
//! [`SessionAction`]s that the session worker executes against the
//! registry; unrecognized commands default to the device controller,
//! which keeps the relay forward-compatible with client commands it
//! has never seen.

use bytes::Bytes;
use tokio::sync::mpsc;

use vps_core::frame::Frame;
use vps_core::{command, input, ConnectionType, RelayMessage, TouchTracker, VpsError};

/// What the session worker should do with one classified frame.
#[derive(Debug)]
pub enum SessionAction {
    /// First connect frame: enter the registry under the session's
    /// now-fixed identity.
    Register,
    /// Orderly disconnect.
    Disconnect,
    /// Host-directed eviction of the guest named in the payload.
    DisconnectGuest { guest_id: String, frame: Frame },
    /// Guest time budget update, fanned out to the device's sessions.
    UpdateGuestTime(Frame),
    /// Fan out to every session of the frame's device.
    BroadcastSessions(Frame),
    /// Forward to the device controller.
    SendController(Frame),
    /// Route through the supervisor.
    Relay(RelayMessage),
}

/// One connected client socket.
pub struct ClientSession {
    pub id: String,
    pub kind: ConnectionType,
    pub device: u8,
    sent_frames: u64,
    touch: TouchTracker,
    writer: mpsc::Sender<Bytes>,
}

impl ClientSession {
    /// A fresh, not-yet-classified session around its socket writer.
    pub fn new(writer: mpsc::Sender<Bytes>) -> Self {
        Self {
            id: String::new(),
            kind: ConnectionType::empty(),
            device: 0,
            sent_frames: 0,
            touch: TouchTracker::new(),
            writer,
        }
    }

    pub fn is_registered(&self) -> bool {
        !self.kind.is_empty()
    }

    pub fn sent_frames(&self) -> u64 {
        self.sent_frames
    }

    /// Queue an encoded control frame toward the socket. A slow client
    /// whose queue is full loses the frame rather than stalling the
    /// worker.
    pub fn send(&mut self, frame: &Frame) {
        self.send_bytes(frame.encode());
    }

    /// Queue an encoded mirroring frame toward the socket.
    pub fn send_mirroring(&mut self, wire: Bytes) {
        self.send_bytes(wire);
    }

    fn send_bytes(&mut self, wire: Bytes) {
        match self.writer.try_send(wire) {
            Ok(()) => self.sent_frames += 1,
            Err(_) => {
                tracing::debug!(id = %self.id, device = self.device, "session write queue full, frame dropped");
            }
        }
    }

    /// Classify one inbound frame.
    pub fn handle_frame(&mut self, frame: Frame) -> Result<Vec<SessionAction>, VpsError> {
        if frame.command != command::HEARTBEAT_HOST {
            tracing::debug!(
                command = frame.command,
                device = frame.device,
                len = frame.payload.len(),
                "client frame"
            );
        }

        let actions = match frame.command {
            command::CONNECTION_HOST | command::CONNECTION_GUEST | command::CONNECTION_MONITOR => {
                self.classify_connect(frame)?
            }
            command::CONNECTION_DISCONNECT => vec![SessionAction::Disconnect],
            command::CONNECTION_DISCONNECT_GUEST => {
                let guest_id = String::from_utf8(frame.payload.clone())?;
                vec![SessionAction::DisconnectGuest { guest_id, frame }]
            }
            command::CONNECTION_UPDATE_GUEST_TIME => vec![SessionAction::UpdateGuestTime(frame)],

            command::DEVICE_START => {
                let (width, height) = start_resolution(&frame.payload);
                vec![SessionAction::Relay(RelayMessage::DeviceStart {
                    device: frame.device,
                    width,
                    height,
                })]
            }
            command::DEVICE_STOP => vec![SessionAction::Relay(RelayMessage::DeviceStop {
                device: frame.device,
            })],

            command::ORIENTATION_PORTRAIT | command::ORIENTATION_LANDSCAPE => {
                vec![SessionAction::Relay(RelayMessage::DeviceOrientation {
                    device: frame.device,
                    vertical: frame.command == command::ORIENTATION_PORTRAIT,
                })]
            }
            command::IMAGE_QUALITY => vec![SessionAction::Relay(RelayMessage::DeviceQuality {
                device: frame.device,
                frame,
            })],
            command::VIDEO_FRAMERATE => {
                vec![SessionAction::Relay(RelayMessage::DeviceFramerate {
                    device: frame.device,
                    frame,
                })]
            }
            command::SEND_KEYFRAME => vec![SessionAction::Relay(RelayMessage::DeviceKeyframe {
                device: frame.device,
            })],

            command::SCREEN_CAPTURE => vec![SessionAction::Relay(RelayMessage::ScreenCapture {
                device: frame.device,
            })],
            command::SCREEN_ANIMATE => vec![SessionAction::Relay(RelayMessage::ScreenAnimate {
                device: frame.device,
            })],
            command::SCREEN_RECORD => vec![SessionAction::Relay(RelayMessage::ScreenRecord {
                device: frame.device,
            })],

            command::CLICK_TAP => {
                let (x, y) = input::decode_coords(&frame.payload)?;
                let event = vps_core::TouchEvent::Click { x, y };
                vec![
                    SessionAction::Relay(RelayMessage::ScreenEvent {
                        device: frame.device,
                        event,
                    }),
                    SessionAction::SendController(frame),
                ]
            }
            command::CLICK_TOUCH_DOWN => {
                let (x, y) = input::decode_coords(&frame.payload)?;
                self.touch.touch_down(x, y);
                vec![SessionAction::SendController(frame)]
            }
            command::CLICK_TOUCH_UP => {
                let (x, y) = input::decode_coords(&frame.payload)?;
                let event = self.touch.touch_up(x, y);
                vec![
                    SessionAction::Relay(RelayMessage::ScreenEvent {
                        device: frame.device,
                        event,
                    }),
                    SessionAction::SendController(frame),
                ]
            }
            command::CLICK_TOUCH_EVENT => match input::decode_combined(&frame.payload)? {
                Some(event) => vec![SessionAction::Relay(RelayMessage::ScreenEvent {
                    device: frame.device,
                    event,
                })],
                None => Vec::new(),
            },

            // Device-originated telemetry and result frames fan out to
            // the device's watchers.
            command::DEVICE_DISCONNECTED
            | command::LOGCAT_DATA
            | command::USAGE_NETWORK
            | command::USAGE_CPU
            | command::USAGE_MEMORY
            | command::ACK
            | command::SCRIPT_RESULT
            | command::START_EVENT_INDEX
            | command::START_EVENT_PATH
            | command::START_SCRIPT_RESULT => vec![SessionAction::BroadcastSessions(frame)],

            // Hardkeys, swipes, telemetry subscriptions, heartbeats and
            // anything the relay does not understand go to the
            // controller untouched.
            _ => vec![SessionAction::SendController(frame)],
        };

        Ok(actions)
    }

    fn classify_connect(&mut self, frame: Frame) -> Result<Vec<SessionAction>, VpsError> {
        if self.is_registered() {
            tracing::warn!(id = %self.id, device = self.device, "repeated connect frame ignored");
            return Ok(Vec::new());
        }

        self.id = String::from_utf8(frame.payload)?;
        self.device = frame.device;
        self.kind = match frame.command {
            command::CONNECTION_HOST if self.id == command::CONTROLLER_ID => {
                ConnectionType::CONTROLLER
            }
            command::CONNECTION_HOST => ConnectionType::HOST,
            command::CONNECTION_GUEST => ConnectionType::GUEST,
            _ => ConnectionType::MONITOR,
        };

        Ok(vec![SessionAction::Register])
    }
}

fn start_resolution(payload: &[u8]) -> (u16, u16) {
    if payload.len() < 4 {
        return (0, 0);
    }
    (
        u16::from_be_bytes([payload[0], payload[1]]),
        u16::from_be_bytes([payload[2], payload[3]]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use vps_core::TouchEvent;

    fn session() -> (ClientSession, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(16);
        (ClientSession::new(tx), rx)
    }

    fn connect(session: &mut ClientSession, cmd: u16, device: u8, id: &str) -> Vec<SessionAction> {
        session
            .handle_frame(Frame::new(cmd, device, id.as_bytes().to_vec()))
            .unwrap()
    }

    #[test]
    fn first_connect_fixes_identity() {
        let (mut s, _rx) = session();
        let actions = connect(&mut s, command::CONNECTION_HOST, 3, "viewer-a");
        assert!(matches!(actions[..], [SessionAction::Register]));
        assert_eq!(s.id, "viewer-a");
        assert_eq!(s.kind, ConnectionType::HOST);
        assert_eq!(s.device, 3);

        // A second connect frame changes nothing.
        let actions = connect(&mut s, command::CONNECTION_GUEST, 5, "other");
        assert!(actions.is_empty());
        assert_eq!(s.kind, ConnectionType::HOST);
        assert_eq!(s.device, 3);
    }

    #[test]
    fn controller_identity_comes_from_session_id() {
        let (mut s, _rx) = session();
        connect(&mut s, command::CONNECTION_HOST, 1, command::CONTROLLER_ID);
        assert_eq!(s.kind, ConnectionType::CONTROLLER);
    }

    #[test]
    fn device_start_carries_resolution() {
        let (mut s, _rx) = session();
        connect(&mut s, command::CONNECTION_HOST, 2, "h");

        let mut payload = 1080u16.to_be_bytes().to_vec();
        payload.extend_from_slice(&1920u16.to_be_bytes());
        let actions = s
            .handle_frame(Frame::new(command::DEVICE_START, 2, payload))
            .unwrap();
        match &actions[..] {
            [SessionAction::Relay(RelayMessage::DeviceStart {
                device: 2,
                width: 1080,
                height: 1920,
            })] => {}
            other => panic!("unexpected actions {other:?}"),
        }
    }

    #[test]
    fn touch_up_relays_event_and_forwards_raw_frame() {
        let (mut s, _rx) = session();
        connect(&mut s, command::CONNECTION_HOST, 2, "h");

        let mut down = 10u16.to_be_bytes().to_vec();
        down.extend_from_slice(&20u16.to_be_bytes());
        let actions = s
            .handle_frame(Frame::new(command::CLICK_TOUCH_DOWN, 2, down))
            .unwrap();
        assert!(matches!(actions[..], [SessionAction::SendController(_)]));

        let mut up = 30u16.to_be_bytes().to_vec();
        up.extend_from_slice(&40u16.to_be_bytes());
        let actions = s
            .handle_frame(Frame::new(command::CLICK_TOUCH_UP, 2, up))
            .unwrap();
        match &actions[..] {
            [SessionAction::Relay(RelayMessage::ScreenEvent { event, .. }), SessionAction::SendController(_)] => {
                assert_eq!(
                    *event,
                    TouchEvent::Move {
                        x: 30,
                        y: 40,
                        from_x: 10,
                        from_y: 20,
                    }
                );
            }
            other => panic!("unexpected actions {other:?}"),
        }
    }

    #[test]
    fn combined_touch_event_skips_the_controller() {
        let (mut s, _rx) = session();
        connect(&mut s, command::CONNECTION_HOST, 2, "h");

        let mut payload = command::TOUCH_SUBCODE_CLICK.to_be_bytes().to_vec();
        payload.extend_from_slice(&5u32.to_be_bytes());
        payload.extend_from_slice(&6u32.to_be_bytes());
        let actions = s
            .handle_frame(Frame::new(command::CLICK_TOUCH_EVENT, 2, payload))
            .unwrap();
        assert!(matches!(
            actions[..],
            [SessionAction::Relay(RelayMessage::ScreenEvent { .. })]
        ));
    }

    #[test]
    fn telemetry_fans_out_to_device_sessions() {
        let (mut s, _rx) = session();
        connect(&mut s, command::CONNECTION_HOST, 2, "h");

        for cmd in [
            command::USAGE_CPU,
            command::LOGCAT_DATA,
            command::DEVICE_DISCONNECTED,
            command::SCRIPT_RESULT,
        ] {
            let actions = s
                .handle_frame(Frame::new(cmd, 2, vec![1, 2, 3]))
                .unwrap();
            match &actions[..] {
                [SessionAction::BroadcastSessions(frame)] => assert_eq!(frame.command, cmd),
                other => panic!("command {cmd} classified as {other:?}"),
            }
        }

        // Subscription toggles still address the controller.
        let actions = s
            .handle_frame(Frame::new(command::LOGCAT_START, 2, Vec::new()))
            .unwrap();
        assert!(matches!(actions[..], [SessionAction::SendController(_)]));
    }

    #[test]
    fn unknown_commands_default_to_the_controller() {
        let (mut s, _rx) = session();
        connect(&mut s, command::CONNECTION_HOST, 2, "h");
        let actions = s
            .handle_frame(Frame::new(command::CLICK_SWIPE, 2, vec![0; 8]))
            .unwrap();
        assert!(matches!(actions[..], [SessionAction::SendController(_)]));
    }

    #[test]
    fn full_write_queue_drops_instead_of_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let mut s = ClientSession::new(tx);
        s.send(&Frame::new(command::ACK, 1, Vec::new()));
        s.send(&Frame::new(command::ACK, 1, Vec::new()));
        assert_eq!(s.sent_frames(), 1);
    }
}
