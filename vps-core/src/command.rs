//! Command registry and session classification types.
//!
//! Command identifiers are opaque 16-bit integers shared with device
//! and client firmware — a configuration contract, not something the
//! relay derives. The relay only needs to classify them for routing;
//! unknown identifiers are forwarded to the controller untouched, so
//! the registry is a table of named constants rather than a closed
//! enum.
//!
//! Organized by category:
//! - `200xx` — device control and the four device-image identifiers
//! - `300xx` — device lifecycle / capability / screen actions
//! - `31xxx` — connection lifecycle and telemetry passthrough
//! - `32xxx` — input events and the host heartbeat

use bitflags::bitflags;

// ── Defaults ─────────────────────────────────────────────────────

/// Default number of device slots. Device number 0 is reserved for
/// system-scoped frames.
pub const MAX_DEVICES: u8 = 10;

/// Default mirroring image quality.
pub const DEFAULT_QUALITY: u8 = 70;

/// Default recording framerate.
pub const DEFAULT_FRAMERATE: u8 = 20;

/// Session identity that marks a host-connect as the device controller.
pub const CONTROLLER_ID: &str = "MOBILECONTROL";

// ── Device control (200xx) ───────────────────────────────────────

/// Power the mirroring service on/off (1-byte flag payload).
pub const TURN_ON: u16 = 20000;
/// Change capture resolution (direction + width + height).
pub const CHANGE_RESOLUTION: u16 = 20001;
/// Change aspect ratio.
pub const CHANGE_RATIO: u16 = 20002;
/// Ask the device for a fresh keyframe.
pub const SEND_KEYFRAME: u16 = 20003;

// ── Device images (200xx) ────────────────────────────────────────

/// Portrait-captured image on a portrait device.
pub const DEVICE_PORTRAIT_IMAGE_PORTRAIT: u16 = 20004;
/// Landscape-captured image on a landscape device.
pub const DEVICE_LANDSCAPE_IMAGE_LANDSCAPE: u16 = 20005;
/// Portrait-captured image on a landscape device.
pub const DEVICE_PORTRAIT_IMAGE_LANDSCAPE: u16 = 20006;
/// Landscape-captured image on a portrait device.
pub const DEVICE_LANDSCAPE_IMAGE_PORTRAIT: u16 = 20007;
/// Landscape image from a wide (width > height) device.
pub const WIDE_DEVICE_IMAGE_LANDSCAPE: u16 = 20008;
/// Portrait image from a wide device.
pub const WIDE_DEVICE_IMAGE_PORTRAIT: u16 = 20009;

/// Capture pipeline failure notification (2-byte reason payload).
pub const NXPTC_CAPTURE_FAILED: u16 = 20100;

/// Reason code carried by a capture-failed frame when the mirroring
/// socket broke while the endpoint was active.
pub const CAPTURE_FAILED_REASON_BROKEN: u16 = 101;

// ── Device lifecycle / capability / screen (300xx) ───────────────

/// Device slot starts service (payload: width u16 + height u16).
pub const DEVICE_START: u16 = 30000;
/// Device slot stops service.
pub const DEVICE_STOP: u16 = 30001;
/// Device-side disconnect notification, fanned out to sessions.
pub const DEVICE_DISCONNECTED: u16 = 30002;

/// Mirroring image quality change, forwarded to the device.
pub const IMAGE_QUALITY: u16 = 30010;
/// Recording framerate change, forwarded to the device.
pub const VIDEO_FRAMERATE: u16 = 30011;
/// Viewer orientation switched to portrait.
pub const ORIENTATION_PORTRAIT: u16 = 30012;
/// Viewer orientation switched to landscape.
pub const ORIENTATION_LANDSCAPE: u16 = 30013;

/// Capture the next keyframe as a still image.
pub const SCREEN_CAPTURE: u16 = 30020;
/// Toggle animation recording.
pub const SCREEN_ANIMATE: u16 = 30021;
/// Screen recording (accepted, not serviced).
pub const SCREEN_RECORD: u16 = 30022;

/// Saved-artifact response to the controller (payload: filename).
pub const FILE: u16 = 30030;

// ── Connection lifecycle (310xx) ─────────────────────────────────

/// Host connect (payload: session id text).
pub const CONNECTION_HOST: u16 = 31000;
/// Guest connect (payload: session id text).
pub const CONNECTION_GUEST: u16 = 31001;
/// Monitor connect (payload: session id text).
pub const CONNECTION_MONITOR: u16 = 31002;
/// Session disconnect.
pub const CONNECTION_DISCONNECT: u16 = 31010;
/// Forced guest disconnect (payload: target session id text).
pub const CONNECTION_DISCONNECT_GUEST: u16 = 31011;
/// Guest time budget update.
pub const CONNECTION_UPDATE_GUEST_TIME: u16 = 31012;
/// Guest status broadcast to remaining sessions (relay-originated).
pub const CONNECTION_UPDATE_GUEST_STATUS: u16 = 31013;

// ── Telemetry passthrough (311xx–312xx) ──────────────────────────

pub const LOGCAT_START: u16 = 31100;
pub const LOGCAT_STOP: u16 = 31101;
pub const LOGCAT_DATA: u16 = 31102;
pub const RESOURCE_START: u16 = 31103;
pub const RESOURCE_STOP: u16 = 31104;
pub const USAGE_NETWORK: u16 = 31110;
pub const USAGE_CPU: u16 = 31111;
pub const USAGE_MEMORY: u16 = 31112;
pub const ACK: u16 = 31120;

pub const SCRIPT_RESULT: u16 = 31200;
pub const START_EVENT_INDEX: u16 = 31201;
pub const START_EVENT_PATH: u16 = 31202;
pub const START_SCRIPT_RESULT: u16 = 31203;

// ── Input events (320xx) ─────────────────────────────────────────

pub const CLICK_HARDKEY: u16 = 32000;
pub const CLICK_TAP: u16 = 32001;
pub const CLICK_TOUCH_DOWN: u16 = 32002;
pub const CLICK_TOUCH_UP: u16 = 32003;
pub const CLICK_TOUCH_MOVE: u16 = 32004;
pub const CLICK_SWIPE: u16 = 32005;
pub const CLICK_MULTI_TOUCH_DOWN: u16 = 32006;
pub const CLICK_MULTI_TOUCH_UP: u16 = 32007;
pub const CLICK_MULTI_TOUCH_MOVE: u16 = 32008;
/// Combined touch event carrying its own click/move sub-code.
pub const CLICK_TOUCH_EVENT: u16 = 32009;

/// Sub-code inside a [`CLICK_TOUCH_EVENT`] payload meaning "click".
pub const TOUCH_SUBCODE_CLICK: u16 = 71;
/// Sub-code inside a [`CLICK_TOUCH_EVENT`] payload meaning "move".
pub const TOUCH_SUBCODE_MOVE: u16 = 72;

/// Periodic host keep-alive; excluded from per-frame debug logging.
pub const HEARTBEAT_HOST: u16 = 32100;

// ── Classification helpers ───────────────────────────────────────

/// Returns `true` for the four device-image identifiers whose frames
/// carry the mirroring geometry block.
pub fn is_device_image(command: u16) -> bool {
    matches!(
        command,
        DEVICE_PORTRAIT_IMAGE_PORTRAIT
            | DEVICE_LANDSCAPE_IMAGE_LANDSCAPE
            | DEVICE_PORTRAIT_IMAGE_LANDSCAPE
            | DEVICE_LANDSCAPE_IMAGE_PORTRAIT
            | WIDE_DEVICE_IMAGE_LANDSCAPE
            | WIDE_DEVICE_IMAGE_PORTRAIT
    )
}

// ── ConnectionType ───────────────────────────────────────────────

bitflags! {
    /// Session connection-type bitmask fixed at the first CONNECT frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ConnectionType: u8 {
        const HOST = 0b0001;
        const GUEST = 0b0010;
        const MONITOR = 0b0100;
        const CONTROLLER = 0b1000;
    }
}

impl ConnectionType {
    /// Human-readable role name for status lines.
    pub fn describe(&self) -> &'static str {
        if self.contains(ConnectionType::CONTROLLER) {
            "device controller"
        } else if self.contains(ConnectionType::MONITOR) {
            "monitor"
        } else if self.contains(ConnectionType::GUEST) {
            "guest"
        } else if self.contains(ConnectionType::HOST) {
            "host"
        } else {
            "unclassified"
        }
    }
}
