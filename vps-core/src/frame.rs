//! Wire frame types for the VPS relay protocol.
//!
//! Two layouts share one envelope:
//!
//! ```text
//! START | LEN      | COMMAND  | DEVICE | BODY      | CHECKSUM | END
//! 0x7F  | u32 BE   | u16 BE   | u8     | LEN bytes | u16 BE   | 0xEF
//! ```
//!
//! On-wire size is always `LEN + 11`. A control [`Frame`] carries a
//! raw command-specific payload as its BODY. A [`MirrorFrame`] BODY
//! additionally opens with a fixed info block:
//!
//! ```text
//! RESERVED(8) | LEFT u16 | TOP u16 | RIGHT u16 | BOTTOM u16 | KEYFRAME u8 | IMAGE…
//! ```
//!
//! so a mirroring LEN is always `image.len() + 17`. Encode re-derives
//! LEN from the payload on every call — a stale length on a mutated
//! frame never reaches the wire. Decode distinguishes "insufficient
//! data" (`Ok(None)`) from "malformed" (`Err`); a malformed frame
//! desynchronizes the stream and the owning connection must be closed.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::VpsError;

/// First byte of every frame.
pub const START_MARKER: u8 = 0x7F;
/// Last byte of every frame.
pub const END_MARKER: u8 = 0xEF;

/// Bytes before the BODY: marker + length + command + device number.
pub const HEADER_LEN: usize = 8;
/// Envelope bytes around the BODY: header + checksum + end marker.
pub const ENVELOPE_OVERHEAD: usize = 11;
/// Fixed info block at the front of a mirroring BODY.
pub const MIRROR_INFO_LEN: usize = 17;

/// Upper bound on a declared BODY length. Anything larger is treated
/// as stream desynchronization rather than a frame worth buffering.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

// ── Region ───────────────────────────────────────────────────────

/// Pixel bounding box of the changed area inside a mirroring frame,
/// expressed in the device's capture space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub left: u16,
    pub top: u16,
    pub right: u16,
    pub bottom: u16,
}

impl Region {
    pub fn new(left: u16, top: u16, right: u16, bottom: u16) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> u16 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u16 {
        self.bottom.saturating_sub(self.top)
    }
}

// ── Frame ────────────────────────────────────────────────────────

/// One decoded control frame.
///
/// The checksum is a pass-through value by protocol contract: carried,
/// never validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u16,
    pub device: u8,
    pub checksum: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a frame with the conventional pass-through checksum.
    pub fn new(command: u16, device: u8, payload: Vec<u8>) -> Self {
        Self {
            command,
            device,
            checksum: 1,
            payload,
        }
    }

    /// Attempt to decode one frame from the front of `src`, validating
    /// the START/END markers (control-session variant).
    ///
    /// Returns `Ok(None)` when more bytes are needed, and
    /// `Ok(Some((frame, consumed)))` on success.
    pub fn decode(src: &[u8], max_devices: u8) -> Result<Option<(Frame, usize)>, VpsError> {
        Self::decode_inner(src, max_devices, true)
    }

    /// Device-socket variant of [`Frame::decode`]: same layout, but the
    /// START/END markers are not re-validated (channel integrity is
    /// assumed on image sockets).
    pub fn decode_unchecked(src: &[u8], max_devices: u8) -> Result<Option<(Frame, usize)>, VpsError> {
        Self::decode_inner(src, max_devices, false)
    }

    fn decode_inner(
        src: &[u8],
        max_devices: u8,
        validate_markers: bool,
    ) -> Result<Option<(Frame, usize)>, VpsError> {
        let Some(header) = Header::peek(src, max_devices)? else {
            return Ok(None);
        };
        let total = header.wire_len();
        if src.len() < total {
            return Ok(None);
        }

        let start = src[0];
        let end = src[total - 1];
        if validate_markers && (start != START_MARKER || end != END_MARKER) {
            return Err(VpsError::MarkerMismatch { start, end });
        }

        let checksum = u16::from_be_bytes([src[HEADER_LEN + header.len], src[HEADER_LEN + header.len + 1]]);
        let payload = src[HEADER_LEN..HEADER_LEN + header.len].to_vec();

        Ok(Some((
            Frame {
                command: header.command,
                device: header.device,
                checksum,
                payload,
            },
            total,
        )))
    }

    /// Encode into the wire envelope, re-deriving LEN from the payload.
    pub fn encode(&self) -> Bytes {
        let len = self.payload.len();
        let mut buf = BytesMut::with_capacity(len + ENVELOPE_OVERHEAD);
        buf.put_u8(START_MARKER);
        buf.put_u32(len as u32);
        buf.put_u16(self.command);
        buf.put_u8(self.device);
        buf.put_slice(&self.payload);
        buf.put_u16(self.checksum);
        buf.put_u8(END_MARKER);
        buf.freeze()
    }

    /// Total on-wire size of this frame once encoded.
    pub fn wire_len(&self) -> usize {
        self.payload.len() + ENVELOPE_OVERHEAD
    }
}

// ── MirrorFrame ──────────────────────────────────────────────────

/// One decoded mirroring frame: a changed-region image plus its
/// bounding box and keyframe flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorFrame {
    pub command: u16,
    pub device: u8,
    pub checksum: u16,
    pub region: Region,
    pub keyframe: bool,
    pub image: Vec<u8>,
}

impl MirrorFrame {
    /// Attempt to decode one mirroring frame from the front of `src`.
    ///
    /// The device variant of the reader does not re-validate the
    /// START/END markers — channel integrity is assumed on image
    /// sockets.
    pub fn decode(src: &[u8], max_devices: u8) -> Result<Option<(MirrorFrame, usize)>, VpsError> {
        let Some(header) = Header::peek(src, max_devices)? else {
            return Ok(None);
        };
        if header.len < MIRROR_INFO_LEN {
            return Err(VpsError::TruncatedMirrorBody { len: header.len });
        }
        let total = header.wire_len();
        if src.len() < total {
            return Ok(None);
        }

        let region = Region {
            left: u16::from_be_bytes([src[16], src[17]]),
            top: u16::from_be_bytes([src[18], src[19]]),
            right: u16::from_be_bytes([src[20], src[21]]),
            bottom: u16::from_be_bytes([src[22], src[23]]),
        };
        let keyframe = src[24] != 0;
        let image = src[25..HEADER_LEN + header.len].to_vec();
        let checksum = u16::from_be_bytes([src[HEADER_LEN + header.len], src[HEADER_LEN + header.len + 1]]);

        Ok(Some((
            MirrorFrame {
                command: header.command,
                device: header.device,
                checksum,
                region,
                keyframe,
                image,
            },
            total,
        )))
    }

    /// Encode into the wire envelope with the mirroring info block,
    /// re-deriving LEN as `image.len() + 17`.
    pub fn encode(&self) -> Bytes {
        let len = self.image.len() + MIRROR_INFO_LEN;
        let mut buf = BytesMut::with_capacity(len + ENVELOPE_OVERHEAD);
        buf.put_u8(START_MARKER);
        buf.put_u32(len as u32);
        buf.put_u16(self.command);
        buf.put_u8(self.device);
        buf.put_bytes(0, 8); // reserved
        buf.put_u16(self.region.left);
        buf.put_u16(self.region.top);
        buf.put_u16(self.region.right);
        buf.put_u16(self.region.bottom);
        buf.put_u8(self.keyframe as u8);
        buf.put_slice(&self.image);
        buf.put_u16(self.checksum);
        buf.put_u8(END_MARKER);
        buf.freeze()
    }

    /// Declared BODY length for this frame.
    pub fn body_len(&self) -> usize {
        self.image.len() + MIRROR_INFO_LEN
    }
}

// ── DeviceFrame ──────────────────────────────────────────────────

/// A frame received over a device mirroring socket.
///
/// The four device-image commands carry the mirroring info block;
/// anything else (notably a capture-failed notification) is a plain
/// control frame riding the same channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFrame {
    Mirror(MirrorFrame),
    Control(Frame),
}

impl DeviceFrame {
    pub fn device(&self) -> u8 {
        match self {
            DeviceFrame::Mirror(f) => f.device,
            DeviceFrame::Control(f) => f.device,
        }
    }

    pub fn command(&self) -> u16 {
        match self {
            DeviceFrame::Mirror(f) => f.command,
            DeviceFrame::Control(f) => f.command,
        }
    }
}

// ── Header peeking ───────────────────────────────────────────────

/// The fixed fields readable once [`HEADER_LEN`] bytes are buffered.
struct Header {
    len: usize,
    command: u16,
    device: u8,
}

impl Header {
    /// Read the envelope header, validating the device number range
    /// and declared length. `Ok(None)` means fewer than [`HEADER_LEN`]
    /// bytes are available.
    fn peek(src: &[u8], max_devices: u8) -> Result<Option<Header>, VpsError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
        let command = u16::from_be_bytes([src[5], src[6]]);
        let device = src[7];

        if len > MAX_PAYLOAD_SIZE {
            return Err(VpsError::PayloadTooLarge {
                size: len,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        if device > max_devices {
            return Err(VpsError::DeviceOutOfRange {
                value: device,
                max: max_devices,
            });
        }

        Ok(Some(Header {
            len,
            command,
            device,
        }))
    }

    fn wire_len(&self) -> usize {
        self.len + ENVELOPE_OVERHEAD
    }
}

// ── Tests ────────────────────────────────────────────────────────
