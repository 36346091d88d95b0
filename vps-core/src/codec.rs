//! Incremental frame reassembly over `tokio_util` codecs.
//!
//! Each connection keeps one `BytesMut` accumulator (owned by the
//! `FramedRead` driving it). A decode call consumes exactly one
//! frame's span when enough bytes are buffered, leaves trailing bytes
//! for the next pass, and returns `Ok(None)` while a frame is still
//! split across reads — so both coalesced and fragmented reads fall
//! out of the same loop.
//!
//! Two variants exist:
//! - [`FrameCodec`] for client/control sockets — validates the
//!   START/END markers of every frame.
//! - [`MirrorCodec`] for device mirroring sockets — parses the
//!   mirroring info block and does not re-validate markers.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::command;
use crate::error::VpsError;
use crate::frame::{DeviceFrame, Frame, MirrorFrame};

// ── FrameCodec ───────────────────────────────────────────────────

/// Codec for client control sockets.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_devices: u8,
}

impl FrameCodec {
    pub fn new(max_devices: u8) -> Self {
        Self { max_devices }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(command::MAX_DEVICES)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = VpsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, VpsError> {
        match Frame::decode(src, self.max_devices)? {
            Some((frame, consumed)) => {
                src.advance(consumed);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = VpsError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), VpsError> {
        dst.extend_from_slice(&item.encode());
        Ok(())
    }
}

// ── MirrorCodec ──────────────────────────────────────────────────

/// Codec for device mirroring sockets.
///
/// Frames whose command is one of the device-image identifiers decode
/// as [`MirrorFrame`]s; anything else on the channel (capture-failed
/// notifications) decodes as a plain control [`Frame`].
#[derive(Debug, Clone)]
pub struct MirrorCodec {
    max_devices: u8,
}

impl MirrorCodec {
    pub fn new(max_devices: u8) -> Self {
        Self { max_devices }
    }
}

impl Default for MirrorCodec {
    fn default() -> Self {
        Self::new(command::MAX_DEVICES)
    }
}

impl Decoder for MirrorCodec {
    type Item = DeviceFrame;
    type Error = VpsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<DeviceFrame>, VpsError> {
        // Peek the command to pick the body layout; both paths share
        // the envelope scan and re-check buffered length themselves.
        if src.len() < crate::frame::HEADER_LEN {
            return Ok(None);
        }
        let cmd = u16::from_be_bytes([src[5], src[6]]);

        if command::is_device_image(cmd) {
            match MirrorFrame::decode(src, self.max_devices)? {
                Some((frame, consumed)) => {
                    src.advance(consumed);
                    Ok(Some(DeviceFrame::Mirror(frame)))
                }
                None => Ok(None),
            }
        } else {
            match Frame::decode_unchecked(src, self.max_devices)? {
                Some((frame, consumed)) => {
                    src.advance(consumed);
                    Ok(Some(DeviceFrame::Control(frame)))
                }
                None => Ok(None),
            }
        }
    }
}

impl Encoder<MirrorFrame> for MirrorCodec {
    type Error = VpsError;

    fn encode(&mut self, item: MirrorFrame, dst: &mut BytesMut) -> Result<(), VpsError> {
        dst.extend_from_slice(&item.encode());
        Ok(())
    }
}

impl Encoder<Frame> for MirrorCodec {
    type Error = VpsError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), VpsError> {
        dst.extend_from_slice(&item.encode());
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
