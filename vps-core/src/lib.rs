//! # vps-core
//!
//! Core protocol library for the VPS screen-mirroring relay.
//!
//! This crate contains:
//! - **Wire types**: `Frame`, `MirrorFrame`, `DeviceFrame`, `Region`
//! - **Command identifiers**: the protocol's numeric command space and
//!   `ConnectionType` classification flags
//! - **Codec**: `FrameCodec` and `MirrorCodec` for framed TCP I/O via
//!   `tokio_util`
//! - **Network**: `Connection` for managed TCP connections
//! - **Orientation**: rotation resolution and bounding-box remapping
//!   for device image frames
//! - **Input**: touch payload decoding and down/up correlation
//! - **Messages**: `RelayMessage` for cross-worker routing
//! - **Config**: `RelayConfig`, TOML-backed relay settings
//! - **Error**: `VpsError` — typed, `thiserror`-based error hierarchy

pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod frame;
pub mod input;
pub mod message;
pub mod network;
pub mod orientation;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{FrameCodec, MirrorCodec};
pub use command::ConnectionType;
pub use config::RelayConfig;
pub use error::VpsError;
pub use frame::{
    DeviceFrame, ENVELOPE_OVERHEAD, Frame, MAX_PAYLOAD_SIZE, MIRROR_INFO_LEN, MirrorFrame, Region,
};
pub use input::{TouchEvent, TouchTracker};
pub use message::{FileKind, RelayMessage};
pub use network::Connection;
pub use orientation::{Normalized, OrientationState, Rotation, normalize};
