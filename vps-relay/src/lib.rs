//! # vps-relay
//!
//! The VPS mirroring relay service: accepts viewer/controller client
//! connections on one listener, maintains outbound control and
//! mirroring connections to devices, normalizes device image frames
//! for viewer orientation, and fans them out per device.
//!
//! Topology: one supervisor task routing between one session worker
//! (listener + session registry) and one device worker per slot
//! (device endpoint + capture pipeline). Workers share nothing but
//! `RelayMessage` channels.

pub mod device;
pub mod device_worker;
pub mod multiplexer;
pub mod session;
pub mod session_worker;
pub mod storage;
pub mod supervisor;
pub mod transform;

pub use device::{DeviceEndpoint, ProcessedMirror};
pub use multiplexer::{RegisterOutcome, SessionRegistry};
pub use session::{ClientSession, SessionAction};
pub use storage::Storage;
pub use supervisor::Supervisor;
pub use transform::{AnimationComposer, ImageTransform, NullComposer, PassthroughTransform};
