//! Orientation-aware remapping of device image frames.
//!
//! Devices report crop regions in their own unrotated pixel space,
//! but viewers receive the already-rotated, re-encoded image bytes —
//! so whenever the relay rotates an image it must also rewrite the
//! command identifier and swap the bounding-box axes so the box stays
//! valid against the rotated frame dimensions.
//!
//! Only the four device-image commands participate. Everything else
//! passes through with geometry untouched.

use crate::command;
use crate::frame::Region;

// ── Rotation ─────────────────────────────────────────────────────

/// Rotation the external image transform must apply to the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// +90°.
    Clockwise,
    /// −90°.
    CounterClockwise,
}

impl Rotation {
    /// Signed degrees for the external transform call.
    pub fn degrees(&self) -> i32 {
        match self {
            Rotation::Clockwise => 90,
            Rotation::CounterClockwise => -90,
        }
    }
}

// ── OrientationState ─────────────────────────────────────────────

/// Per-device orientation flags and keyframe dimensions.
///
/// `is_wide` is fixed from the reported resolution at connect time;
/// `is_vertical` toggles with orientation-change commands. Keyframe
/// dimensions are captured from the first keyframe and then immutable
/// for the session.
#[derive(Debug, Clone)]
pub struct OrientationState {
    pub is_wide: bool,
    pub is_vertical: bool,
    keyframe_width: Option<u16>,
    keyframe_height: Option<u16>,
}

impl OrientationState {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            is_wide: width > height,
            is_vertical: true,
            keyframe_width: None,
            keyframe_height: None,
        }
    }

    /// Capture base dimensions from the first keyframe seen.
    pub fn observe_keyframe(&mut self, region: &Region) {
        if self.keyframe_width.is_none() {
            self.keyframe_width = Some(region.right);
            self.keyframe_height = Some(region.bottom);
        }
    }

    /// Set the vertical flag; returns `true` when it changed.
    pub fn set_vertical(&mut self, vertical: bool) -> bool {
        if self.is_vertical == vertical {
            return false;
        }
        self.is_vertical = vertical;
        true
    }

    pub fn keyframe_size(&self) -> Option<(u16, u16)> {
        Some((self.keyframe_width?, self.keyframe_height?))
    }

    /// `min(keyframeWidth, keyframeHeight)`.
    fn short_side(&self) -> Option<u16> {
        let (w, h) = self.keyframe_size()?;
        Some(w.min(h))
    }

    /// `max(keyframeWidth, keyframeHeight)`.
    fn long_side(&self) -> Option<u16> {
        let (w, h) = self.keyframe_size()?;
        Some(w.max(h))
    }
}

// ── Normalization ────────────────────────────────────────────────

/// Outcome of normalizing one device image frame: the rewritten
/// command, the rotation (if any) to request from the image
/// transform, and the remapped bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalized {
    pub command: u16,
    pub rotation: Option<Rotation>,
    pub region: Region,
}

/// Rewrite the command identifier and remap the bounding box for one
/// device image frame.
///
/// Command rewrite rules, in order:
/// 1. wide device: portrait-on-portrait is reported as
///    landscape-on-landscape;
/// 2. a portrait capture while the viewer is horizontal becomes
///    landscape-on-portrait; a landscape capture while the viewer is
///    vertical becomes portrait-on-landscape.
///
/// Three resolved cases then require rotating the image and swapping
/// the box axes; frames that need no rotation keep their geometry.
/// Before the first keyframe fixes the base dimensions no remap is
/// possible, so such frames pass through unrotated.
pub fn normalize(state: &OrientationState, command_id: u16, region: Region) -> Normalized {
    use command::{
        DEVICE_LANDSCAPE_IMAGE_LANDSCAPE as LL, DEVICE_LANDSCAPE_IMAGE_PORTRAIT as LP,
        DEVICE_PORTRAIT_IMAGE_LANDSCAPE as PL, DEVICE_PORTRAIT_IMAGE_PORTRAIT as PP,
    };

    let mut cmd = command_id;
    if state.is_wide && cmd == PP {
        cmd = LL;
    }
    if !state.is_vertical && cmd == PP {
        cmd = LP;
    } else if state.is_vertical && cmd == LL {
        cmd = PL;
    }

    let case = match cmd {
        LL if !state.is_wide => state.short_side().map(|s| (Rotation::CounterClockwise, s)),
        PP if state.is_wide => state.long_side().map(|l| (Rotation::CounterClockwise, l)),
        PL if state.is_wide => state.short_side().map(|s| (Rotation::Clockwise, s)),
        _ => None,
    };

    match case {
        Some((rotation, side)) => Normalized {
            command: cmd,
            rotation: Some(rotation),
            region: remap_region(region, rotation, side),
        },
        None => Normalized {
            command: cmd,
            rotation: None,
            region,
        },
    }
}

/// Swap the bounding-box axes for a rotated frame. `side` is the
/// keyframe dimension the rotated axis folds against.
fn remap_region(r: Region, rotation: Rotation, side: u16) -> Region {
    match rotation {
        Rotation::CounterClockwise => Region {
            left: r.top,
            top: side.saturating_sub(r.right),
            right: r.bottom,
            bottom: side.saturating_sub(r.left),
        },
        Rotation::Clockwise => Region {
            left: side.saturating_sub(r.bottom),
            top: r.left,
            right: side.saturating_sub(r.top),
            bottom: r.right,
        },
    }
}

// ── Tests ────────────────────────────────────────────────────────
