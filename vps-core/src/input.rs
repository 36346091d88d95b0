//! Touch input decoding and down/up correlation.
//!
//! Two encodings reach the relay: paired `CLICK_TOUCH_DOWN` /
//! `CLICK_TOUCH_UP` frames with 16-bit coordinates, correlated per
//! session by [`TouchTracker`], and the self-contained
//! `CLICK_TOUCH_EVENT` frame whose 16-bit sub-code selects click or
//! move with 32-bit coordinates.

use crate::command;
use crate::error::VpsError;

// ── TouchEvent ───────────────────────────────────────────────────

/// A classified input event, one case per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchEvent {
    Click {
        x: u32,
        y: u32,
    },
    /// A drag from `(from_x, from_y)` to `(x, y)`.
    Move {
        x: u32,
        y: u32,
        from_x: u32,
        from_y: u32,
    },
}

// ── TouchTracker ─────────────────────────────────────────────────

/// Correlates touch-down with touch-up per session.
///
/// Down-then-up at identical coordinates is a click; at differing
/// coordinates it is a move carrying both coordinate pairs. An up
/// with no recorded down degenerates to a click at its own position.
#[derive(Debug, Default)]
pub struct TouchTracker {
    last_down: Option<(u32, u32)>,
}

impl TouchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch_down(&mut self, x: u32, y: u32) {
        self.last_down = Some((x, y));
    }

    pub fn touch_up(&mut self, x: u32, y: u32) -> TouchEvent {
        match self.last_down.take() {
            Some((dx, dy)) if (dx, dy) != (x, y) => TouchEvent::Move {
                x,
                y,
                from_x: dx,
                from_y: dy,
            },
            _ => TouchEvent::Click { x, y },
        }
    }
}

// ── Payload decoding ─────────────────────────────────────────────

/// Decode the 16-bit coordinate pair of a tap / touch-down / touch-up
/// payload.
pub fn decode_coords(payload: &[u8]) -> Result<(u32, u32), VpsError> {
    if payload.len() < 4 {
        return Err(VpsError::TruncatedTouchPayload {
            len: payload.len(),
        });
    }
    let x = u16::from_be_bytes([payload[0], payload[1]]) as u32;
    let y = u16::from_be_bytes([payload[2], payload[3]]) as u32;
    Ok((x, y))
}

/// Decode a combined `CLICK_TOUCH_EVENT` payload.
///
/// Layout: `SUBCODE u16 | X u32 | Y u32 [| FROM_X u32 | FROM_Y u32]`.
/// Unknown sub-codes yield `Ok(None)` — the frame is still forwarded,
/// it just carries no event the relay understands.
pub fn decode_combined(payload: &[u8]) -> Result<Option<TouchEvent>, VpsError> {
    if payload.len() < 2 {
        return Err(VpsError::TruncatedTouchPayload {
            len: payload.len(),
        });
    }
    let subcode = u16::from_be_bytes([payload[0], payload[1]]);

    match subcode {
        command::TOUCH_SUBCODE_CLICK => {
            if payload.len() < 10 {
                return Err(VpsError::TruncatedTouchPayload {
                    len: payload.len(),
                });
            }
            Ok(Some(TouchEvent::Click {
                x: read_u32(payload, 2),
                y: read_u32(payload, 6),
            }))
        }
        command::TOUCH_SUBCODE_MOVE => {
            if payload.len() < 18 {
                return Err(VpsError::TruncatedTouchPayload {
                    len: payload.len(),
                });
            }
            Ok(Some(TouchEvent::Move {
                x: read_u32(payload, 2),
                y: read_u32(payload, 6),
                from_x: read_u32(payload, 10),
                from_y: read_u32(payload, 14),
            }))
        }
        _ => Ok(None),
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn down_up_same_position_is_click() {
        let mut tracker = TouchTracker::new();
        tracker.touch_down(100, 250);
        let ev = tracker.touch_up(100, 250);
        assert_eq!(ev, TouchEvent::Click { x: 100, y: 250 });
    }

    #[test]
    fn down_up_different_position_is_move() {
        let mut tracker = TouchTracker::new();
        tracker.touch_down(100, 250);
        let ev = tracker.touch_up(400, 600);
        assert_eq!(
            ev,
            TouchEvent::Move {
                x: 400,
                y: 600,
                from_x: 100,
                from_y: 250,
            }
        );
    }

    #[test]
    fn up_without_down_degenerates_to_click() {
        let mut tracker = TouchTracker::new();
        let ev = tracker.touch_up(10, 20);
        assert_eq!(ev, TouchEvent::Click { x: 10, y: 20 });
    }

    #[test]
    fn down_is_consumed_by_up() {
        let mut tracker = TouchTracker::new();
        tracker.touch_down(1, 2);
        let _ = tracker.touch_up(3, 4);
        // A second up with no fresh down has nothing to pair with.
        assert_eq!(tracker.touch_up(3, 4), TouchEvent::Click { x: 3, y: 4 });
    }

    #[test]
    fn combined_click_decodes() {
        let mut payload = command::TOUCH_SUBCODE_CLICK.to_be_bytes().to_vec();
        payload.extend_from_slice(&500u32.to_be_bytes());
        payload.extend_from_slice(&900u32.to_be_bytes());

        let ev = decode_combined(&payload).unwrap().unwrap();
        assert_eq!(ev, TouchEvent::Click { x: 500, y: 900 });
    }

    #[test]
    fn combined_move_decodes_both_pairs() {
        let mut payload = command::TOUCH_SUBCODE_MOVE.to_be_bytes().to_vec();
        for v in [500u32, 900, 100, 200] {
            payload.extend_from_slice(&v.to_be_bytes());
        }

        let ev = decode_combined(&payload).unwrap().unwrap();
        assert_eq!(
            ev,
            TouchEvent::Move {
                x: 500,
                y: 900,
                from_x: 100,
                from_y: 200,
            }
        );
    }

    #[test]
    fn combined_unknown_subcode_is_none() {
        let payload = 99u16.to_be_bytes().to_vec();
        assert!(decode_combined(&payload).unwrap().is_none());
    }

    #[test]
    fn truncated_payloads_rejected() {
        assert!(decode_coords(&[0, 1]).is_err());
        assert!(decode_combined(&[0]).is_err());
        let short = command::TOUCH_SUBCODE_MOVE.to_be_bytes().to_vec();
        assert!(decode_combined(&short).is_err());
    }
}
