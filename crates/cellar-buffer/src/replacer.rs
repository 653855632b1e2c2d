//! Page replacement policies for the buffer pool.

use crate::frame::FrameDescriptor;
use cellar_common::page::FrameId;
use tracing::trace;

/// Trait for page replacement algorithms.
pub trait Replacer {
    /// Selects a frame to hold a new page.
    ///
    /// The returned frame is either free or bound but unpinned; reclaiming a
    /// bound frame is left to the caller. Returns None if every frame is
    /// pinned.
    fn pick_victim(&mut self, frames: &mut [FrameDescriptor]) -> Option<FrameId>;
}

/// Clock (second-chance) replacement.
///
/// The hand sweeps the frames in a circle and keeps its position between
/// calls. At each frame:
/// 1. A free frame is taken immediately
/// 2. A pinned frame is skipped
/// 3. A referenced frame has its reference bit cleared and is skipped
/// 4. Otherwise the frame is the victim
///
/// If one full revolution finds every frame pinned, the sweep gives up.
/// Otherwise the first revolution has cleared every unpinned frame's
/// reference bit, so the second revolution is guaranteed to find a victim.
#[derive(Debug, Default)]
pub struct ClockReplacer {
    /// Next frame to examine.
    hand: usize,
}

impl ClockReplacer {
    /// Creates a clock replacer with the hand on frame 0.
    pub fn new() -> Self {
        Self { hand: 0 }
    }

    /// Returns the current hand position.
    pub fn hand(&self) -> usize {
        self.hand
    }

    #[inline]
    fn advance(&mut self, num_frames: usize) {
        self.hand = (self.hand + 1) % num_frames;
    }
}

impl Replacer for ClockReplacer {
    fn pick_victim(&mut self, frames: &mut [FrameDescriptor]) -> Option<FrameId> {
        let num_frames = frames.len();
        if num_frames == 0 {
            return None;
        }

        let mut pinned = 0;
        for step in 0..(2 * num_frames) {
            let idx = self.hand;
            self.advance(num_frames);
            let frame = &mut frames[idx];

            if !frame.is_valid() {
                trace!(frame = idx, "clock picked free frame");
                return Some(frame.frame_id());
            }

            if frame.is_pinned() {
                if step < num_frames {
                    pinned += 1;
                    if pinned == num_frames {
                        return None;
                    }
                }
                continue;
            }

            if frame.reference_bit() {
                frame.set_reference_bit(false);
                continue;
            }

            trace!(frame = idx, "clock picked victim");
            return Some(frame.frame_id());
        }

        None
    }
}
