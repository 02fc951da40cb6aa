//! Single-slot backpressure buffer for frame workloads
//!
//! A producer such as a camera feed never blocks, and the consumer never
//! falls more than one frame behind: while a frame is being processed only
//! the newest arrival is kept pending.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Raw frame payload with its dimensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameData {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl FrameData {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            pixels,
            width,
            height,
        }
    }
}

struct Slot<F> {
    pending: Option<F>,
    processing: bool,
    dropped_frames: u64,
}

/// Capacity-one queue that replaces the pending frame while busy
pub struct FrameQueue<F = FrameData> {
    slot: Mutex<Slot<F>>,
}

impl<F> Default for FrameQueue<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> FrameQueue<F> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                pending: None,
                processing: false,
                dropped_frames: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<F>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer a frame.
    ///
    /// Returns false when a pending frame had to be replaced because the
    /// consumer is busy; the incoming frame is kept either way.
    pub fn enqueue(&self, frame: F) -> bool {
        let mut slot = self.lock();
        let replaced = slot.processing && slot.pending.is_some();
        if replaced {
            slot.dropped_frames += 1;
        }
        slot.pending = Some(frame);
        !replaced
    }

    /// Take the pending frame unless one is already being processed
    pub fn dequeue(&self) -> Option<F> {
        let mut slot = self.lock();
        if slot.processing {
            return None;
        }
        let frame = slot.pending.take()?;
        slot.processing = true;
        Some(frame)
    }

    /// Finish processing the current frame
    pub fn mark_done(&self) {
        self.lock().processing = false;
    }

    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    pub fn is_processing(&self) -> bool {
        self.lock().processing
    }

    /// Frames replaced while busy since creation or the last counter reset
    pub fn dropped_frames(&self) -> u64 {
        self.lock().dropped_frames
    }

    /// Clear pending and processing state; the drop counter is kept
    pub fn reset(&self) {
        let mut slot = self.lock();
        slot.pending = None;
        slot.processing = false;
    }

    pub fn reset_counters(&self) {
        self.lock().dropped_frames = 0;
    }
}

impl<F: Clone> FrameQueue<F> {
    /// Copy of the pending frame without taking it
    pub fn peek_pending(&self) -> Option<F> {
        self.lock().pending.clone()
    }
}
