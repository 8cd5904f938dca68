//! # Shared Frame Slot
//!
//! Single-entry, last-write-wins holder for the most recently encoded frame.
//! One writer (the engine's streaming thread, through the publisher) and any
//! number of readers (viewer streams). Readers clone the whole frame under the
//! lock, so a reader observes either the previous frame or the new one, never
//! a mix. Payloads are `Bytes`, so the clone is a reference-count bump.

use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;

/// Content type of every frame the encoder produces.
pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// A compressed image ready to be written to viewers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    payload: Bytes,
    content_type: &'static str,
    width: u32,
    height: u32,
    sequence: u64,
}

impl EncodedFrame {
    /// Wrap a JPEG payload. Returns `None` for an empty payload.
    pub fn jpeg(payload: impl Into<Bytes>, width: u32, height: u32) -> Option<Self> {
        let payload = payload.into();
        if payload.is_empty() {
            return None;
        }
        Some(Self {
            payload,
            content_type: JPEG_CONTENT_TYPE,
            width,
            height,
            sequence: 0,
        })
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Position in the slot's write order; 0 until written.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

#[derive(Debug, Default)]
struct SlotInner {
    writes: u64,
    current: Option<EncodedFrame>,
}

/// The per-session latest-frame slot.
#[derive(Debug, Default)]
pub struct FrameSlot {
    inner: Mutex<SlotInner>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a half-written frame (the
    // whole value is swapped), so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the current frame and return the sequence number assigned.
    pub fn write(&self, mut frame: EncodedFrame) -> u64 {
        let mut inner = self.lock();
        inner.writes += 1;
        frame.sequence = inner.writes;
        inner.current = Some(frame);
        inner.writes
    }

    /// Snapshot of the current frame, if any.
    pub fn read(&self) -> Option<EncodedFrame> {
        self.lock().current.clone()
    }

    /// Drop the current frame. Readers see an empty slot until the next write.
    pub fn clear(&self) {
        self.lock().current = None;
    }

    /// Number of writes so far.
    pub fn sequence(&self) -> u64 {
        self.lock().writes
    }

    pub fn is_empty(&self) -> bool {
        self.lock().current.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn frame(fill: u8, len: usize) -> EncodedFrame {
        EncodedFrame::jpeg(vec![fill; len], 4, 4).unwrap()
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert!(EncodedFrame::jpeg(Vec::new(), 4, 4).is_none());
        assert!(EncodedFrame::jpeg(Bytes::new(), 4, 4).is_none());
    }

    #[test]
    fn starts_empty() {
        let slot = FrameSlot::new();
        assert!(slot.is_empty());
        assert_eq!(slot.read(), None);
        assert_eq!(slot.sequence(), 0);
    }

    #[test]
    fn last_write_wins() {
        let slot = FrameSlot::new();
        slot.write(frame(1, 8));
        slot.write(frame(2, 8));
        let seq = slot.write(frame(3, 8));

        let current = slot.read().unwrap();
        assert_eq!(seq, 3);
        assert_eq!(current.sequence(), 3);
        assert!(current.payload().iter().all(|&b| b == 3));
    }

    #[test]
    fn clear_keeps_sequence() {
        let slot = FrameSlot::new();
        slot.write(frame(9, 2));
        slot.clear();
        assert!(slot.is_empty());
        assert_eq!(slot.sequence(), 1);
    }

    #[test]
    fn readers_never_observe_mixed_frames() {
        let slot = Arc::new(FrameSlot::new());
        let writer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                for i in 0..2_000u32 {
                    let fill = (i % 251) as u8;
                    // Vary the length too, so a torn read would show up either way.
                    slot.write(frame(fill, 64 + (i as usize % 17)));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let slot = Arc::clone(&slot);
                thread::spawn(move || {
                    let mut last_seq = 0;
                    for _ in 0..2_000 {
                        if let Some(current) = slot.read() {
                            let payload = current.payload();
                            assert!(!payload.is_empty());
                            assert!(payload.iter().all(|&b| b == payload[0]));
                            assert!(current.sequence() >= last_seq);
                            last_seq = current.sequence();
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(slot.sequence(), 2_000);
    }
}
