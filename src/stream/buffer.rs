//! Bounded window of appended segments.
//!
//! The engine keeps the segments it has handed to the surface so a media
//! recovery can re-feed a fresh decode pipeline from the playhead. Anything
//! further behind the playhead than the back-buffer horizon is dropped.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;

/// A segment retained in the window, positioned on the media timeline.
#[derive(Debug, Clone)]
pub struct BufferedSegment {
    pub sequence: u64,
    /// Timeline offset of the first sample, in seconds.
    pub start: f64,
    pub duration: f64,
    pub data: Bytes,
}

impl BufferedSegment {
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

#[derive(Debug)]
pub struct BufferWindow {
    back_buffer: f64,
    segments: VecDeque<BufferedSegment>,
    end: f64,
}

impl BufferWindow {
    #[must_use]
    pub fn new(back_buffer: Duration) -> Self {
        Self {
            back_buffer: back_buffer.as_secs_f64(),
            segments: VecDeque::new(),
            end: 0.0,
        }
    }

    /// Append a segment at the end of the timeline and return its start time.
    pub fn push(&mut self, sequence: u64, duration: f64, data: Bytes) -> f64 {
        let start = self.end;
        self.end += duration;
        self.segments.push_back(BufferedSegment {
            sequence,
            start,
            duration,
            data,
        });
        start
    }

    /// Drop segments that ended more than the horizon before `position`.
    /// Returns the evicted sequence numbers, oldest first.
    pub fn evict_behind(&mut self, position: Duration) -> Vec<u64> {
        let cutoff = position.as_secs_f64() - self.back_buffer;
        let mut evicted = Vec::new();
        while let Some(front) = self.segments.front() {
            if front.end() > cutoff {
                break;
            }
            evicted.push(front.sequence);
            self.segments.pop_front();
        }
        evicted
    }

    /// Media buffered past `position`.
    #[must_use]
    pub fn buffered_ahead(&self, position: Duration) -> Duration {
        Duration::from_secs_f64((self.end - position.as_secs_f64()).max(0.0))
    }

    /// Segments still needed to resume playback at `position`.
    pub fn from_position(&self, position: Duration) -> impl Iterator<Item = &BufferedSegment> {
        let pos = position.as_secs_f64();
        self.segments.iter().filter(move |s| s.end() > pos)
    }

    /// Sequence number the next fetched segment should carry.
    #[must_use]
    pub fn next_sequence(&self) -> Option<u64> {
        self.segments.back().map(|s| s.sequence + 1)
    }

    #[must_use]
    pub fn end(&self) -> Duration {
        Duration::from_secs_f64(self.end)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}
