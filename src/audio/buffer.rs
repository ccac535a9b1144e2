use ringbuf::{traits::*, HeapRb};

/// Fixed-capacity FIFO of PCM frames
///
/// Pre-sized at construction; pushes and pops never allocate.
pub struct FrameRingBuffer {
    buffer: HeapRb<i16>,
}

impl FrameRingBuffer {
    /// Create a new ring buffer with the specified capacity in frames
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: HeapRb::new(capacity.max(1)),
        }
    }

    /// Append frames, evicting the oldest ones when full
    /// Returns the number of frames that had to be evicted
    pub fn push(&mut self, frames: &[i16]) -> usize {
        let mut evicted = 0;

        for &frame in frames {
            if self.buffer.try_push(frame).is_err() {
                let _ = self.buffer.try_pop();
                let _ = self.buffer.try_push(frame);
                evicted += 1;
            }
        }

        evicted
    }

    /// Move up to `output.len()` frames into `output`
    /// Returns the number of frames written
    pub fn pop_into(&mut self, output: &mut [i16]) -> usize {
        self.buffer.pop_slice(output)
    }

    /// Get the number of frames available to read
    pub fn len(&self) -> usize {
        self.buffer.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all buffered frames
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity().get()
    }
}
