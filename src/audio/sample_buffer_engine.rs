/// Fixed-capacity circular store of the most recent captured samples
///
/// The engine sizes it to one second of audio. Written from the capture
/// callback, snapshotted by the spectrum trigger; both under the engine lock.
#[derive(Debug, Clone)]
pub struct SampleRingBuffer {
    samples: Vec<f32>,

    // Next write position, always in [0, capacity)
    write_position: usize,
}

impl SampleRingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            samples: vec![0.0; capacity],
            write_position: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    pub fn write_position(&self) -> usize {
        self.write_position
    }

    /// Write `block` at the cursor, wrapping around the end
    ///
    /// Blocks longer than the capacity overwrite themselves; only their last
    /// `capacity` samples survive, exactly as if written one by one.
    pub fn append(&mut self, block: &[f32]) {
        let capacity = self.samples.len();
        let skipped = block.len().saturating_sub(capacity);
        let tail = &block[skipped..];

        let start = (self.write_position + skipped % capacity) % capacity;
        let first_len = tail.len().min(capacity - start);

        self.samples[start..start + first_len].copy_from_slice(&tail[..first_len]);
        self.samples[..tail.len() - first_len].copy_from_slice(&tail[first_len..]);

        self.write_position = (start + tail.len()) % capacity;
    }

    /// Whole buffer in chronological order, oldest sample first
    pub fn snapshot(&self) -> Vec<f32> {
        let mut ordered = Vec::with_capacity(self.samples.len());
        self.snapshot_into(&mut ordered);
        ordered
    }

    /// Same as [`snapshot`](Self::snapshot) but reuses `out`'s allocation
    pub fn snapshot_into(&self, out: &mut Vec<f32>) {
        out.clear();
        out.extend_from_slice(&self.samples[self.write_position..]);
        out.extend_from_slice(&self.samples[..self.write_position]);
    }
}
