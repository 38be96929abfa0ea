use crate::error::{Error, Result};

/// Single-producer/single-consumer byte queue.
///
/// This is the session layer's per-connection FIFO primitive: a fixed
/// capacity ring supporting enqueue, peek, dequeue, zero-copy segment
/// views and dequeue-notification arming. The engine uses one pair per
/// side of a connection (transport RX/TX, application RX/TX).
#[derive(Debug)]
pub struct Fifo {
    data: Box<[u8]>,
    head: usize,
    len: usize,
    deq_ntf: bool,
}

impl Fifo {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
            deq_ntf: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes available for reading.
    pub fn max_dequeue(&self) -> usize {
        self.len
    }

    /// Free space available for writing.
    pub fn max_enqueue(&self) -> usize {
        self.data.len() - self.len
    }

    /// Copies as much of `src` as fits, returns the number of bytes taken.
    pub fn enqueue(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.max_enqueue());
        let tail = (self.head + self.len) % self.data.len();
        let first = n.min(self.data.len() - tail);
        self.data[tail..tail + first].copy_from_slice(&src[..first]);
        self.data[..n - first].copy_from_slice(&src[first..n]);
        self.len += n;
        n
    }

    /// Writes `src` in full or not at all.
    pub fn enqueue_all(&mut self, src: &[u8]) -> Result<()> {
        if src.len() > self.max_enqueue() {
            return Err(Error::FifoFull);
        }
        self.enqueue(src);
        Ok(())
    }

    /// Multi-segment write that succeeds only if every segment fits.
    ///
    /// Used for the control-message + wire-bytes pair, which must reach
    /// the application as one unit.
    pub fn enqueue_atomic(&mut self, segs: &[&[u8]]) -> Result<()> {
        let total: usize = segs.iter().map(|s| s.len()).sum();
        if total > self.max_enqueue() {
            return Err(Error::FifoFull);
        }
        for seg in segs {
            self.enqueue(seg);
        }
        Ok(())
    }

    /// Copies up to `dst.len()` bytes out, consuming them.
    pub fn dequeue(&mut self, dst: &mut [u8]) -> usize {
        let n = self.peek(0, dst);
        self.drain(n);
        n
    }

    /// Copies bytes starting `offset` into the readable region, without
    /// consuming anything.
    pub fn peek(&self, offset: usize, dst: &mut [u8]) -> usize {
        if offset >= self.len {
            return 0;
        }
        let n = dst.len().min(self.len - offset);
        let start = (self.head + offset) % self.data.len();
        let first = n.min(self.data.len() - start);
        dst[..first].copy_from_slice(&self.data[start..start + first]);
        dst[first..n].copy_from_slice(&self.data[..n - first]);
        n
    }

    /// Discards up to `n` readable bytes, returns the count discarded.
    pub fn drain(&mut self, n: usize) -> usize {
        let n = n.min(self.len);
        self.head = (self.head + n) % self.data.len();
        self.len -= n;
        if self.len == 0 {
            self.head = 0;
        }
        n
    }

    /// Zero-copy views of up to `max` readable bytes. The second slice is
    /// empty unless the region wraps.
    pub fn read_segs(&self, max: usize) -> (&[u8], &[u8]) {
        let n = max.min(self.len);
        let first = n.min(self.data.len() - self.head);
        (
            &self.data[self.head..self.head + first],
            &self.data[..n - first],
        )
    }

    /// Arms a dequeue notification: the session layer re-invokes the
    /// owner once the consumer drains this FIFO.
    pub fn request_deq_ntf(&mut self) {
        self.deq_ntf = true;
    }

    /// Consumes the armed notification flag.
    pub fn take_deq_ntf(&mut self) -> bool {
        std::mem::take(&mut self.deq_ntf)
    }

    pub fn wants_deq_ntf(&self) -> bool {
        self.deq_ntf
    }
}
