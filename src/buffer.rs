use crate::fifo::Fifo;

/// Default bound on one TX burst out of the buffer.
pub const BUFFER_MAX_BURST: usize = 64 * 1024;

/// Outbound body of known length, drained into the transport TX FIFO in
/// bounded bursts while the connection sits in the app-IO state.
///
/// Two variants mirror the control-message carriers: `Fifo` streams body
/// bytes the application queued inline in its TX FIFO; `Ptr` streams an
/// application-owned contiguous region referenced by a machine-word
/// address. A pointer region must stay alive until the buffer is drained;
/// that is the application's side of the contract.
#[derive(Debug)]
pub enum HttpBuffer {
    Fifo { to_send: u64 },
    Ptr { base: usize, offset: usize, to_send: u64 },
}

impl HttpBuffer {
    /// Body bytes follow in the application TX FIFO.
    pub fn inline(body_len: u64) -> Self {
        HttpBuffer::Fifo { to_send: body_len }
    }

    /// Body lives at `addr + body_offset` in application memory.
    pub fn pointer(addr: usize, body_offset: usize, body_len: u64) -> Self {
        HttpBuffer::Ptr {
            base: addr + body_offset,
            offset: 0,
            to_send: body_len,
        }
    }

    pub fn remaining(&self) -> u64 {
        match self {
            HttpBuffer::Fifo { to_send } | HttpBuffer::Ptr { to_send, .. } => *to_send,
        }
    }

    pub fn is_drained(&self) -> bool {
        self.remaining() == 0
    }

    /// Views of the body bytes available right now, bounded by `max`.
    /// The second segment is non-empty only when the FIFO region wraps.
    pub fn get_segs<'a>(&'a self, app_tx: &'a Fifo, max: usize) -> (&'a [u8], &'a [u8]) {
        match self {
            HttpBuffer::Fifo { to_send } => {
                let want = cap(max, *to_send);
                app_tx.read_segs(want)
            }
            HttpBuffer::Ptr {
                base,
                offset,
                to_send,
            } => {
                let want = cap(max, *to_send);
                // Safety: the application guarantees the pointed-to region
                // outlives the drain of this buffer (PTR carrier contract).
                let seg =
                    unsafe { std::slice::from_raw_parts((*base + *offset) as *const u8, want) };
                (seg, &[])
            }
        }
    }

    /// Consumes `n` body bytes after they were copied to transport.
    pub fn drain(&mut self, app_tx: &mut Fifo, n: usize) {
        match self {
            HttpBuffer::Fifo { to_send } => {
                app_tx.drain(n);
                *to_send -= n as u64;
            }
            HttpBuffer::Ptr {
                offset, to_send, ..
            } => {
                *offset += n;
                *to_send -= n as u64;
            }
        }
    }
}

fn cap(max: usize, to_send: u64) -> usize {
    (max as u64).min(to_send) as usize
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn inline_streams_from_fifo() {
        let mut fifo = Fifo::with_capacity(32);
        fifo.enqueue(b"hello world");
        let mut buf = HttpBuffer::inline(11);

        let (a, b) = buf.get_segs(&fifo, 5);
        assert_eq!(a, b"hello");
        assert!(b.is_empty());
        buf.drain(&mut fifo, 5);
        assert_eq!(buf.remaining(), 6);

        let (a, _) = buf.get_segs(&fifo, BUFFER_MAX_BURST);
        assert_eq!(a, b" world");
        buf.drain(&mut fifo, 6);
        assert!(buf.is_drained());
        assert!(fifo.is_empty());
    }

    #[test]
    fn inline_bounded_by_fifo_content() {
        let mut fifo = Fifo::with_capacity(32);
        fifo.enqueue(b"ab");
        let buf = HttpBuffer::inline(10);
        let (a, b) = buf.get_segs(&fifo, 10);
        assert_eq!(a.len() + b.len(), 2);
    }

    #[test]
    fn pointer_streams_region() {
        let body = b"0123456789".to_vec();
        let mut fifo = Fifo::with_capacity(8);
        let mut buf = HttpBuffer::pointer(body.as_ptr() as usize, 2, 8);

        let (a, b) = buf.get_segs(&fifo, 3);
        assert_eq!(a, b"234");
        assert!(b.is_empty());
        buf.drain(&mut fifo, 3);

        let (a, _) = buf.get_segs(&fifo, 100);
        assert_eq!(a, b"56789");
        buf.drain(&mut fifo, 5);
        assert!(buf.is_drained());
        // the fifo is untouched by pointer draining
        assert!(fifo.is_empty());
    }
}
