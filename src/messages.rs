//! reassembly of balloon messages sent in 20-byte fragments
//!
//! A message starts with BEGIN_MESSAGE (window, id, timeout, length) and is
//! followed by MESSAGE_DATA events from the same window until `length` bytes
//! arrived. Data events carry no message id, so they are routed to the
//! oldest pending message of their window. Two messages in flight for one
//! window are ambiguous on the wire; first-registered-wins is the rule here.

use crate::error::Dropped;
use tracing::debug;
use x11rb::protocol::xproto::Window;

/// A message still waiting for fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub window: Window,
    pub id: u32,
    /// advisory, forwarded to the host untouched
    pub timeout: u32,
    len: usize,
    remaining: usize,
    buf: Vec<u8>,
}

impl PendingMessage {
    fn new(window: Window, id: u32, timeout: u32, len: usize) -> Self {
        Self {
            window,
            id,
            timeout,
            len,
            remaining: len,
            buf: Vec::with_capacity(len),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Append as much of `fragment` as the message still expects.
    fn append(&mut self, fragment: &[u8]) {
        let n = fragment.len().min(self.remaining);
        debug_assert_eq!(self.buf.len(), self.len - self.remaining);
        self.buf.extend_from_slice(&fragment[..n]);
        self.remaining -= n;
    }

    fn into_complete(self) -> CompletedMessage {
        CompletedMessage {
            window: self.window,
            id: self.id,
            timeout: self.timeout,
            body: self.buf,
        }
    }
}

/// A fully received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedMessage {
    pub window: Window,
    pub id: u32,
    pub timeout: u32,
    pub body: Vec<u8>,
}

#[derive(Debug)]
pub struct Reassembler {
    pending: Vec<PendingMessage>,
    max_len: usize,
}

impl Reassembler {
    pub fn new(max_len: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_len,
        }
    }

    /// Start a message. A pending message with the same (window, id) is
    /// dropped first. Zero-length messages complete immediately.
    pub fn begin(
        &mut self,
        window: Window,
        id: u32,
        timeout: u32,
        len: u32,
    ) -> Result<Option<CompletedMessage>, Dropped> {
        if self.remove(window, id).is_some() {
            debug!(window, id, "message restarted before completion");
        }

        let len = len as usize;
        if len > self.max_len {
            return Err(Dropped::Oversized);
        }
        if len == 0 {
            return Ok(Some(CompletedMessage {
                window,
                id,
                timeout,
                body: Vec::new(),
            }));
        }

        self.pending.push(PendingMessage::new(window, id, timeout, len));
        Ok(None)
    }

    /// Feed one data fragment from `window`.
    pub fn data(
        &mut self,
        window: Window,
        fragment: &[u8],
    ) -> Result<Option<CompletedMessage>, Dropped> {
        let pos = self
            .pending
            .iter()
            .position(|msg| msg.window == window)
            .ok_or(Dropped::MalformedFragment)?;

        let msg = &mut self.pending[pos];
        msg.append(fragment);
        if msg.remaining > 0 {
            return Ok(None);
        }

        Ok(Some(self.pending.remove(pos).into_complete()))
    }

    /// Drop the pending message (window, id) without completing it.
    pub fn cancel(&mut self, window: Window, id: u32) -> Result<PendingMessage, Dropped> {
        self.remove(window, id).ok_or(Dropped::UnknownCancel)
    }

    /// Drop every pending message of `window`; returns how many there were.
    pub fn discard_window(&mut self, window: Window) -> usize {
        let before = self.pending.len();
        self.pending.retain(|msg| msg.window != window);
        before - self.pending.len()
    }

    pub fn get(&self, window: Window, id: u32) -> Option<&PendingMessage> {
        self.pending
            .iter()
            .find(|msg| msg.window == window && msg.id == id)
    }

    pub fn remaining(&self, window: Window, id: u32) -> Option<usize> {
        self.get(window, id).map(PendingMessage::remaining)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    fn remove(&mut self, window: Window, id: u32) -> Option<PendingMessage> {
        let pos = self
            .pending
            .iter()
            .position(|msg| msg.window == window && msg.id == id)?;
        Some(self.pending.remove(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LIMIT: usize = 64 * 1024;

    #[test]
    fn test_fragments_20_4_1() {
        let mut r = Reassembler::new(LIMIT);
        let text = b"abcdefghijklmnopqrstuvwxy";
        assert_eq!(r.begin(42, 7, 0, 25), Ok(None));
        assert_eq!(r.remaining(42, 7), Some(25));

        assert_eq!(r.data(42, &text[..20]), Ok(None));
        assert_eq!(r.remaining(42, 7), Some(5));
        assert_eq!(r.data(42, &text[20..24]), Ok(None));
        assert_eq!(r.remaining(42, 7), Some(1));

        let done = r.data(42, &text[24..]).unwrap().unwrap();
        assert_eq!(
            done,
            CompletedMessage {
                window: 42,
                id: 7,
                timeout: 0,
                body: text.to_vec(),
            }
        );
        assert!(r.is_empty());
    }

    #[test]
    fn test_padded_fragments_are_truncated_to_remaining() {
        let mut r = Reassembler::new(LIMIT);
        r.begin(42, 1, 3000, 25).unwrap();

        let mut first = [0u8; 20];
        first.copy_from_slice(b"Battery is running l");
        let mut second = [0u8; 20];
        second[..5].copy_from_slice(b"ow!!!");

        assert_eq!(r.data(42, &first), Ok(None));
        let done = r.data(42, &second).unwrap().unwrap();
        assert_eq!(done.body.len(), 25);
        assert_eq!(done.body, b"Battery is running low!!!".to_vec());
        assert_eq!(done.timeout, 3000);
    }

    #[test]
    fn test_zero_length_completes_immediately() {
        let mut r = Reassembler::new(LIMIT);
        let done = r.begin(42, 3, 500, 0).unwrap().unwrap();
        assert_eq!(done.body, Vec::<u8>::new());
        assert_eq!(done.timeout, 500);
        assert!(r.is_empty());
    }

    #[test]
    fn test_cancel_then_fragments_are_dropped() {
        let mut r = Reassembler::new(LIMIT);
        r.begin(42, 7, 0, 10).unwrap();
        assert!(r.cancel(42, 7).is_ok());
        assert_eq!(r.data(42, b"0123456789"), Err(Dropped::MalformedFragment));
        assert_eq!(r.cancel(42, 7).unwrap_err(), Dropped::UnknownCancel);
    }

    #[test]
    fn test_restart_with_same_key_replaces() {
        let mut r = Reassembler::new(LIMIT);
        r.begin(42, 7, 0, 10).unwrap();
        assert_eq!(r.data(42, b"01234"), Ok(None));

        r.begin(42, 7, 0, 3).unwrap();
        assert_eq!(r.len(), 1);
        assert_eq!(r.remaining(42, 7), Some(3));

        let done = r.data(42, b"xyz").unwrap().unwrap();
        assert_eq!(done.body, b"xyz".to_vec());
    }

    #[test]
    fn test_data_routes_to_oldest_message_of_window() {
        let mut r = Reassembler::new(LIMIT);
        r.begin(42, 1, 0, 2).unwrap();
        r.begin(42, 2, 0, 2).unwrap();
        r.begin(43, 1, 0, 2).unwrap();

        let done = r.data(42, b"ab").unwrap().unwrap();
        assert_eq!((done.window, done.id), (42, 1));
        assert_eq!(r.remaining(42, 2), Some(2));
        assert_eq!(r.remaining(43, 1), Some(2));
    }

    #[test]
    fn test_oversized_begin_is_dropped() {
        let mut r = Reassembler::new(16);
        assert_eq!(r.begin(42, 1, 0, 17), Err(Dropped::Oversized));
        assert!(r.is_empty());
        assert_eq!(r.begin(42, 1, 0, 16), Ok(None));
    }

    #[test]
    fn test_oversized_restart_still_drops_previous() {
        let mut r = Reassembler::new(16);
        r.begin(42, 1, 0, 4).unwrap();
        assert_eq!(r.begin(42, 1, 0, u32::MAX), Err(Dropped::Oversized));
        assert!(r.is_empty());
    }

    #[test]
    fn test_discard_window() {
        let mut r = Reassembler::new(LIMIT);
        r.begin(42, 1, 0, 5).unwrap();
        r.begin(42, 2, 0, 5).unwrap();
        r.begin(43, 1, 0, 5).unwrap();
        assert_eq!(r.discard_window(42), 2);
        assert_eq!(r.len(), 1);
        assert_eq!(r.remaining(42, 1), None);
        assert_eq!(r.remaining(43, 1), Some(5));
    }

    #[test]
    fn test_concatenation_for_many_splits() {
        let text: Vec<u8> = (0..97u8).collect();
        for chunk in [1usize, 3, 7, 20] {
            let mut r = Reassembler::new(LIMIT);
            r.begin(9, 1, 0, text.len() as u32).unwrap();
            let mut completed = Vec::new();
            for piece in text.chunks(chunk) {
                if let Some(done) = r.data(9, piece).unwrap() {
                    completed.push(done);
                }
            }
            assert_eq!(completed.len(), 1);
            assert_eq!(completed[0].body, text);
        }
    }
}
