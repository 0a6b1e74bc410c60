//! Mock transport for testing

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use super::Transport;

/// Simulated device: turns bytes written by the host into device output.
pub type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// In-memory transport. Clones share the same buffers, so a test can keep
/// one handle while the client owns another.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Default)]
struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    responder: Option<Responder>,
    fail_reads: bool,
    fail_writes: bool,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock transport that answers writes through `responder`.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        let mock = Self::new();
        mock.set_responder(responder);
        mock
    }

    /// Install or replace the responder.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        self.inner.lock().responder = Some(Box::new(responder));
    }

    /// Queue bytes to be returned by later reads.
    pub fn inject(&self, data: &[u8]) {
        self.inner.lock().read_buffer.extend(data);
    }

    /// Get all written data
    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().write_buffer.clone()
    }

    /// Written data split into lines, without terminators.
    pub fn written_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.written())
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Clear written data
    pub fn clear_written(&self) {
        self.inner.lock().write_buffer.clear();
    }

    /// Number of bytes queued but not yet read.
    pub fn pending(&self) -> usize {
        self.inner.lock().read_buffer.len()
    }

    /// Make every following read fail.
    pub fn fail_reads(&self) {
        self.inner.lock().fail_reads = true;
    }

    /// Make every following write fail.
    pub fn fail_writes(&self) {
        self.inner.lock().fail_writes = true;
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock();
        if inner.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock read failure"));
        }

        let available = inner.read_buffer.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(inner.read_buffer.drain(..available)) {
            *slot = byte;
        }
        Ok(available)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }

        inner.write_buffer.extend_from_slice(data);
        let reply = inner.responder.as_mut().and_then(|respond| respond(data));
        if let Some(reply) = reply {
            inner.read_buffer.extend(reply);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_and_read_in_chunks() {
        let mut mock = MockTransport::new();
        mock.inject(b"STATUS:READY\n");

        let mut buf = [0u8; 6];
        assert_eq!(mock.read(&mut buf).unwrap(), 6);
        assert_eq!(&buf, b"STATUS");
        assert_eq!(mock.pending(), 7);

        let mut rest = [0u8; 32];
        assert_eq!(mock.read(&mut rest).unwrap(), 7);
        assert_eq!(mock.read(&mut rest).unwrap(), 0);
    }

    #[test]
    fn test_responder_answers_writes() {
        let handle = MockTransport::with_responder(|cmd| {
            (cmd == b"CMD:STATUS\n").then(|| b"STATUS:READY\n".to_vec())
        });
        let mut mock = handle.clone();

        mock.write(b"CMD:STATUS\n").unwrap();
        mock.write(b"CMD:STOP\n").unwrap();

        assert_eq!(handle.written_lines(), vec!["CMD:STATUS", "CMD:STOP"]);
        assert_eq!(handle.pending(), b"STATUS:READY\n".len());
    }

    #[test]
    fn test_failures() {
        let mut mock = MockTransport::new();
        mock.fail_writes();
        assert!(mock.write(b"CMD:STATUS\n").is_err());
        assert!(mock.written().is_empty());

        mock.fail_reads();
        assert!(mock.read(&mut [0u8; 4]).is_err());
    }
}
