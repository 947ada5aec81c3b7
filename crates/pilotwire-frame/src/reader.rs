use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::codec::{decode_frame, FrameConfig};
use crate::error::{FrameError, Result};

// Receive buffer grows in steps of this many bytes.
const FILL_STEP: usize = 8 * 1024;

/// Turns a raw `Read` stream into a sequence of whole payloads.
///
/// The reader refills an internal buffer from the stream until a complete
/// frame has accumulated, so callers never observe a partial payload. On a
/// live connection the stream is the driver's stdout and the sole caller is
/// the dispatch thread.
pub struct FrameReader<T> {
    stream: T,
    pending: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    pub fn new(stream: T) -> Self {
        Self::with_config(stream, FrameConfig::default())
    }

    pub fn with_config(stream: T, config: FrameConfig) -> Self {
        Self {
            stream,
            pending: BytesMut::with_capacity(FILL_STEP),
            config,
        }
    }

    /// Block until the next whole payload is available and return it.
    ///
    /// End of stream surfaces as [`FrameError::StreamClosed`], whether it
    /// falls on a frame boundary or in the middle of one.
    pub fn read_frame(&mut self) -> Result<Bytes> {
        loop {
            if let Some(payload) = decode_frame(&mut self.pending, self.config.max_payload_size)? {
                trace!(bytes = payload.len(), "frame in");
                return Ok(payload);
            }
            self.fill()?;
        }
    }

    // Appends one read(2) worth of bytes to `pending`, landing them directly
    // in the buffer tail. Interrupted reads are retried; any other error
    // leaves the buffer exactly as it was.
    fn fill(&mut self) -> Result<()> {
        let filled = self.pending.len();
        self.pending.resize(filled + FILL_STEP, 0);

        let outcome = loop {
            match self.stream.read(&mut self.pending[filled..]) {
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                other => break other,
            }
        };

        match outcome {
            Ok(0) => {
                self.pending.truncate(filled);
                Err(FrameError::StreamClosed)
            }
            Ok(n) => {
                self.pending.truncate(filled + n);
                Ok(())
            }
            Err(err) => {
                self.pending.truncate(filled);
                Err(FrameError::Io(err))
            }
        }
    }

    /// Borrow the wrapped stream.
    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    /// Unwrap the reader, discarding any buffered bytes.
    pub fn into_inner(self) -> T {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::{self, Cursor};

    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::encode_frame;

    fn wire(payloads: &[&[u8]]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for payload in payloads {
            encode_frame(payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    /// Replays a fixed script of read outcomes, one step per `read` call.
    struct ScriptedStream {
        script: VecDeque<Step>,
    }

    enum Step {
        Data(Vec<u8>),
        Fail(ErrorKind),
    }

    impl ScriptedStream {
        fn new(script: Vec<Step>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.script.pop_front() {
                Some(Step::Data(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        self.script.push_front(Step::Data(bytes[n..].to_vec()));
                    }
                    Ok(n)
                }
                Some(Step::Fail(kind)) => Err(io::Error::from(kind)),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn delivers_whole_payloads() {
        let bytes = wire(&[b"{\"id\":1,\"method\":\"ping\"}"]);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.as_ref(), b"{\"id\":1,\"method\":\"ping\"}");
    }

    #[test]
    fn preserves_frame_order() {
        let bytes = wire(&[b"{\"id\":1}", b"{\"id\":2}", b"{\"id\":3}"]);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        for id in 1..=3 {
            let frame = reader.read_frame().unwrap();
            assert_eq!(frame.as_ref(), format!("{{\"id\":{id}}}").as_bytes());
        }
    }

    #[test]
    fn reassembles_across_short_reads() {
        let bytes = wire(&[b"trickled payload"]);
        let script: Vec<Step> = bytes.chunks(3).map(|c| Step::Data(c.to_vec())).collect();
        let mut reader = FrameReader::new(ScriptedStream::new(script));

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.as_ref(), b"trickled payload");
    }

    #[test]
    fn payload_spanning_many_fills() {
        let payload = vec![0x5A; 300 * 1024];
        let bytes = wire(&[&payload]);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.len(), payload.len());
        assert_eq!(frame.as_ref(), payload.as_slice());
    }

    #[test]
    fn eof_between_frames_is_stream_closed() {
        let mut reader = FrameReader::new(Cursor::new(Vec::new()));
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::StreamClosed
        ));
    }

    #[test]
    fn eof_inside_a_frame_is_stream_closed() {
        let mut bytes = BytesMut::new();
        bytes.put_u32_le(32);
        bytes.put_slice(b"half");

        let mut reader = FrameReader::new(Cursor::new(bytes.to_vec()));
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::StreamClosed
        ));
    }

    #[test]
    fn announced_length_over_limit_is_rejected() {
        let mut bytes = BytesMut::new();
        bytes.put_u32_le(4096);

        let config = FrameConfig {
            max_payload_size: 64,
        };
        let mut reader = FrameReader::with_config(Cursor::new(bytes.to_vec()), config);
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::PayloadTooLarge { size: 4096, max: 64 }
        ));
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let bytes = wire(&[b"survives EINTR"]);
        let mut reader = FrameReader::new(ScriptedStream::new(vec![
            Step::Fail(ErrorKind::Interrupted),
            Step::Data(bytes),
        ]));

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.as_ref(), b"survives EINTR");
    }

    #[test]
    fn other_io_errors_surface() {
        let mut reader =
            FrameReader::new(ScriptedStream::new(vec![Step::Fail(ErrorKind::WouldBlock)]));

        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn resumes_after_transient_error() {
        let bytes = wire(&[b"second try"]);
        let (head, tail) = bytes.split_at(6);
        let mut reader = FrameReader::new(ScriptedStream::new(vec![
            Step::Data(head.to_vec()),
            Step::Fail(ErrorKind::WouldBlock),
            Step::Data(tail.to_vec()),
        ]));

        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::Io(_)
        ));

        // The bytes buffered before the error are still there.
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.as_ref(), b"second try");
    }

    #[test]
    fn into_inner_returns_the_stream() {
        let bytes = wire(&[b"x"]);
        let len = bytes.len() as u64;
        let mut reader = FrameReader::new(Cursor::new(bytes));

        reader.read_frame().unwrap();
        assert_eq!(reader.get_ref().position(), len);
        assert_eq!(reader.into_inner().position(), len);
    }

    #[test]
    #[cfg(unix)]
    fn round_trip_over_socketpair() {
        let (tx, rx) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(tx);
        let mut reader = FrameReader::new(rx);

        writer.send(b"{\"guid\":\"page@1\"}").unwrap();
        assert_eq!(reader.read_frame().unwrap().as_ref(), b"{\"guid\":\"page@1\"}");
    }

    #[test]
    #[cfg(unix)]
    fn keeps_up_with_a_writer_thread() {
        let (tx, rx) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(tx);
        let mut reader = FrameReader::new(rx);

        let producer = std::thread::spawn(move || {
            for seq in 0..64u32 {
                writer.send(format!("call-{seq}").as_bytes()).unwrap();
            }
        });

        for seq in 0..64u32 {
            let frame = reader.read_frame().unwrap();
            assert_eq!(frame.as_ref(), format!("call-{seq}").as_bytes());
        }

        producer.join().unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn frames_through_a_live_driver() {
        use pilotwire_transport::{DriverConfig, DriverProcess};

        let config = DriverConfig::new("/bin/cat").with_forward_stderr(false);
        let mut driver = DriverProcess::spawn(config).unwrap();
        let (stdin, stdout) = driver.take_pipes().unwrap();

        let mut writer = crate::writer::FrameWriter::new(stdin);
        let mut reader = FrameReader::new(stdout);

        for guid in ["browser@1", "context@2", "page@3"] {
            writer
                .send(format!("{{\"guid\":\"{guid}\"}}").as_bytes())
                .unwrap();
        }
        for guid in ["browser@1", "context@2", "page@3"] {
            let frame = reader.read_frame().unwrap();
            assert_eq!(frame.as_ref(), format!("{{\"guid\":\"{guid}\"}}").as_bytes());
        }

        drop(writer);
        driver.shutdown(std::time::Duration::from_secs(5)).unwrap();
    }
}
