use portus::buffer::ByteBuffer;
use portus::http::{Content, FileSource, MappedFile, Outbound, Sink, WriteStatus};

use std::collections::VecDeque;
use std::io::{self, IoSlice};
use std::os::fd::RawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

enum Step {
    Accept(usize),
    Block,
}

/// Sink that accepts exactly the scripted amounts and records what it got.
struct ScriptedSink {
    steps: VecDeque<Step>,
    file_bytes: Vec<u8>,
    received: Vec<u8>,
    calls: usize,
}

impl ScriptedSink {
    fn new(steps: Vec<Step>, file_bytes: &[u8]) -> Self {
        Self {
            steps: steps.into(),
            file_bytes: file_bytes.to_vec(),
            received: Vec::new(),
            calls: 0,
        }
    }

    fn next(&mut self) -> io::Result<usize> {
        self.calls += 1;
        match self.steps.pop_front() {
            Some(Step::Accept(n)) => Ok(n),
            Some(Step::Block) => Err(io::ErrorKind::WouldBlock.into()),
            None => panic!("write attempted after the script ended"),
        }
    }
}

impl Sink for ScriptedSink {
    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        let n = self.next()?;
        let offered: Vec<u8> = bufs.iter().flat_map(|buf| buf.iter().copied()).collect();
        assert!(n <= offered.len(), "script accepts more than offered");

        self.received.extend_from_slice(&offered[..n]);
        Ok(n)
    }

    fn send_file(&mut self, _file: RawFd, offset: u64, count: usize) -> io::Result<usize> {
        let n = self.next()?;
        assert!(n <= count, "script accepts more than offered");

        let start = offset as usize;
        let chunk = self.file_bytes[start..start + n].to_vec();
        self.received.extend_from_slice(&chunk);
        Ok(n)
    }
}

fn temp_file(len: usize) -> (PathBuf, Vec<u8>) {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let path = std::env::temp_dir().join(format!(
        "portus-transfer-{}-{}-{}.bin",
        std::process::id(),
        nanos,
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let bytes: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
    std::fs::write(&path, &bytes).unwrap();

    (path, bytes)
}

fn header(content_len: usize) -> ByteBuffer {
    let mut buffer = ByteBuffer::new();
    buffer.append_str(&format!(
        "HTTP/1.1 200 OK\r\nConnection: keep-alive\r\nContent-Type: text/html\r\nContent-Length: {content_len}\r\n\r\n"
    ));
    buffer
}

#[test]
fn mapped_transfer_resumes_across_short_writes() {
    const C: usize = 300;
    let (path, bytes) = temp_file(C);

    let mut head = header(C);
    let h = head.readable_bytes();
    let expected: Vec<u8> = [head.peek(), bytes.as_slice()].concat();

    let mut outbound = Outbound::new();
    outbound.set_content(Content::Mapped(MappedFile::open(&path).unwrap()));
    assert_eq!(outbound.remaining(&head), (h + C) as u64);

    let mut sink = ScriptedSink::new(
        vec![
            Step::Accept(h / 2),
            Step::Block,
            Step::Accept(h - h / 2),
            Step::Accept(C / 3),
            Step::Block,
            Step::Accept(C / 3),
            Step::Accept(C - 2 * (C / 3)),
        ],
        &bytes,
    );

    assert_eq!(outbound.write_to(&mut head, &mut sink).unwrap(), WriteStatus::Pending);
    assert_eq!(outbound.remaining(&head), (h - h / 2 + C) as u64);
    assert!(outbound.has_content());

    assert_eq!(outbound.write_to(&mut head, &mut sink).unwrap(), WriteStatus::Pending);
    assert_eq!(head.readable_bytes(), 0);
    assert_eq!(outbound.remaining(&head), (C - C / 3) as u64);
    assert!(outbound.has_content());

    assert_eq!(outbound.write_to(&mut head, &mut sink).unwrap(), WriteStatus::Done);
    assert_eq!(outbound.remaining(&head), 0);
    assert!(!outbound.has_content());
    assert!(!outbound.release(), "content released twice");

    assert_eq!(sink.calls, 7);
    assert_eq!(sink.received, expected);

    // Nothing left: a further call completes without touching the sink.
    assert_eq!(outbound.write_to(&mut head, &mut sink).unwrap(), WriteStatus::Done);
    assert_eq!(sink.calls, 7);

    let _ = std::fs::remove_file(path);
}

#[test]
fn sendfile_transfer_flushes_header_then_tracks_offset() {
    const C: usize = 1000;
    let (path, bytes) = temp_file(C);

    let mut head = header(C);
    let h = head.readable_bytes();
    let expected: Vec<u8> = [head.peek(), bytes.as_slice()].concat();

    let mut outbound = Outbound::new();
    outbound.set_content(Content::File(FileSource::open(&path).unwrap()));

    let mut sink = ScriptedSink::new(
        vec![
            Step::Accept(h / 2),
            Step::Block,
            Step::Accept(h - h / 2),
            Step::Accept(C / 3),
            Step::Block,
            Step::Accept(C / 3),
            Step::Accept(C - 2 * (C / 3)),
        ],
        &bytes,
    );

    assert_eq!(outbound.write_to(&mut head, &mut sink).unwrap(), WriteStatus::Pending);
    assert_eq!(outbound.write_to(&mut head, &mut sink).unwrap(), WriteStatus::Pending);
    assert_eq!(outbound.content_remaining(), (C - C / 3) as u64);

    assert_eq!(outbound.write_to(&mut head, &mut sink).unwrap(), WriteStatus::Done);
    assert!(!outbound.has_content());
    assert_eq!(sink.received, expected);

    let _ = std::fs::remove_file(path);
}

#[test]
fn inline_response_without_content() {
    let mut head = header(0);
    let h = head.readable_bytes();
    let mut outbound = Outbound::new();

    let mut sink = ScriptedSink::new(vec![Step::Accept(h)], &[]);

    assert_eq!(outbound.write_to(&mut head, &mut sink).unwrap(), WriteStatus::Done);
    assert_eq!(sink.received.len(), h);
}

#[test]
fn zero_length_write_is_an_error() {
    let mut head = header(0);
    let mut outbound = Outbound::new();
    let mut sink = ScriptedSink::new(vec![Step::Accept(0)], &[]);

    let err = outbound.write_to(&mut head, &mut sink).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::WriteZero);
}

#[test]
fn teardown_releases_unsent_content() {
    let (path, bytes) = temp_file(64);

    let mut head = header(64);
    let mut outbound = Outbound::new();
    outbound.set_content(Content::Mapped(MappedFile::open(&path).unwrap()));

    let mut sink = ScriptedSink::new(vec![Step::Accept(10), Step::Block], &bytes);
    assert_eq!(outbound.write_to(&mut head, &mut sink).unwrap(), WriteStatus::Pending);

    assert!(outbound.release());
    assert!(!outbound.release());
    assert!(!outbound.has_content());

    let _ = std::fs::remove_file(path);
}
