//! Standard streams and the file open handler
//!
//! Streams are cheap to clone so redirections, subshells and pipeline stages
//! can each hold their own view of the same underlying sink.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, PipeReader, PipeWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Paths that open the discard device on every platform
const DISCARD_PATHS: &[&str] = &["/dev/null"];

/// An input stream for a script or command
#[derive(Clone, Debug, Default)]
pub enum Input {
    /// Immediately at end of input
    #[default]
    Null,
    /// The process's own standard input
    Inherit,
    Bytes(SharedBytes),
    File(Arc<File>),
    /// The read end of a pipe fed by another pipeline stage
    Pipe(Arc<PipeReader>),
}

impl Input {
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Input::Bytes(SharedBytes::new(data))
    }

    /// Read one line, without its newline.
    ///
    /// The flag is false when input ended before a newline. Files and pipes
    /// are read a byte at a time so nothing past the line is consumed.
    pub fn read_line(&self) -> io::Result<(Vec<u8>, bool)> {
        let mut line = Vec::new();
        let complete = match self {
            Input::Null => false,
            Input::Inherit => {
                io::stdin().lock().read_until(b'\n', &mut line)?;
                line.last() == Some(&b'\n')
            }
            Input::Bytes(bytes) => {
                bytes.read_until_newline(&mut line);
                line.last() == Some(&b'\n')
            }
            Input::File(file) => read_until_newline(&mut &**file, &mut line)?,
            Input::Pipe(pipe) => read_until_newline(&mut &**pipe, &mut line)?,
        };
        if complete {
            line.pop();
        }
        Ok((line, complete))
    }
}

fn read_until_newline(source: &mut impl Read, line: &mut Vec<u8>) -> io::Result<bool> {
    let mut byte = [0u8; 1];
    loop {
        match source.read(&mut byte) {
            Ok(0) => return Ok(false),
            Ok(_) => {
                line.push(byte[0]);
                if byte[0] == b'\n' {
                    return Ok(true);
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

/// In-memory input whose read position is shared by every clone
#[derive(Clone, Debug, Default)]
pub struct SharedBytes {
    data: Arc<Vec<u8>>,
    pos: Arc<AtomicUsize>,
}

impl SharedBytes {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        SharedBytes {
            data: Arc::new(data.into()),
            pos: Arc::default(),
        }
    }

    fn read_until_newline(&self, line: &mut Vec<u8>) {
        let start = self.pos.load(Ordering::SeqCst).min(self.data.len());
        let rest = &self.data[start..];
        let end = match rest.iter().position(|&b| b == b'\n') {
            Some(newline) => newline + 1,
            None => rest.len(),
        };
        line.extend_from_slice(&rest[..end]);
        self.pos.store(start + end, Ordering::SeqCst);
    }

    /// Everything not yet read; the stream is at end of input afterwards
    pub fn take_remaining(&self) -> Vec<u8> {
        let start = self.pos.swap(self.data.len(), Ordering::SeqCst);
        self.data.get(start..).map(<[u8]>::to_vec).unwrap_or_default()
    }
}

/// An output stream for a script or command
#[derive(Clone, Default)]
pub enum Output {
    /// Discards everything written to it
    #[default]
    Null,
    /// The process's standard output
    Stdout,
    /// The process's standard error
    Stderr,
    File(Arc<File>),
    Buffer(SharedBuffer),
    Writer(Arc<Mutex<Box<dyn Write + Send>>>),
    /// The write end of a pipe read by the next pipeline stage
    Pipe(Arc<PipeWriter>),
}

impl Output {
    pub fn writer(w: impl Write + Send + 'static) -> Self {
        Output::Writer(Arc::new(Mutex::new(Box::new(w))))
    }

    pub fn write_all(&self, data: &[u8]) -> io::Result<()> {
        match self {
            Output::Null => Ok(()),
            Output::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(data)?;
                out.flush()
            }
            Output::Stderr => {
                let mut err = io::stderr().lock();
                err.write_all(data)?;
                err.flush()
            }
            Output::File(file) => (&**file).write_all(data),
            Output::Pipe(pipe) => (&**pipe).write_all(data),
            Output::Buffer(buffer) => {
                buffer.append(data);
                Ok(())
            }
            Output::Writer(writer) => writer
                .lock()
                .map_err(|_| io::Error::other("output writer poisoned"))?
                .write_all(data),
        }
    }

    /// Whether a child process can write to this stream directly
    pub(crate) fn is_direct(&self) -> bool {
        !matches!(self, Output::Buffer(_) | Output::Writer(_))
    }

    /// Whether this stream is exactly the given buffer
    pub(crate) fn is_buffer(&self, buffer: &SharedBuffer) -> bool {
        matches!(self, Output::Buffer(own) if Arc::ptr_eq(&own.0, &buffer.0))
    }
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Output::Null => write!(f, "Null"),
            Output::Stdout => write!(f, "Stdout"),
            Output::Stderr => write!(f, "Stderr"),
            Output::File(file) => f.debug_tuple("File").field(file).finish(),
            Output::Buffer(_) => write!(f, "Buffer"),
            Output::Writer(_) => write!(f, "Writer"),
            Output::Pipe(_) => write!(f, "Pipe"),
        }
    }
}

/// An in-memory sink that can be shared between threads and read back
#[derive(Clone, Default, Debug)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, data: &[u8]) {
        if let Ok(mut buf) = self.0.lock() {
            buf.extend_from_slice(data);
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().map(|buf| buf.clone()).unwrap_or_default()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.append(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// How a redirection wants its target opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
    pub truncate: bool,
}

impl OpenFlags {
    pub fn read() -> Self {
        OpenFlags {
            read: true,
            ..Default::default()
        }
    }

    pub fn write() -> Self {
        OpenFlags {
            write: true,
            create: true,
            truncate: true,
            ..Default::default()
        }
    }

    pub fn append() -> Self {
        OpenFlags {
            write: true,
            append: true,
            create: true,
            ..Default::default()
        }
    }
}

/// Result of opening a redirection target
#[derive(Debug)]
pub enum Opened {
    /// The discard device: writes vanish, reads hit end of input
    Discard,
    File(File),
}

impl Opened {
    pub fn into_input(self) -> Input {
        match self {
            Opened::Discard => Input::Null,
            Opened::File(file) => Input::File(Arc::new(file)),
        }
    }

    pub fn into_output(self) -> Output {
        match self {
            Opened::Discard => Output::Null,
            Opened::File(file) => Output::File(Arc::new(file)),
        }
    }
}

impl Read for Opened {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Opened::Discard => Ok(0),
            Opened::File(file) => file.read(buf),
        }
    }
}

impl Write for Opened {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Opened::Discard => Ok(buf.len()),
            Opened::File(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Opened::Discard => Ok(()),
            Opened::File(file) => file.flush(),
        }
    }
}

/// Whether a path as written in a script names the discard device
pub fn is_discard_path(path: &str) -> bool {
    DISCARD_PATHS.contains(&path) || (cfg!(windows) && path.eq_ignore_ascii_case("NUL"))
}

/// Open a redirection target.
///
/// The discard device is served in-process regardless of whether the host
/// has one; everything else goes to the filesystem relative to `dir`.
pub fn open(dir: &Path, path: &str, flags: OpenFlags, mode: u32) -> io::Result<Opened> {
    if is_discard_path(path) {
        return Ok(Opened::Discard);
    }

    let mut options = OpenOptions::new();
    options
        .read(flags.read)
        .write(flags.write)
        .append(flags.append)
        .create(flags.create)
        .truncate(flags.truncate);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    options.open(dir.join(path)).map(Opened::File)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_discard_device_without_filesystem() {
        let missing = Path::new("/definitely/not/a/dir");
        let mut opened = open(missing, "/dev/null", OpenFlags::read(), 0o644).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(opened.read(&mut buf).unwrap(), 0);

        let mut opened = open(missing, "/dev/null", OpenFlags::write(), 0o644).unwrap();
        assert_eq!(opened.write(b"gone").unwrap(), 4);
    }

    #[test]
    fn test_open_regular_file_honors_flags() {
        let temp_dir = TempDir::new().unwrap();
        let mut opened = open(temp_dir.path(), "out.txt", OpenFlags::write(), 0o644).unwrap();
        opened.write_all(b"one\n").unwrap();
        drop(opened);

        let mut opened = open(temp_dir.path(), "out.txt", OpenFlags::append(), 0o644).unwrap();
        opened.write_all(b"two\n").unwrap();
        drop(opened);

        let contents = std::fs::read_to_string(temp_dir.path().join("out.txt")).unwrap();
        assert_eq!(contents, "one\ntwo\n");

        assert!(open(temp_dir.path(), "missing.txt", OpenFlags::read(), 0o644).is_err());
    }

    #[test]
    fn test_shared_buffer() {
        let buffer = SharedBuffer::new();
        let output = Output::Buffer(buffer.clone());
        output.write_all(b"hello ").unwrap();
        output.write_all(b"world").unwrap();
        assert_eq!(buffer.to_string_lossy(), "hello world");
        assert!(output.is_buffer(&buffer));
        assert!(!output.is_buffer(&SharedBuffer::new()));
    }

    #[test]
    fn test_read_line_shares_position_between_clones() {
        let input = Input::bytes("first\nsecond\nrest");
        let other = input.clone();
        assert_eq!(input.read_line().unwrap(), (b"first".to_vec(), true));
        assert_eq!(other.read_line().unwrap(), (b"second".to_vec(), true));
        assert_eq!(input.read_line().unwrap(), (b"rest".to_vec(), false));
        assert_eq!(other.read_line().unwrap(), (Vec::new(), false));
        assert_eq!(Input::Null.read_line().unwrap(), (Vec::new(), false));
    }

    #[test]
    fn test_read_line_leaves_file_after_the_line() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("lines.txt"), "one\ntwo\n").unwrap();
        let input = open(temp_dir.path(), "lines.txt", OpenFlags::read(), 0o644)
            .unwrap()
            .into_input();
        assert_eq!(input.read_line().unwrap(), (b"one".to_vec(), true));

        let Input::File(file) = &input else {
            panic!("expected a file input");
        };
        let mut rest = String::new();
        (&**file).read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "two\n");
    }

    #[test]
    fn test_take_remaining_consumes_bytes() {
        let bytes = SharedBytes::new("a\nbc");
        let input = Input::Bytes(bytes.clone());
        input.read_line().unwrap();
        assert_eq!(bytes.take_remaining(), b"bc".to_vec());
        assert!(bytes.take_remaining().is_empty());
    }
}
