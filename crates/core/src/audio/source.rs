//! Audio source handles accepted by the decoder.
//!
//! Every variant funnels into a seekable [`MediaSource`] plus an optional
//! extension hint; the decode loop never sees the difference.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use symphonia::core::io::MediaSource;

use crate::error::{Result, WaveformError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the compressed audio comes from.
pub enum AudioSource {
    /// Local file path.
    Path(PathBuf),
    /// Already opened file, optionally restricted to a byte window.
    ///
    /// `length` of `None` means "until the end of the file".
    File {
        file: File,
        offset: u64,
        length: Option<u64>,
    },
    /// Any seekable data source. `extension` helps format probing.
    Stream {
        source: Box<dyn MediaSource>,
        extension: Option<String>,
    },
    /// `file://` or `http(s)://` URI with request headers.
    Uri {
        uri: String,
        headers: HashMap<String, String>,
    },
}

impl AudioSource {
    pub fn path<P: AsRef<Path>>(path: P) -> Self {
        Self::Path(path.as_ref().to_path_buf())
    }

    pub fn file(file: File) -> Self {
        Self::File {
            file,
            offset: 0,
            length: None,
        }
    }

    pub fn file_segment(file: File, offset: u64, length: u64) -> Self {
        Self::File {
            file,
            offset,
            length: Some(length),
        }
    }

    pub fn uri(uri: impl Into<String>) -> Self {
        Self::Uri {
            uri: uri.into(),
            headers: HashMap::new(),
        }
    }

    pub fn uri_with_headers(uri: impl Into<String>, headers: HashMap<String, String>) -> Self {
        Self::Uri {
            uri: uri.into(),
            headers,
        }
    }

    /// Resolve the source into a readable stream.
    pub fn open(self) -> Result<OpenedSource> {
        match self {
            Self::Path(path) => {
                let file = File::open(&path)?;
                Ok(OpenedSource {
                    extension: extension_of(&path.to_string_lossy()),
                    stream: Box::new(file),
                })
            }
            Self::File {
                file,
                offset,
                length,
            } => {
                let segment = FileSegment::new(file, offset, length)?;
                Ok(OpenedSource {
                    stream: Box::new(segment),
                    extension: None,
                })
            }
            Self::Stream { source, extension } => Ok(OpenedSource {
                stream: source,
                extension,
            }),
            Self::Uri { uri, headers } => open_uri(&uri, &headers),
        }
    }
}

impl fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "Path({})", path.display()),
            Self::File { offset, length, .. } => {
                write!(f, "File(offset={offset}, length={length:?})")
            }
            Self::Stream { extension, .. } => write!(f, "Stream(extension={extension:?})"),
            Self::Uri { uri, headers } => write!(f, "Uri({uri}, {} headers)", headers.len()),
        }
    }
}

/// A source ready for probing.
pub struct OpenedSource {
    pub stream: Box<dyn MediaSource>,
    pub extension: Option<String>,
}

fn open_uri(uri: &str, headers: &HashMap<String, String>) -> Result<OpenedSource> {
    if let Some(path) = uri.strip_prefix("file://") {
        return AudioSource::path(path).open();
    }

    if uri.starts_with("http://") || uri.starts_with("https://") {
        let body = fetch(http_agent(), uri, headers)?;
        return Ok(OpenedSource {
            stream: Box::new(io::Cursor::new(body)),
            extension: extension_of(uri),
        });
    }

    Err(WaveformError::UnsupportedSource(uri.to_string()))
}

/// Shared HTTP agent; a stalled server fails the open instead of hanging it.
fn http_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build()
    })
}

fn fetch(agent: &ureq::Agent, uri: &str, headers: &HashMap<String, String>) -> Result<Vec<u8>> {
    log::debug!("Fetching {} ({} headers)", uri, headers.len());
    let mut request = agent.get(uri);
    for (name, value) in headers {
        request = request.set(name, value);
    }
    let response = request
        .call()
        .map_err(|e| WaveformError::Http(e.to_string()))?;

    let mut body = Vec::new();
    response.into_reader().read_to_end(&mut body)?;
    log::debug!("Fetched {} bytes from {}", body.len(), uri);
    Ok(body)
}

/// Extension of the last path segment, ignoring any query or fragment.
fn extension_of(location: &str) -> Option<String> {
    let location = location
        .split(['?', '#'])
        .next()
        .unwrap_or(location);
    let name = location.rsplit(['/', '\\']).next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// A byte window of a file exposed as its own seekable stream.
pub struct FileSegment {
    file: File,
    start: u64,
    len: u64,
    pos: u64,
}

impl FileSegment {
    pub fn new(file: File, offset: u64, length: Option<u64>) -> Result<Self> {
        let file_len = file.metadata()?.len();
        if offset > file_len {
            return Err(WaveformError::InvalidArgument(format!(
                "offset {offset} is past the end of a {file_len} byte file"
            )));
        }

        let available = file_len - offset;
        let len = match length {
            Some(length) if length > available => {
                return Err(WaveformError::InvalidArgument(format!(
                    "segment of {length} bytes at offset {offset} exceeds file length {file_len}"
                )));
            }
            Some(length) => length,
            None => available,
        };

        Ok(Self {
            file,
            start: offset,
            len,
            pos: 0,
        })
    }
}

impl Read for FileSegment {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let want = buf.len().min(remaining as usize);
        self.file.seek(SeekFrom::Start(self.start + self.pos))?;
        let read = self.file.read(&mut buf[..want])?;
        self.pos += read as u64;
        Ok(read)
    }
}

impl Seek for FileSegment {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };

        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of segment",
            )),
        }
    }
}

impl MediaSource for FileSegment {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.len)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Instant;

    use super::*;

    fn scratch_file(contents: &[u8]) -> File {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(contents).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        file
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("/music/song.MP3"), Some("mp3".to_string()));
        assert_eq!(
            extension_of("https://host/a/b.ogg?sig=1.2#t=3"),
            Some("ogg".to_string())
        );
        assert_eq!(extension_of("/music/README"), None);
        assert_eq!(extension_of("/music/.hidden"), None);
    }

    #[test]
    fn test_file_segment_window() {
        let file = scratch_file(b"0123456789");
        let mut segment = FileSegment::new(file, 2, Some(5)).unwrap();

        let mut out = String::new();
        segment.read_to_string(&mut out).unwrap();
        assert_eq!(out, "23456");

        segment.seek(SeekFrom::End(-2)).unwrap();
        let mut tail = String::new();
        segment.read_to_string(&mut tail).unwrap();
        assert_eq!(tail, "56");

        assert!(segment.seek(SeekFrom::Current(-10)).is_err());
        assert_eq!(segment.byte_len(), Some(5));
    }

    #[test]
    fn test_file_segment_defaults_to_rest_of_file() {
        let file = scratch_file(b"abcdef");
        let mut segment = FileSegment::new(file, 4, None).unwrap();
        let mut out = Vec::new();
        segment.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"ef");
    }

    #[test]
    fn test_file_segment_rejects_out_of_range() {
        assert!(FileSegment::new(scratch_file(b"abc"), 4, None).is_err());
        assert!(FileSegment::new(scratch_file(b"abc"), 1, Some(3)).is_err());
    }

    #[test]
    fn test_unsupported_uri_scheme() {
        let result = AudioSource::uri("ftp://example.com/a.mp3").open();
        assert!(matches!(result, Err(WaveformError::UnsupportedSource(_))));
    }

    #[test]
    fn test_stalled_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept, then never answer
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_secs(2));
            drop(stream);
        });

        let agent = ureq::AgentBuilder::new()
            .timeout_read(Duration::from_millis(200))
            .build();
        let started = Instant::now();
        let result = fetch(&agent, &format!("http://{addr}/track.mp3"), &HashMap::new());

        assert!(matches!(result, Err(WaveformError::Http(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
        server.join().unwrap();
    }
}
