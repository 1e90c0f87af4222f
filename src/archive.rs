//! Streaming tar+gzip writer.
//!
//! Archives are either written straight to a private file or piped through an
//! external encryptor so plaintext never lands on disk.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use flate2::{Compression, write::GzEncoder};
use tar::{Builder, EntryType, Header};
use tokio::runtime;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::collect::{FileEntry, FileKind};
use crate::crypto::Encryption;
use crate::metadata::private_options;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

/// Everything an archive header carries, independent of OS metadata types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    pub kind: EntryKind,
    pub mode: u32,
    pub size: u64,
    pub mtime: u64,
    pub link_target: Option<PathBuf>,
}

impl EntryHeader {
    /// Builds a header from non-following metadata.
    pub fn from_metadata(meta: &fs::Metadata, link_target: Option<PathBuf>) -> Self {
        let kind = if meta.file_type().is_symlink() {
            EntryKind::Symlink
        } else if meta.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        };
        let size = match kind {
            EntryKind::File => meta.len(),
            _ => 0,
        };
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs());
        Self {
            kind,
            mode: permission_bits(meta, kind),
            size,
            mtime,
            link_target,
        }
    }

    pub fn to_tar(&self) -> Header {
        let mut header = Header::new_gnu();
        header.set_entry_type(match self.kind {
            EntryKind::File => EntryType::Regular,
            EntryKind::Dir => EntryType::Directory,
            EntryKind::Symlink => EntryType::Symlink,
        });
        header.set_mode(self.mode);
        header.set_mtime(self.mtime);
        header.set_size(self.size);
        header
    }
}

#[cfg(unix)]
fn permission_bits(meta: &fs::Metadata, _kind: EntryKind) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(meta: &fs::Metadata, kind: EntryKind) -> u32 {
    match kind {
        EntryKind::Dir | EntryKind::Symlink => 0o755,
        EntryKind::File if meta.permissions().readonly() => 0o444,
        EntryKind::File => 0o644,
    }
}

enum AppendError {
    /// The source file could not be read; the entry is skipped.
    Source(io::Error),
    /// The output stream failed; the archive is unusable.
    Sink(io::Error),
}

/// Writes `files` as a gzip-compressed tar stream into `sink`.
///
/// Unreadable sources are logged and skipped. Any failure writing to `sink`
/// aborts. Returns the flushed sink.
pub fn write_archive<W: Write>(sink: W, files: &[FileEntry]) -> Result<W> {
    let encoder = GzEncoder::new(sink, Compression::default());
    let mut builder = Builder::new(encoder);

    for file in files {
        match append(&mut builder, file) {
            Ok(()) => debug!("archived: {}", file.rel_path),
            Err(AppendError::Source(e)) => {
                warn!("skipping {}: {e}", file.full_path.display())
            }
            Err(AppendError::Sink(e)) => return Err(e.into()),
        }
    }

    let mut sink = builder.into_inner()?.finish()?;
    sink.flush()?;
    Ok(sink)
}

fn append<W: Write>(builder: &mut Builder<W>, file: &FileEntry) -> std::result::Result<(), AppendError> {
    let name = file.rel_path.replace('\\', "/");
    let meta = fs::symlink_metadata(&file.full_path).map_err(AppendError::Source)?;

    match file.kind {
        FileKind::Symlink => {
            let target = fs::read_link(&file.full_path).map_err(AppendError::Source)?;
            let mut header = EntryHeader::from_metadata(&meta, Some(target.clone())).to_tar();
            builder
                .append_link(&mut header, &name, &target)
                .map_err(AppendError::Sink)
        }
        FileKind::File => {
            let source = File::open(&file.full_path).map_err(AppendError::Source)?;
            let mut entry = EntryHeader::from_metadata(&meta, None);
            // content length is fixed by the collector's stat
            entry.size = file.size;
            let mut header = entry.to_tar();
            let mut content = ExactReader::new(source, file.size, &file.full_path);
            builder
                .append_data(&mut header, &name, &mut content)
                .map_err(AppendError::Sink)
        }
    }
}

/// Yields exactly `remaining` bytes: truncates a grown file and zero-pads a
/// shrunk or failing one so the header size always holds.
struct ExactReader<'a, R> {
    inner: R,
    remaining: u64,
    path: &'a Path,
    exhausted: bool,
}

impl<'a, R: Read> ExactReader<'a, R> {
    fn new(inner: R, size: u64, path: &'a Path) -> Self {
        Self {
            inner,
            remaining: size,
            path,
            exhausted: false,
        }
    }
}

impl<R: Read> Read for ExactReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let buf = &mut buf[..want];

        let n = if self.exhausted {
            0
        } else {
            match self.inner.read(buf) {
                Ok(0) => {
                    warn!("{} shrank while archiving, padding", self.path.display());
                    self.exhausted = true;
                    0
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => return Err(e),
                Err(e) => {
                    warn!("error reading {}: {e}, padding", self.path.display());
                    self.exhausted = true;
                    0
                }
            }
        };

        let n = if n == 0 {
            buf.fill(0);
            want
        } else {
            n
        };
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Writes an unencrypted archive to `path` (mode 0600, truncated).
///
/// A partial file is removed on failure.
pub fn create_archive(path: &Path, files: &[FileEntry]) -> Result<()> {
    let result = private_options()
        .open(path)
        .map_err(Error::from)
        .and_then(|file| write_archive(BufWriter::new(file), files))
        .and_then(|writer| writer.into_inner().map_err(|e| e.into_error().into()))
        .and_then(|file| Ok(file.sync_all()?));
    if result.is_err() {
        let _ = fs::remove_file(path);
    }
    result
}

/// Streams the archive through `encryption` into `path`.
///
/// The writer and the encryptor run as two blocking tasks joined by an OS
/// pipe. A partial file is removed on failure.
pub fn create_encrypted_archive(
    path: &Path,
    files: &[FileEntry],
    encryption: &Encryption,
) -> Result<()> {
    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let result = rt.block_on(stream_encrypted(
        path.to_path_buf(),
        files.to_vec(),
        encryption.clone(),
    ));
    if result.is_err() {
        let _ = fs::remove_file(path);
    }
    result
}

async fn stream_encrypted(
    output: PathBuf,
    files: Vec<FileEntry>,
    encryption: Encryption,
) -> Result<()> {
    let (mut reader, writer) = io::pipe()?;
    let (tx, rx) = oneshot::channel::<Result<()>>();

    tokio::task::spawn_blocking(move || {
        let outcome = write_archive(BufWriter::new(writer), &files).map(drop);
        let _ = tx.send(outcome);
    });

    let (reader, encrypted) = tokio::task::spawn_blocking(move || {
        let result = encryption.encrypt_reader(&mut reader, &output);
        (reader, result)
    })
    .await?;
    // closing the read end unblocks a writer stuck on a full pipe
    drop(reader);

    let written = rx
        .await
        .unwrap_or_else(|_| Err(Error::encryption("archive writer stopped without reporting")));

    match (encrypted, written) {
        (Ok(()), Ok(())) => Ok(()),
        (Ok(()), Err(w)) => Err(w),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(w)) => Err(Error::encryption(format!("{e}; write error: {w}"))),
    }
}
