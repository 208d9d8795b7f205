use std::fs::File;
use std::io::{self, Cursor, Read, Seek};
use std::ops::{Deref, DerefMut};
use std::path::Path;

use memmap2::{Mmap, MmapMut};
use tracing::debug;

/// A writable block of memory, either anonymously mapped or heap backed.
///
/// Both variants expose the same slice interface, so callers cannot tell
/// which one the platform granted.
pub enum MemoryBuffer {
    Mapped(MmapMut),
    Heap(Vec<u8>),
}

impl MemoryBuffer {
    /// Allocate `size` zeroed bytes.
    ///
    /// A zero-sized request never touches the OS, since some platforms
    /// reject empty mappings.
    pub fn allocate(size: usize) -> Self {
        if size == 0 {
            return Self::Heap(Vec::new());
        }
        match MmapMut::map_anon(size) {
            Ok(map) => Self::Mapped(map),
            Err(e) => {
                debug!(size, error = %e, "anonymous mapping refused, using heap buffer");
                Self::Heap(vec![0u8; size])
            }
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped(_))
    }

    /// A seekable reader/writer over the buffer.
    pub fn cursor(&mut self) -> Cursor<&mut [u8]> {
        Cursor::new(&mut **self)
    }
}

impl Deref for MemoryBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Mapped(map) => map,
            Self::Heap(buf) => buf,
        }
    }
}

impl DerefMut for MemoryBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        match self {
            Self::Mapped(map) => map,
            Self::Heap(buf) => buf,
        }
    }
}

impl std::fmt::Debug for MemoryBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBuffer")
            .field("len", &self.len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

/// Read-only contents of a file, either mapped or read into memory.
pub enum FileContents {
    Mapped(Mmap),
    Heap(Vec<u8>),
}

impl FileContents {
    pub fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped(_))
    }
}

impl Deref for FileContents {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Mapped(map) => map,
            Self::Heap(buf) => buf,
        }
    }
}

impl AsRef<[u8]> for FileContents {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl std::fmt::Debug for FileContents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileContents")
            .field("len", &self.len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

/// How the caller wants to consume a file.
#[derive(Debug)]
pub enum ReadOnlyView {
    /// Random access through slicing.
    Random(FileContents),
    /// Sequential reads from the start.
    Stream(Cursor<FileContents>),
}

impl ReadOnlyView {
    /// The underlying contents regardless of access style.
    pub fn contents(&self) -> &FileContents {
        match self {
            Self::Random(contents) => contents,
            Self::Stream(cursor) => cursor.get_ref(),
        }
    }

    pub fn into_contents(self) -> FileContents {
        match self {
            Self::Random(contents) => contents,
            Self::Stream(cursor) => cursor.into_inner(),
        }
    }

    /// A reader over the contents, keeping the position of a stream view.
    pub fn into_stream(self) -> Cursor<FileContents> {
        match self {
            Self::Random(contents) => Cursor::new(contents),
            Self::Stream(cursor) => cursor,
        }
    }
}

/// Read the whole of `file`.
///
/// With `allow_mmap` the file is mapped read-only; if mapping fails the
/// contents are read into memory instead, from the start of the file, in
/// which case the file position moves. `stream` picks the access style of
/// the returned view.
pub fn file_contents_ro(file: &File, stream: bool, allow_mmap: bool) -> io::Result<ReadOnlyView> {
    let contents = if allow_mmap {
        // SAFETY: pack and index files are immutable once published; the
        // mapping is read-only.
        match unsafe { Mmap::map(file) } {
            Ok(map) => FileContents::Mapped(map),
            Err(e) => {
                debug!(error = %e, "read-only mapping failed, reading into memory");
                read_all(file)?
            }
        }
    } else {
        read_all(file)?
    };

    Ok(if stream {
        ReadOnlyView::Stream(Cursor::new(contents))
    } else {
        ReadOnlyView::Random(contents)
    })
}

/// Open `path` read-only and return its contents, see [`file_contents_ro`].
pub fn file_contents_ro_path(
    path: &Path,
    stream: bool,
    allow_mmap: bool,
) -> io::Result<ReadOnlyView> {
    let file = File::open(path)?;
    file_contents_ro(&file, stream, allow_mmap)
}

fn read_all(mut file: &File) -> io::Result<FileContents> {
    file.rewind()?;
    let len = file.metadata()?.len() as usize;
    let mut buf = Vec::with_capacity(len);
    file.read_to_end(&mut buf)?;
    Ok(FileContents::Heap(buf))
}

#[cfg(test)]
mod tests {
    use std::io::{SeekFrom, Write};

    use super::*;

    #[test]
    fn allocate_zero_is_empty_heap() {
        let buf = MemoryBuffer::allocate(0);
        assert!(!buf.is_mapped());
        assert!(buf.is_empty());
    }

    #[test]
    fn allocate_has_exact_len_and_is_zeroed() {
        for size in [1, 17, 4096, 100_000] {
            let buf = MemoryBuffer::allocate(size);
            assert_eq!(buf.len(), size);
            assert!(buf.iter().all(|b| *b == 0));
        }
    }

    #[test]
    fn buffer_is_writable_through_cursor() {
        let mut buf = MemoryBuffer::allocate(8);
        {
            let mut cursor = buf.cursor();
            cursor.seek(SeekFrom::Start(2)).unwrap();
            cursor.write_all(b"abc").unwrap();
        }
        assert_eq!(&buf[..], b"\0\0abc\0\0\0");
        buf[7] = b'z';
        assert_eq!(buf[7], b'z');
    }

    #[test]
    fn heap_and_mapped_buffers_look_alike() {
        let mut heap = MemoryBuffer::Heap(vec![0u8; 4]);
        let mut other = MemoryBuffer::allocate(4);
        heap[..].copy_from_slice(b"wxyz");
        other[..].copy_from_slice(b"wxyz");
        assert_eq!(&heap[..], &other[..]);
    }

    #[test]
    fn file_view_random_access() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"0123456789").unwrap();

        for allow_mmap in [true, false] {
            let view = file_contents_ro(&file, false, allow_mmap).unwrap();
            assert!(matches!(view, ReadOnlyView::Random(_)));
            assert_eq!(view.contents().is_mapped(), allow_mmap);
            assert_eq!(&view.contents()[3..6], b"345");
        }
    }

    #[test]
    fn file_view_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, b"streamed bytes").unwrap();

        let view = file_contents_ro_path(&path, true, false).unwrap();
        assert!(matches!(view, ReadOnlyView::Stream(_)));
        let mut stream = view.into_stream();
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "streamed bytes");
        assert_eq!(stream.into_inner().len(), 14);
    }

    #[test]
    fn empty_file_view() {
        let file = tempfile::tempfile().unwrap();
        let view = file_contents_ro(&file, false, true).unwrap();
        assert!(view.contents().is_empty());
    }
}
