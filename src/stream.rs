//! Bounded-memory block copies
//!
//! Path-based payload sources can be hundreds of megabytes of video, so both
//! the packer and the reader move blocks through one fixed-size buffer.

use crate::{PackError, PackResult};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

/// Default copy buffer size (64 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Copy exactly `expected` bytes from `reader` to `writer`
///
/// `on_chunk` receives the running byte count after every chunk. Fails with
/// [`PackError::ShortRead`] if the reader ends early, and with
/// [`PackError::Config`] if it still has data once `expected` bytes were
/// copied.
pub fn copy_exact<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    expected: u64,
    buffer_size: usize,
    what: &str,
    mut on_chunk: F,
) -> PackResult<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    F: FnMut(u64),
{
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut copied: u64 = 0;

    while copied < expected {
        let want = (expected - copied).min(buffer.len() as u64) as usize;
        let n = match reader.read(&mut buffer[..want]) {
            Ok(0) => return Err(PackError::short_read(what, expected, copied)),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        writer.write_all(&buffer[..n])?;
        copied += n as u64;
        on_chunk(copied);
    }

    // The source grew after it was measured; its recorded size would be wrong
    let mut probe = [0u8; 1];
    loop {
        match reader.read(&mut probe) {
            Ok(0) => break,
            Ok(_) => {
                return Err(PackError::Config(format!(
                    "{} is longer than its measured size of {} bytes",
                    what, expected
                )))
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(copied)
}

/// Seek to `offset` and read exactly `size` bytes
pub fn read_exact_at<R>(reader: &mut R, offset: u64, size: u64, what: &str) -> PackResult<Vec<u8>>
where
    R: Read + Seek + ?Sized,
{
    reader.seek(SeekFrom::Start(offset))?;

    let len = usize::try_from(size)
        .map_err(|_| PackError::Config(format!("{} is too large to load: {} bytes", what, size)))?;
    let mut buffer = Vec::with_capacity(len);
    let actual = reader.take(size).read_to_end(&mut buffer)? as u64;
    if actual != size {
        return Err(PackError::short_read(what, size, actual));
    }
    Ok(buffer)
}
