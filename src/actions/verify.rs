//! Byte-for-byte comparison used by paranoid mode.
//!
//! Digest equality is treated as content equality by default. With paranoid
//! mode on, a master and duplicate are compared in full before the duplicate
//! is touched, which rules out digest collisions and files that changed
//! content without changing size or mtime.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

const COMPARE_BUFFER: usize = 64 * 1024;

/// Whether the files at `a` and `b` have identical contents.
///
/// # Errors
///
/// Returns the first I/O error hit while opening or reading either file.
pub fn contents_equal(a: &Path, b: &Path) -> io::Result<bool> {
    let fa = File::open(a)?;
    let fb = File::open(b)?;
    if fa.metadata()?.len() != fb.metadata()?.len() {
        return Ok(false);
    }
    readers_equal(
        BufReader::with_capacity(COMPARE_BUFFER, fa),
        BufReader::with_capacity(COMPARE_BUFFER, fb),
    )
}

fn readers_equal<A: Read, B: Read>(mut a: A, mut b: B) -> io::Result<bool> {
    let mut buf_a = vec![0u8; COMPARE_BUFFER];
    let mut buf_b = vec![0u8; COMPARE_BUFFER];

    loop {
        let n = read_full(&mut a, &mut buf_a)?;
        let m = read_full(&mut b, &mut buf_b)?;
        if n != m || buf_a[..n] != buf_b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buf` as far as the reader allows; short only at end of input.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
