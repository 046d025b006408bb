//! Reusable copy buffers.

use std::io;
use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of every pooled buffer.
pub const BUFFER_SIZE: usize = 32 * 1024;

/// A pool of fixed-size byte buffers.
///
/// Buffers are handed out as [`PooledBuffer`] guards and returned on drop.
/// At most `max_retained` idle buffers are kept; extras are freed.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<Box<[u8]>>>,
    max_retained: usize,
}

impl BufferPool {
    /// Create an empty pool keeping at most `max_retained` idle buffers.
    pub fn new(max_retained: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_retained,
        }
    }

    /// Take a buffer, allocating when none is idle.
    pub fn get(&self) -> PooledBuffer<'_> {
        let buf = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0; BUFFER_SIZE].into_boxed_slice());
        PooledBuffer { pool: self, buf }
    }

    /// Number of idle buffers.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    fn put(&self, buf: Box<[u8]>) {
        let mut free = self.free.lock();
        if free.len() < self.max_retained {
            free.push(buf);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(64)
    }
}

/// A buffer borrowed from a [`BufferPool`].
pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buf: Box<[u8]>,
}

impl Deref for PooledBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.put(std::mem::take(&mut self.buf));
    }
}

/// Copy `reader` to `writer` through a pooled buffer until EOF.
///
/// Returns the number of bytes copied.
pub async fn copy_buffered<R, W>(pool: &BufferPool, reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = pool.get();
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }
    writer.flush().await?;
    Ok(total)
}
