//! Streaming content fingerprints.
//!
//! [`FingerprintEngine::fingerprint`] hashes a reader on its own.
//! [`FingerprintEngine::tap`] hashes bytes while another consumer (usually a
//! [`BlobStore::put_temp`](super::BlobStore::put_temp) call) reads them, so an
//! upload is only read once.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::oneshot;

use super::hash::Fingerprint;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Digest of a fully consumed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprinted {
    pub fingerprint: Fingerprint,
    /// Number of bytes hashed.
    pub size: u64,
}

pub struct FingerprintEngine;

impl FingerprintEngine {
    /// Consume `reader` to EOF and return its fingerprint.
    ///
    /// Memory use is bounded by a fixed read buffer. Read errors are returned
    /// as-is.
    pub async fn fingerprint<R>(mut reader: R) -> io::Result<Fingerprinted>
    where
        R: AsyncRead + Unpin,
    {
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }

        Ok(Fingerprinted {
            fingerprint: Fingerprint::from_bytes(hasher.finalize().into()),
            size,
        })
    }

    /// Wrap `reader` so every byte read through the wrapper is hashed.
    ///
    /// The returned tap yields the fingerprint once the wrapper has reported
    /// EOF.
    pub fn tap<R>(reader: R) -> (HashingReader<R>, FingerprintTap)
    where
        R: AsyncRead + Unpin,
    {
        let (tx, rx) = oneshot::channel();
        let reader = HashingReader {
            inner: reader,
            hasher: Sha256::new(),
            size: 0,
            done: Some(tx),
        };
        (reader, FingerprintTap { rx })
    }
}

/// `AsyncRead` adapter that hashes the bytes passing through it.
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
    size: u64,
    done: Option<oneshot::Sender<Fingerprinted>>,
}

impl<R: AsyncRead + Unpin> AsyncRead for HashingReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let had_room = buf.remaining() > 0;
        let before = buf.filled().len();

        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;

        let chunk = &buf.filled()[before..];
        if !chunk.is_empty() {
            this.hasher.update(chunk);
            this.size += chunk.len() as u64;
        } else if had_room && let Some(done) = this.done.take() {
            let hasher = std::mem::take(&mut this.hasher);
            // The tap may already be gone; the digest is then simply unused.
            let _ = done.send(Fingerprinted {
                fingerprint: Fingerprint::from_bytes(hasher.finalize().into()),
                size: this.size,
            });
        }

        Poll::Ready(Ok(()))
    }
}

/// Receiving side of [`FingerprintEngine::tap`].
pub struct FingerprintTap {
    rx: oneshot::Receiver<Fingerprinted>,
}

impl FingerprintTap {
    /// The fingerprint of the tapped stream, or `None` if the stream was not
    /// read to EOF.
    pub fn finish(mut self) -> Option<Fingerprinted> {
        self.rx.try_recv().ok()
    }
}
