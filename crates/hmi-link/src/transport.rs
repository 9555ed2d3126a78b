//! Byte transport adapters
//!
//! Wraps the two halves of an async byte stream with the operations the
//! engine needs: write, wait for transmit completion, read with timeout, and
//! discard unread input. A read that times out yields an empty slice rather
//! than an error.

use std::io::ErrorKind;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::LinkError;

/// Read chunk size
const READ_CHUNK: usize = 256;

/// Write half of the transport
pub struct Transmitter<W> {
    io: W,
    timeout: Duration,
}

impl<W> Transmitter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(io: W, timeout: Duration) -> Self {
        Self { io, timeout }
    }

    /// Write all of `data`, returning the number of bytes written
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, LinkError> {
        let mut written = 0;
        self.write_counted(data, &mut written).await?;
        Ok(written)
    }

    /// Write all of `data` within the transmit timeout
    ///
    /// `written` is advanced as each chunk is accepted, so on failure it
    /// holds exactly how many bytes reached the transport.
    pub async fn write_counted(
        &mut self,
        data: &[u8],
        written: &mut usize,
    ) -> Result<(), LinkError> {
        trace!("TX {:02X?}", data);
        let deadline = Instant::now() + self.timeout;
        let mut sent = 0;
        while sent < data.len() {
            match tokio::time::timeout_at(deadline, self.io.write(&data[sent..])).await {
                Ok(Ok(0)) => return Err(std::io::Error::from(ErrorKind::WriteZero).into()),
                Ok(Ok(n)) => {
                    sent += n;
                    *written += n;
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    debug!("Transmit timed out after {} of {} bytes", sent, data.len());
                    return Err(LinkError::Timeout);
                }
            }
        }
        Ok(())
    }

    /// Wait until written bytes have left the transport
    pub async fn wait_transmit_complete(&mut self) -> Result<(), LinkError> {
        match tokio::time::timeout(self.timeout, self.io.flush()).await {
            Ok(result) => result.map_err(LinkError::from),
            Err(_) => Err(LinkError::Timeout),
        }
    }
}

/// Read half of the transport
pub struct Receiver<R> {
    io: R,
    buffer: Vec<u8>,
}

impl<R> Receiver<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(io: R) -> Self {
        Self {
            io,
            buffer: vec![0u8; READ_CHUNK],
        }
    }

    /// Read whatever arrives within `timeout`
    ///
    /// Returns an empty slice on timeout and [`LinkError::Closed`] at end of
    /// stream.
    pub async fn read(&mut self, timeout: Duration) -> Result<&[u8], LinkError> {
        match tokio::time::timeout(timeout, self.io.read(&mut self.buffer)).await {
            Ok(Ok(n)) if n > 0 => {
                trace!("RX {:02X?}", &self.buffer[..n]);
                Ok(&self.buffer[..n])
            }
            Ok(Ok(_)) => Err(LinkError::Closed),
            Ok(Err(e)) => {
                // Some serial drivers report an idle line as an error
                if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut {
                    Ok(&self.buffer[..0])
                } else {
                    Err(e.into())
                }
            }
            Err(_) => Ok(&self.buffer[..0]),
        }
    }

    /// Discard everything that is immediately readable
    pub async fn flush_input(&mut self) -> usize {
        let mut discarded = 0;
        loop {
            match self.read(Duration::ZERO).await {
                Ok(data) if !data.is_empty() => discarded += data.len(),
                _ => break,
            }
        }
        if discarded > 0 {
            debug!("Flushed {} unread bytes", discarded);
        }
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_times_out_empty() {
        let (_peer, io) = tokio::io::duplex(64);
        let mut rx = Receiver::new(io);
        let data = rx.read(Duration::from_millis(10)).await.unwrap();
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn test_read_reports_eof() {
        let (peer, io) = tokio::io::duplex(64);
        drop(peer);
        let mut rx = Receiver::new(io);
        assert!(matches!(
            rx.read(Duration::from_millis(10)).await,
            Err(LinkError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_write_and_flush_input() {
        let (peer, io) = tokio::io::duplex(64);
        let (peer_rx, peer_tx) = tokio::io::split(peer);
        let (io_rx, io_tx) = tokio::io::split(io);

        let mut tx = Transmitter::new(peer_tx, Duration::from_millis(50));
        assert_eq!(tx.write(&[0x01, 0xFF, 0xFF, 0xFF]).await.unwrap(), 4);
        tx.wait_transmit_complete().await.unwrap();

        let mut rx = Receiver::new(io_rx);
        assert_eq!(rx.flush_input().await, 4);
        assert!(rx.read(Duration::ZERO).await.unwrap().is_empty());

        drop((peer_rx, io_tx));
    }

    #[tokio::test]
    async fn test_write_counts_partial_transfer() {
        let (peer, io) = tokio::io::duplex(8);
        let (_io_rx, io_tx) = tokio::io::split(io);

        let mut tx = Transmitter::new(io_tx, Duration::from_millis(50));
        let mut written = 0;
        let result = tx.write_counted(&[0xAA; 20], &mut written).await;
        assert!(matches!(result, Err(LinkError::Timeout)));
        assert_eq!(written, 8);

        drop(peer);
    }
}
