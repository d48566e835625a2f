//! Transfer channel: length-prefixed message framing over one stream
//!
//! Each frame is a 4-byte big-endian length followed by that many payload
//! bytes. The read and write halves are independent, so the inbound message
//! stream can be drained on one task while another task sends.

use std::pin::Pin;
use std::sync::Mutex as StdMutex;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{SinkExt, Stream, StreamExt};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::adapter::BoxedStream;
use crate::codec;
use crate::errors::{ChatError, Result};
use crate::types::Message;

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_LEN: usize = 4;

type FrameReader = FramedRead<ReadHalf<BoxedStream>, LengthDelimitedCodec>;
type FrameWriter = FramedWrite<WriteHalf<BoxedStream>, LengthDelimitedCodec>;

fn frame_codec(max_frame_length: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(LENGTH_PREFIX_LEN)
        .big_endian()
        .max_frame_length(max_frame_length)
        .new_codec()
}

// ----------------------------------------------------------------------------
// Transfer Channel
// ----------------------------------------------------------------------------

/// One live stream turned into framed messages
pub struct TransferChannel {
    peer: String,
    reader: StdMutex<Option<FrameReader>>,
    writer: Mutex<Option<FrameWriter>>,
    closing: CancellationToken,
}

impl TransferChannel {
    /// Wrap an established stream to `peer`
    pub fn new(stream: BoxedStream, peer: impl Into<String>, max_frame_length: usize) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            peer: peer.into(),
            reader: StdMutex::new(Some(FramedRead::new(
                read_half,
                frame_codec(max_frame_length),
            ))),
            writer: Mutex::new(Some(FramedWrite::new(
                write_half,
                frame_codec(max_frame_length),
            ))),
            closing: CancellationToken::new(),
        }
    }

    /// Address or label of the remote end
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Take the inbound message stream; only the first call returns it
    pub fn incoming(&self) -> Option<IncomingMessages> {
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()?;
        Some(IncomingMessages {
            peer: self.peer.clone(),
            inner: reader,
        })
    }

    /// Write one frame carrying `payload`
    ///
    /// A write blocked on a peer that stopped reading is abandoned with
    /// `NotConnected` as soon as [`close`](Self::close) is called.
    pub async fn send(&self, payload: Bytes) -> Result<()> {
        let len = payload.len();
        tokio::select! {
            biased;
            _ = self.closing.cancelled() => return Err(ChatError::NotConnected),
            result = self.write_frame(payload) => result?,
        }
        trace!("Sent {} byte frame to {}", len, self.peer);
        Ok(())
    }

    async fn write_frame(&self, payload: Bytes) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(ChatError::NotConnected)?;
        writer.send(payload).await?;
        Ok(())
    }

    /// Encode and send a message
    pub async fn send_message(&self, message: &Message) -> Result<()> {
        self.send(codec::encode(message)).await
    }

    /// Shut down the write half; later sends fail with `NotConnected`
    ///
    /// Completed sends are already flushed. Bytes of an abandoned send still
    /// sitting in the frame buffer are discarded rather than flushed.
    pub async fn close(&self) {
        self.closing.cancel();
        if let Some(writer) = self.writer.lock().await.take() {
            let mut write_half = writer.into_inner();
            if let Err(e) = write_half.shutdown().await {
                debug!("Error shutting down stream to {}: {}", self.peer, e);
            }
        }
    }

    /// Whether the write half is still open
    pub async fn is_open(&self) -> bool {
        self.writer.lock().await.is_some()
    }
}

// ----------------------------------------------------------------------------
// Inbound Messages
// ----------------------------------------------------------------------------

/// Lazy stream of decoded inbound messages
///
/// Ends with `None` when the peer closes cleanly between frames. Any other
/// read failure, including EOF inside a frame, yields one `Err` item.
pub struct IncomingMessages {
    peer: String,
    inner: FrameReader,
}

impl Stream for IncomingMessages {
    type Item = Result<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                trace!("Received {} byte frame from {}", frame.len(), self.peer);
                Poll::Ready(Some(Ok(codec::decode(&frame, false))))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(ChatError::Io(e)))),
            Poll::Ready(None) => {
                debug!("Stream from {} closed by peer", self.peer);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
