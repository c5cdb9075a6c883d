//! Background tasks of a connection.
//!
//! The monitor owns the read half for the whole life of the connection, so a server error
//! or an EOF is observed even when no operation is in flight. The writer owns the write half
//! and reports its failures through the same [`Shared`] state.
use bytes::{Bytes, BytesMut};
use std::{io, sync::Arc};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};

use super::shared::{Command, Shared};
use crate::{
    Error,
    common::verbose,
    postgres::{BackendMessage, frame},
};

const DEFAULT_BUF_CAPACITY: usize = 1024;

/// Read, frame, decode, and route every backend message until the stream ends or the
/// connection fails.
pub(crate) async fn monitor<R>(mut io: R, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    let mut close = shared.subscribe_close();
    let mut buf = BytesMut::with_capacity(DEFAULT_BUF_CAPACITY);

    loop {
        // split every complete frame already buffered
        loop {
            let frame = match frame::decode_next(&mut buf) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => return shared.fail(err.into()),
            };

            verbose!(msgtype = %BackendMessage::message_name(frame.msgtype), len = frame.wire_len(), "recv");

            match BackendMessage::decode(frame) {
                Ok(msg) => shared.dispatch(msg),
                Err(err) => return shared.fail(err.into()),
            }
        }

        let required = frame::required_len(&buf);
        buf.reserve(required.saturating_sub(buf.len()).max(DEFAULT_BUF_CAPACITY));

        let read = tokio::select! {
            read = io.read_buf(&mut buf) => read,
            // failed elsewhere, stop reading
            _ = close.wait_for(Option::is_some) => return,
        };

        match read {
            Ok(0) => return shared.eof(&buf),
            Ok(_) => { }
            Err(err) => return shared.fail(err.into()),
        }
    }
}

/// Write queued bytes in order until shutdown is requested.
pub(crate) async fn writer<W>(mut io: W, mut rx: mpsc::UnboundedReceiver<Command>, shared: Arc<Shared>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = rx.recv().await {
        match command {
            Command::Write(bytes) => {
                if let Err(err) = write(&mut io, bytes).await {
                    shared.fail(Error::writer_failed(err));
                    break;
                }
            }
            Command::Shutdown => break,
        }
    }

    verbose!("writer shutdown");
    let _ = io.shutdown().await;
}

async fn write<W: AsyncWrite + Unpin>(io: &mut W, bytes: Bytes) -> io::Result<()> {
    io.write_all(&bytes).await?;
    io.flush().await
}
