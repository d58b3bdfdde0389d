//! Per-connection frame loop.

use crate::error::ServerResult;
use crate::handler::{RequestHandler, Session};
use strand_protocol::{encode_frame, FrameDecoder, Packet};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

const READ_CHUNK: usize = 8 * 1024;

/// Serves one client stream until it closes.
///
/// Replies are written in the order frames arrive, one per frame, decode
/// errors included. A fatal decode error is answered and then the
/// connection is closed. Transactions the client left open are rolled back
/// when the stream ends, whatever the reason.
pub async fn serve_connection<S>(
    stream: S,
    handler: &RequestHandler,
    peer: &str,
    max_frame_size: usize,
) -> ServerResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Session::new(peer);
    let result = pump(stream, handler, &mut session, max_frame_size).await;
    handler.end_session(session);
    info!(peer, "connection closed");
    result
}

async fn pump<S>(
    mut stream: S,
    handler: &RequestHandler,
    session: &mut Session,
    max_frame_size: usize,
) -> ServerResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut decoder = FrameDecoder::with_max_frame_size(max_frame_size);
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            if decoder.buffered() > 0 {
                debug!(peer = session.peer(), pending = decoder.buffered(), "eof inside a frame");
            }
            return Ok(());
        }
        decoder.feed(&buf[..n]);

        let mut out = Vec::new();
        let mut fatal = false;
        while let Some(item) = decoder.decode_next() {
            let reply = match item {
                Ok(packet) => handler.handle(session, packet),
                Err(err) => {
                    fatal |= err.is_fatal();
                    handler.handle_decode_error(&err)
                }
            };
            write_reply(&mut out, &reply)?;
        }

        if !out.is_empty() {
            stream.write_all(&out).await?;
            stream.flush().await?;
        }
        if fatal {
            debug!(peer = session.peer(), "closing after fatal decode error");
            stream.shutdown().await?;
            return Ok(());
        }
    }
}

fn write_reply(out: &mut Vec<u8>, reply: &Packet) -> ServerResult<()> {
    out.extend_from_slice(&encode_frame(reply)?);
    Ok(())
}
