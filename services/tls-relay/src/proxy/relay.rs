//! Bidirectional byte relay.
//!
//! Two copy tasks run per session, one per direction. Whichever finishes
//! first (EOF, error, or idle timeout) raises a shared close flag; the
//! other task observes it and stops. Each task shuts down the write half it
//! owns, and the streams are dropped once both tasks are done, so neither
//! side of a session outlives its peer.
//!
//! A graceful shutdown can stall when the peer has stopped reading (a TLS
//! close_notify has to be flushed first), so it is bounded by
//! [`SHUTDOWN_GRACE`]. Past that the halves are simply dropped.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::debug;

use crate::error::RelayError;

/// Size of the per-direction copy buffer.
pub const RELAY_BUFFER_SIZE: usize = 8192;

/// Longest a write half may take to shut down once its direction is done.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Tunables for a relay.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayOptions {
    /// End a direction when no bytes arrive for this long (none by default).
    pub idle_timeout: Option<Duration>,
}

/// Bytes moved by a relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes read from `a` and written to `b`.
    pub a_to_b: u64,
    /// Bytes read from `b` and written to `a`.
    pub b_to_a: u64,
}

/// Outcome of one copy direction.
struct Direction {
    bytes: u64,
    error: Option<io::Error>,
    /// This direction raised the close flag.
    ended_session: bool,
}

/// Relay bytes between `a` and `b` until either side finishes.
///
/// Returns once both directions have stopped and both streams have been
/// dropped. If the session ended on an error, the error of the direction
/// that ended it is returned after teardown, together with the bytes moved
/// up to that point.
pub async fn relay<A, B>(a: A, b: B, options: RelayOptions) -> Result<RelayStats, RelayError>
where
    A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (a_read, a_write) = split(a);
    let (b_read, b_write) = split(b);

    let (closed_tx, _) = watch::channel(false);
    let closed = Arc::new(closed_tx);

    let a_to_b = tokio::spawn(copy_direction(
        a_read,
        b_write,
        "a->b",
        options.idle_timeout,
        Arc::clone(&closed),
    ));
    let b_to_a = tokio::spawn(copy_direction(
        b_read,
        a_write,
        "b->a",
        options.idle_timeout,
        Arc::clone(&closed),
    ));

    let (a_to_b, b_to_a) = tokio::join!(a_to_b, b_to_a);
    let a_to_b = a_to_b.map_err(task_failed)?;
    let b_to_a = b_to_a.map_err(task_failed)?;

    let stats = RelayStats {
        a_to_b: a_to_b.bytes,
        b_to_a: b_to_a.bytes,
    };

    let (first, second) = if b_to_a.ended_session {
        (b_to_a, a_to_b)
    } else {
        (a_to_b, b_to_a)
    };

    match first.error.or(second.error) {
        Some(source) => Err(RelayError { stats, source }),
        None => Ok(stats),
    }
}

fn task_failed(e: JoinError) -> RelayError {
    RelayError {
        stats: RelayStats::default(),
        source: io::Error::other(e),
    }
}

/// Copy one direction, then signal the peer direction and shut down the sink.
async fn copy_direction<R, W>(
    mut reader: R,
    mut writer: W,
    direction: &'static str,
    idle_timeout: Option<Duration>,
    closed: Arc<watch::Sender<bool>>,
) -> Direction
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut closed_rx = closed.subscribe();
    let mut bytes = 0u64;
    let result = pump(&mut reader, &mut writer, idle_timeout, &mut closed_rx, &mut bytes).await;

    let ended_session = closed.send_if_modified(|closed| !std::mem::replace(closed, true));

    // The peer may already be gone or no longer reading; neither changes
    // the outcome.
    match tokio::time::timeout(SHUTDOWN_GRACE, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(direction, error = %e, "Shutdown after relay failed"),
        Err(_) => debug!(direction, "Shutdown after relay timed out, dropping"),
    }

    match &result {
        Ok(()) => debug!(direction, bytes, "Relay direction finished"),
        Err(e) => debug!(direction, bytes, error = %e, "Relay direction failed"),
    }

    Direction {
        bytes,
        error: result.err(),
        ended_session,
    }
}

async fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    idle_timeout: Option<Duration>,
    closed: &mut watch::Receiver<bool>,
    total: &mut u64,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];

    loop {
        let n = tokio::select! {
            biased;
            _ = closed_signal(closed) => return Ok(()),
            read = read_with_idle_timeout(reader, &mut buf, idle_timeout) => read?,
        };

        if n == 0 {
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = closed_signal(closed) => return Ok(()),
            written = writer.write_all(&buf[..n]) => written?,
        }

        *total += n as u64;
    }
}

async fn closed_signal(closed: &mut watch::Receiver<bool>) {
    // An error means the sender is gone, which only happens after teardown.
    let _ = closed.wait_for(|closed| *closed).await;
}

async fn read_with_idle_timeout<R>(
    reader: &mut R,
    buf: &mut [u8],
    idle_timeout: Option<Duration>,
) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, reader.read(buf)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "idle timeout")),
        },
        None => reader.read(buf).await,
    }
}
