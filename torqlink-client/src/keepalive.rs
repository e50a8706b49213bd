//! Keep-alive task
//!
//! Sends MID 9999 on a fixed interval while a session is streaming. The task
//! is scoped by a cancellation token that the session cancels when it leaves
//! the streaming state. A failed or timed-out send ends the task; the read
//! loop notices the broken link on its own.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use torqlink_codec::keep_alive;
use torqlink_core::TorqlinkError;
use torqlink_transport::FrameSink;

/// Why the keep-alive task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveExit {
    Cancelled,
    SendFailed,
}

/// Spawn the keep-alive task for one session
///
/// The first keep-alive goes out one full `period` after spawning. Each send,
/// including waiting for the shared writer, is bounded by `write_timeout`.
pub fn spawn<W>(
    device_id: String,
    writer: Arc<Mutex<W>>,
    period: Duration,
    write_timeout: Duration,
    token: CancellationToken,
) -> JoinHandle<KeepAliveExit>
where
    W: FrameSink + 'static,
{
    tokio::spawn(async move {
        let frame = keep_alive();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => return KeepAliveExit::Cancelled,
                _ = ticker.tick() => {}
            }

            let send = async { writer.lock().await.write_frame(&frame).await };
            let sent = tokio::select! {
                _ = token.cancelled() => return KeepAliveExit::Cancelled,
                sent = tokio::time::timeout(write_timeout, send) => {
                    sent.unwrap_or(Err(TorqlinkError::Timeout))
                }
            };
            match sent {
                Ok(()) => log::trace!("[{}] -> MID 9999 keep alive", device_id),
                Err(e) => {
                    log::warn!("[{}] Error sending keep alive: {}. Stopping.", device_id, e);
                    return KeepAliveExit::SendFailed;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use torqlink_core::TorqlinkResult;

    const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<Vec<u8>>,
        fail: bool,
        stall: bool,
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn write_frame(&mut self, frame: &[u8]) -> TorqlinkResult<()> {
            if self.stall {
                std::future::pending::<()>().await;
            }
            if self.fail {
                return Err(TorqlinkError::Connection(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "broken pipe",
                )));
            }
            self.frames.push(frame.to_vec());
            Ok(())
        }

        async fn close(&mut self) -> TorqlinkResult<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_on_interval_until_cancelled() {
        let sink = Arc::new(Mutex::new(RecordingSink::default()));
        let token = CancellationToken::new();
        let task = spawn(
            "nexo-pistol".into(),
            sink.clone(),
            Duration::from_secs(10),
            WRITE_TIMEOUT,
            token.clone(),
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(sink.lock().await.frames.is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(sink.lock().await.frames.len(), 3);
        assert_eq!(sink.lock().await.frames[0], keep_alive());

        token.cancel();
        assert_eq!(task.await.unwrap(), KeepAliveExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_stops_task() {
        let sink = Arc::new(Mutex::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        }));
        let token = CancellationToken::new();
        let task = spawn(
            "nexo-angle".into(),
            sink,
            Duration::from_secs(10),
            WRITE_TIMEOUT,
            token.clone(),
        );

        assert_eq!(task.await.unwrap(), KeepAliveExit::SendFailed);
        assert!(!token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_send_times_out() {
        let sink = Arc::new(Mutex::new(RecordingSink {
            stall: true,
            ..RecordingSink::default()
        }));
        let token = CancellationToken::new();
        let started = Instant::now();
        let task = spawn(
            "nexo-angle".into(),
            sink,
            Duration::from_secs(10),
            WRITE_TIMEOUT,
            token,
        );

        assert_eq!(task.await.unwrap(), KeepAliveExit::SendFailed);
        // First tick at 10s, then the 5s write deadline
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(15) && elapsed < Duration::from_secs(16), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_stalled_send() {
        let sink = Arc::new(Mutex::new(RecordingSink {
            stall: true,
            ..RecordingSink::default()
        }));
        let token = CancellationToken::new();
        let task = spawn(
            "nexo-angle".into(),
            sink,
            Duration::from_secs(10),
            Duration::from_secs(3600),
            token.clone(),
        );

        tokio::time::sleep(Duration::from_secs(11)).await;
        token.cancel();
        assert_eq!(task.await.unwrap(), KeepAliveExit::Cancelled);
    }
}
