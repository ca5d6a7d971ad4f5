//! Playback controller and stream lifecycle.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                 Player (any caller thread)                │
//! │   play / play_blocking / stop / playing, serialized       │
//! └──────────────────────────────┬────────────────────────────┘
//!                                │ per-session stop + playing flags
//!                                ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │              Stream worker ("lowhum-stream")              │
//! │   parses header, maps samples, supervises the stream      │
//! └──────────────────────────────┬────────────────────────────┘
//!                                │ cpal callback
//!                                ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │                Audio backend (real-time)                  │
//! │   buffer fill from the mapped window, wraparound on loop  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! All stop paths (user stop, device-change stop, non-looping end of file)
//! converge on the controller, which is the single mutation point for the
//! session. At most one hardware stream is ever open: `play` tears down any
//! prior session synchronously before starting the next.

pub mod devices;
mod stream;

pub use devices::{OutputDevice, default_output_index, find_by_name, list_output_devices};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use parking_lot::Mutex;

use crate::error::Result;

/// Bound on how long `stop` waits for the worker to finish teardown.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// One playback session's shared state.
///
/// Created fresh on every `play` so a worker that outlived its teardown
/// bound can never clear a successor session's flags.
struct Session {
    /// Cancellation flag, shared with the stream engine
    stop: Arc<AtomicBool>,
    /// True exactly while the engine has an open, running stream
    playing: Arc<AtomicBool>,
    /// Signalled once by the worker when the engine has fully torn down
    done_rx: Receiver<()>,
    /// Worker thread handle; `None` for blocking playback on the caller's
    /// thread
    handle: Option<thread::JoinHandle<()>>,
}

/// The playback controller.
///
/// Streams a WAV file through a selected output device, loops it without
/// runtime crossfading, and guarantees that starting a new session fully
/// tears down the previous one first.
pub struct Player {
    /// Serializes the public operations; held across the bounded teardown
    /// wait so concurrent play/stop calls cannot interleave.
    ops: Mutex<()>,
    /// Session bookkeeping; held only for short sections, never across the
    /// teardown wait or a join.
    session: Mutex<Option<Session>>,
    stop_timeout: Duration,
}

impl Player {
    pub fn new() -> Self {
        Self::with_stop_timeout(STOP_TIMEOUT)
    }

    /// A player with a custom teardown bound, for callers that need a
    /// tighter guarantee than the default 2s.
    pub fn with_stop_timeout(stop_timeout: Duration) -> Self {
        Self {
            ops: Mutex::new(()),
            session: Mutex::new(None),
            stop_timeout,
        }
    }

    /// Start streaming `path` on a worker thread (non-blocking).
    ///
    /// Any active session is stopped first. Errors spawning the worker are
    /// returned; errors inside the engine (bad file, vanished device) are
    /// logged by the worker and surface only as `playing()` turning false.
    pub fn play(&self, path: &Path, device: Option<usize>, looped: bool) -> Result<()> {
        let _ops = self.ops.lock();
        self.stop_locked();

        let path: PathBuf = path.to_path_buf();
        self.spawn_session(move |stop, playing| match stream::run(&path, device, looped, &stop, &playing) {
            Ok(outcome) => tracing::debug!(?outcome, "Stream worker finished"),
            Err(e) => tracing::error!("Playback failed: {e}"),
        })
    }

    /// Stream `path` on the calling thread, returning when playback ends or
    /// is cancelled from another thread. Parse and open errors surface
    /// synchronously.
    pub fn play_blocking(&self, path: &Path, device: Option<usize>, looped: bool) -> Result<()> {
        let stop = Arc::new(AtomicBool::new(false));
        let playing = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = bounded(1);
        {
            let _ops = self.ops.lock();
            self.stop_locked();
            *self.session.lock() = Some(Session {
                stop: Arc::clone(&stop),
                playing: Arc::clone(&playing),
                done_rx,
                handle: None,
            });
            // Release `ops` before streaming: a concurrent stop() must be able
            // to take the session and raise the flag while we block here.
        }

        let result = stream::run(path, device, looped, &stop, &playing);
        let _ = done_tx.send(());
        result.map(|_| ())
    }

    /// Stop playback and wait (bounded) for teardown.
    ///
    /// Idempotent: a no-op when nothing is playing, and safe to call
    /// concurrently: one caller performs the teardown, the rest observe the
    /// already-idle state. If the worker does not finish within the bound it
    /// is detached, not killed; it still owns the stream and releases it as
    /// soon as its supervising loop observes the flag.
    pub fn stop(&self) {
        let _ops = self.ops.lock();
        self.stop_locked();
    }

    /// True exactly while a session is streaming or draining.
    pub fn playing(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.playing.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Teardown with `ops` already held.
    fn stop_locked(&self) {
        let Some(mut session) = self.session.lock().take() else {
            return;
        };
        session.stop.store(true, Ordering::SeqCst);

        match session.done_rx.recv_timeout(self.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = session.handle.take() {
                    let _ = handle.join();
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout = ?self.stop_timeout,
                    "Stream teardown timed out; detaching worker"
                );
                // Settle the public state immediately; the detached worker
                // releases the stream whenever it next checks the flag.
                session.playing.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Register and launch a new session running `work` on a named worker
    /// thread. Caller must hold `ops` with the previous session torn down.
    fn spawn_session<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce(Arc<AtomicBool>, Arc<AtomicBool>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let playing = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = bounded(1);

        let worker_stop = Arc::clone(&stop);
        let worker_playing = Arc::clone(&playing);
        let handle = thread::Builder::new()
            .name("lowhum-stream".to_string())
            .spawn(move || {
                work(worker_stop, worker_playing);
                let _ = done_tx.send(());
            })?;

        *self.session.lock() = Some(Session {
            stop,
            playing,
            done_rx,
            handle: Some(handle),
        });
        Ok(())
    }

    /// Launch a session around an arbitrary engine function instead of the
    /// real stream engine. Test seam for lifecycle properties.
    #[cfg(test)]
    pub(crate) fn start_fake_session<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce(Arc<AtomicBool>, Arc<AtomicBool>) + Send + 'static,
    {
        let _ops = self.ops.lock();
        self.stop_locked();
        self.spawn_session(work)
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    /// Spin until `cond` holds or `timeout` elapses.
    fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    /// A fake engine that "opens a stream" (counter), runs until the stop
    /// flag is raised, then "closes" it.
    fn counting_engine(
        opens: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    ) -> impl FnOnce(Arc<AtomicBool>, Arc<AtomicBool>) + Send + 'static {
        move |stop, playing| {
            opens.fetch_add(1, Ordering::SeqCst);
            playing.store(true, Ordering::SeqCst);
            while !stop.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(10));
            }
            playing.store(false, Ordering::SeqCst);
            closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_stop_is_idempotent_when_idle() {
        let player = Player::new();
        player.stop();
        player.stop();
        assert!(!player.playing());
    }

    #[test]
    fn test_sequential_plays_never_overlap_streams() {
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let player = Player::new();

        player
            .start_fake_session(counting_engine(Arc::clone(&opens), Arc::clone(&closes)))
            .unwrap();
        assert!(wait_until(Duration::from_secs(1), || player.playing()));
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 0);

        // Second play tears the first session down before the new stream opens.
        player
            .start_fake_session(counting_engine(Arc::clone(&opens), Arc::clone(&closes)))
            .unwrap();
        assert!(wait_until(Duration::from_secs(1), || player.playing()));
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        player.stop();
        assert!(!player.playing());
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stop_latency_is_bounded() {
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let player = Player::new();
        player
            .start_fake_session(counting_engine(opens, closes))
            .unwrap();
        assert!(wait_until(Duration::from_secs(1), || player.playing()));

        let started = Instant::now();
        player.stop();
        assert!(started.elapsed() < STOP_TIMEOUT);
        assert!(!player.playing());
    }

    #[test]
    fn test_hung_teardown_detaches_and_settles_state() {
        let player = Player::with_stop_timeout(Duration::from_millis(100));
        player
            .start_fake_session(|_stop, playing| {
                // Ignores the stop flag entirely.
                playing.store(true, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(500));
                playing.store(false, Ordering::SeqCst);
            })
            .unwrap();
        assert!(wait_until(Duration::from_secs(1), || player.playing()));

        let started = Instant::now();
        player.stop();
        // Returned at the bound, not after the worker's 500ms nap.
        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(!player.playing());

        // The controller accepts a new session while the zombie drains.
        player
            .start_fake_session(|stop, playing| {
                playing.store(true, Ordering::SeqCst);
                while !stop.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(5));
                }
                playing.store(false, Ordering::SeqCst);
            })
            .unwrap();
        assert!(wait_until(Duration::from_secs(1), || player.playing()));
        player.stop();
        assert!(!player.playing());
    }

    #[test]
    fn test_stop_after_natural_end_returns_immediately() {
        let player = Player::new();
        player
            .start_fake_session(|_stop, playing| {
                playing.store(true, Ordering::SeqCst);
                playing.store(false, Ordering::SeqCst);
            })
            .unwrap();
        assert!(wait_until(Duration::from_secs(1), || !player.playing()));

        // The done signal is buffered, so this must not wait out the timeout.
        let started = Instant::now();
        player.stop();
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
