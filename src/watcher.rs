//! Output-device change watcher.
//!
//! Polls the device catalog on a fixed interval and diffs the set of device
//! *names* against the last observation. Names are the comparison key
//! because the OS may renumber indices on hotplug. On a change the watcher
//! stops active playback immediately (a stream bound to vanished hardware
//! would otherwise click or wedge) and emits a fire-and-forget notification
//! for the UI collaborator.
//!
//! Enumeration failures are treated as transient: the tick is skipped and
//! the stored set left untouched.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::error::Result;
use crate::player::{OutputDevice, Player, list_output_devices};

/// Shutdown responsiveness of the poll loop.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Notification emitted when the output device set changes.
#[derive(Debug, Clone)]
pub struct DeviceChange {
    /// Device names present now but not at the previous tick
    pub added: Vec<String>,
    /// Device names gone since the previous tick
    pub removed: Vec<String>,
    /// The full current enumeration, for device-selection UI refresh
    pub devices: Vec<OutputDevice>,
    /// Whether playback was active and has been stopped because of this change
    pub stopped_playback: bool,
    /// Human-readable summary for a user-visible notification
    pub reason: String,
}

/// Handle to a running device watcher.
///
/// Dropping the handle stops the poll thread.
pub struct DeviceWatcher {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DeviceWatcher {
    /// Start watching on a dedicated thread.
    ///
    /// Returns the watcher handle and the notification channel. The first
    /// successful enumeration seeds the known set without emitting.
    pub fn spawn(player: Arc<Player>, interval: Duration) -> Result<(Self, Receiver<DeviceChange>)> {
        Self::spawn_with(player, interval, list_output_devices)
    }

    /// `spawn` with an injectable enumeration source.
    pub(crate) fn spawn_with<E>(
        player: Arc<Player>,
        interval: Duration,
        mut enumerate: E,
    ) -> Result<(Self, Receiver<DeviceChange>)>
    where
        E: FnMut() -> Result<Vec<OutputDevice>> + Send + 'static,
    {
        let (tx, rx) = bounded(16);
        let running = Arc::new(AtomicBool::new(true));
        let loop_running = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("lowhum-devwatch".to_string())
            .spawn(move || {
                tracing::info!(?interval, "Device watcher started");
                let mut known: Option<HashSet<String>> = None;
                let mut next_tick = Instant::now();
                while loop_running.load(Ordering::Relaxed) {
                    if Instant::now() >= next_tick {
                        tick(&mut known, &mut enumerate, &player, &tx);
                        next_tick = Instant::now() + interval;
                    }
                    // Sleep in small slices so shutdown stays responsive.
                    thread::sleep(SLEEP_SLICE);
                }
                tracing::info!("Device watcher stopped");
            })?;

        Ok((
            Self {
                running,
                handle: Some(handle),
            },
            rx,
        ))
    }

    /// Stop the poll thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DeviceWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One watcher tick: enumerate, diff, stop-and-notify on change.
fn tick<E>(
    known: &mut Option<HashSet<String>>,
    enumerate: &mut E,
    player: &Player,
    tx: &Sender<DeviceChange>,
) where
    E: FnMut() -> Result<Vec<OutputDevice>>,
{
    let current = match enumerate() {
        Ok(devices) => devices,
        Err(e) => {
            tracing::debug!("Device enumeration failed, skipping tick: {e}");
            return;
        }
    };
    let names: HashSet<String> = current.iter().map(|d| d.name.clone()).collect();

    let Some(previous) = known.as_ref() else {
        *known = Some(names);
        return;
    };
    if *previous == names {
        return;
    }

    let mut added: Vec<String> = names.difference(previous).cloned().collect();
    let mut removed: Vec<String> = previous.difference(&names).cloned().collect();
    added.sort();
    removed.sort();
    tracing::info!(?added, ?removed, "Output device set changed");

    let stopped_playback = player.playing();
    if stopped_playback {
        player.stop();
    }

    let mut parts = Vec::new();
    if !added.is_empty() {
        parts.push(format!("added {}", added.join(", ")));
    }
    if !removed.is_empty() {
        parts.push(format!("removed {}", removed.join(", ")));
    }
    let reason = format!("Output devices changed: {}", parts.join("; "));

    // Fire and forget: a slow or absent consumer must not stall the watcher.
    let _ = tx.try_send(DeviceChange {
        added,
        removed,
        devices: current,
        stopped_playback,
        reason,
    });
    *known = Some(names);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(index: usize, name: &str) -> OutputDevice {
        OutputDevice {
            index,
            name: name.to_string(),
            is_default: index == 0,
        }
    }

    fn idle_player() -> Player {
        Player::new()
    }

    /// A player with an active fake session that honors the stop flag.
    fn playing_player() -> Player {
        let player = Player::new();
        player
            .start_fake_session(|stop, playing| {
                playing.store(true, Ordering::SeqCst);
                while !stop.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(5));
                }
                playing.store(false, Ordering::SeqCst);
            })
            .unwrap();
        let deadline = Instant::now() + Duration::from_secs(1);
        while !player.playing() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(player.playing());
        player
    }

    #[test]
    fn test_first_enumeration_seeds_without_notifying() {
        let (tx, rx) = bounded(16);
        let player = idle_player();
        let mut known = None;
        tick(&mut known, &mut || Ok(vec![dev(0, "Speakers")]), &player, &tx);
        assert!(rx.try_recv().is_err());
        assert_eq!(known, Some(HashSet::from(["Speakers".to_string()])));
    }

    #[test]
    fn test_added_device_stops_playback_and_notifies_once() {
        let (tx, rx) = bounded(16);
        let player = playing_player();
        let mut known = Some(HashSet::from(["Speakers".to_string()]));

        tick(
            &mut known,
            &mut || Ok(vec![dev(0, "Speakers"), dev(1, "Headphones")]),
            &player,
            &tx,
        );

        let event = rx.try_recv().unwrap();
        assert_eq!(event.added, vec!["Headphones".to_string()]);
        assert!(event.removed.is_empty());
        assert!(event.stopped_playback);
        assert!(event.reason.contains("Headphones"));
        assert!(!player.playing());
        // Exactly one notification for one change.
        assert!(rx.try_recv().is_err());

        // Identical set on the next tick: no further event.
        tick(
            &mut known,
            &mut || Ok(vec![dev(0, "Speakers"), dev(1, "Headphones")]),
            &player,
            &tx,
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_change_while_idle_updates_set_without_stopping() {
        let (tx, rx) = bounded(16);
        let player = idle_player();
        let mut known = Some(HashSet::from(["Speakers".to_string()]));

        tick(&mut known, &mut || Ok(vec![dev(0, "Monitor")]), &player, &tx);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.removed, vec!["Speakers".to_string()]);
        assert_eq!(event.added, vec!["Monitor".to_string()]);
        assert!(!event.stopped_playback);
        assert_eq!(known, Some(HashSet::from(["Monitor".to_string()])));
    }

    #[test]
    fn test_enumeration_failure_is_no_change() {
        let (tx, rx) = bounded(16);
        let player = playing_player();
        let mut known = Some(HashSet::from(["Speakers".to_string()]));

        tick(
            &mut known,
            &mut || Err(crate::error::Error::device("subsystem unavailable")),
            &player,
            &tx,
        );

        assert!(rx.try_recv().is_err());
        assert!(player.playing());
        assert_eq!(known, Some(HashSet::from(["Speakers".to_string()])));
        player.stop();
    }

    #[test]
    fn test_spawned_watcher_detects_change_and_shuts_down() {
        let player = Arc::new(idle_player());
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let enumerate_calls = Arc::clone(&calls);

        let (watcher, rx) = DeviceWatcher::spawn_with(
            Arc::clone(&player),
            Duration::from_millis(10),
            move || {
                let n = enumerate_calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Ok(vec![dev(0, "Speakers")])
                } else {
                    Ok(vec![dev(0, "Speakers"), dev(1, "USB DAC")])
                }
            },
        )
        .unwrap();

        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event.added, vec!["USB DAC".to_string()]);
        assert_eq!(event.devices.len(), 2);
        watcher.stop();
    }
}
