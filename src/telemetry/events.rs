//! Capture session events and the broadcast bus carrying them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::capture::CaptureState;
use crate::device::DeviceMode;

/// Something observable that happened during a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum CaptureEvent {
    StateChanged {
        from: CaptureState,
        to: CaptureState,
        message: String,
    },
    DeviceModeChanged {
        mode: DeviceMode,
    },
    WindowSaved {
        sequence: usize,
        path: String,
        rows: usize,
    },
    /// Transient failure that was retried
    ReadFailed {
        context: String,
        code: i32,
        message: String,
    },
    /// Partial trailing rows dropped when capture stopped
    RowsDiscarded {
        rows: usize,
    },
}

/// Copy of the bus history for reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSnapshot {
    pub recent: Vec<CaptureEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

impl EventSnapshot {
    /// Paths of every window saved within the retained history
    pub fn saved_paths(&self) -> Vec<&str> {
        self.recent
            .iter()
            .filter_map(|event| match event {
                CaptureEvent::WindowSaved { path, .. } => Some(path.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Broadcast channel plus a bounded history of published events
pub struct EventBus {
    tx: broadcast::Sender<CaptureEvent>,
    history: Mutex<VecDeque<CaptureEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl EventBus {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: CaptureEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        if self.history_capacity > 0 {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(event.clone());
        }

        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> EventSnapshot {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        EventSnapshot {
            recent: history.iter().cloned().collect(),
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
        }
    }
}

/// Background subscriber that writes every bus event to the log as JSON
/// while the session runs.
pub struct EventJournal {
    running: Arc<AtomicBool>,
    handle: JoinHandle<u64>,
}

impl EventJournal {
    const IDLE: Duration = Duration::from_millis(20);

    pub fn spawn(mut rx: broadcast::Receiver<CaptureEvent>) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::spawn(move || {
            let mut logged = 0u64;
            loop {
                // Read the flag before draining so nothing published ahead
                // of `finish` is missed
                let stopping = !flag.load(Ordering::Acquire);
                match drain(&mut rx, &mut logged) {
                    TryRecvError::Empty if !stopping => thread::sleep(Self::IDLE),
                    _ => break,
                }
            }
            logged
        });
        Self { running, handle }
    }

    /// Drain what is still queued, stop the thread and return how many
    /// events were written.
    pub fn finish(self) -> u64 {
        self.running.store(false, Ordering::Release);
        self.handle.join().unwrap_or(0)
    }
}

/// Log queued events until the channel is empty or closed; returns which
fn drain(rx: &mut broadcast::Receiver<CaptureEvent>, logged: &mut u64) -> TryRecvError {
    loop {
        match rx.try_recv() {
            Ok(event) => {
                journal_event(&event);
                *logged += 1;
            }
            Err(TryRecvError::Lagged(skipped)) => {
                warn!("[EventJournal] Fell behind, {} events skipped", skipped);
            }
            Err(err) => return err,
        }
    }
}

fn journal_event(event: &CaptureEvent) {
    match serde_json::to_string(event) {
        Ok(json) => info!("[EventJournal] {}", json),
        Err(err) => warn!("[EventJournal] Unserializable event {:?}: {}", event, err),
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256, 512)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved(sequence: usize) -> CaptureEvent {
        CaptureEvent::WindowSaved {
            sequence,
            path: format!("red_{:03}.csv", sequence),
            rows: 100,
        }
    }

    #[test]
    fn bus_preserves_order_within_history() {
        let bus = EventBus::new(8, 4);
        bus.publish(CaptureEvent::DeviceModeChanged {
            mode: DeviceMode::Impedance,
        });
        bus.publish(saved(0));
        bus.publish(saved(1));

        let snapshot = bus.snapshot();
        assert_eq!(snapshot.recent.len(), 3);
        assert_eq!(snapshot.saved_paths(), vec!["red_000.csv", "red_001.csv"]);
    }

    #[test]
    fn bus_drops_oldest_when_full() {
        let bus = EventBus::new(8, 2);
        for sequence in 0..3 {
            bus.publish(saved(sequence));
        }

        let snapshot = bus.snapshot();
        assert_eq!(snapshot.total_events, 3);
        assert_eq!(snapshot.dropped_events, 1);
        assert_eq!(snapshot.recent[0], saved(1));
    }

    #[test]
    fn subscribers_receive_published_events() {
        let bus = EventBus::new(8, 0);
        let mut rx = bus.subscribe();
        bus.publish(CaptureEvent::RowsDiscarded { rows: 40 });

        assert_eq!(rx.try_recv().unwrap(), CaptureEvent::RowsDiscarded { rows: 40 });
        assert!(bus.snapshot().recent.is_empty());
    }

    #[test]
    fn journal_drains_pending_events_on_finish() {
        let bus = EventBus::new(16, 0);
        let journal = EventJournal::spawn(bus.subscribe());
        bus.publish(saved(0));
        bus.publish(CaptureEvent::RowsDiscarded { rows: 12 });
        bus.publish(saved(1));

        assert_eq!(journal.finish(), 3);
    }

    #[test]
    fn journal_stops_when_bus_is_dropped() {
        let bus = EventBus::new(16, 0);
        let journal = EventJournal::spawn(bus.subscribe());
        bus.publish(saved(0));
        drop(bus);

        assert_eq!(journal.handle.join().unwrap(), 1);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(CaptureEvent::StateChanged {
            from: CaptureState::Countdown,
            to: CaptureState::Capture,
            message: "go".to_string(),
        })
        .unwrap();

        assert_eq!(json["type"], "state_changed");
        assert_eq!(json["payload"]["to"], "capture");
    }
}
