// Trend history for rendering
//
// The poll thread pushes every published reading set into an rtrb SPSC
// ring; the rendering thread drains it into a bounded per-electrode
// history. Nothing on the poll side ever blocks on the UI.

use std::collections::{BTreeMap, VecDeque};

use log::debug;
use rtrb::{Consumer, Producer, PushError, RingBuffer};

use super::{ElectrodeReadings, ReadingKind};
use crate::device::Electrode;

/// One reading set travelling from the poll thread to the UI
#[derive(Debug, Clone, PartialEq)]
pub struct TrendSample {
    pub kind: ReadingKind,
    pub readings: ElectrodeReadings,
}

pub struct TrendProducer {
    inner: Producer<TrendSample>,
    dropped: u64,
}

pub struct TrendConsumer {
    inner: Consumer<TrendSample>,
}

/// Create a trend feed holding at most `capacity` undrained samples
pub fn trend_feed(capacity: usize) -> (TrendProducer, TrendConsumer) {
    let (producer, consumer) = RingBuffer::new(capacity.max(1));
    (
        TrendProducer {
            inner: producer,
            dropped: 0,
        },
        TrendConsumer { inner: consumer },
    )
}

impl TrendProducer {
    /// Push without blocking; a full ring drops the sample
    pub fn push(&mut self, sample: TrendSample) -> bool {
        match self.inner.push(sample) {
            Ok(()) => true,
            Err(PushError::Full(_)) => {
                self.dropped += 1;
                if self.dropped % 100 == 1 {
                    debug!("[TrendFeed] Ring full, {} samples dropped so far", self.dropped);
                }
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl TrendConsumer {
    /// Move every pending sample into `history`; returns how many moved
    pub fn drain_into(&mut self, history: &mut History) -> usize {
        let mut moved = 0;
        while let Ok(sample) = self.inner.pop() {
            history.push(sample.kind, &sample.readings);
            moved += 1;
        }
        moved
    }
}

/// Bounded FIFO of past readings per electrode per kind
#[derive(Debug, Clone)]
pub struct History {
    max_len: usize,
    series: BTreeMap<(ReadingKind, Electrode), VecDeque<f64>>,
}

impl History {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            series: BTreeMap::new(),
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn push(&mut self, kind: ReadingKind, readings: &ElectrodeReadings) {
        if self.max_len == 0 {
            return;
        }
        for (electrode, value) in readings.iter() {
            let series = self
                .series
                .entry((kind, electrode))
                .or_insert_with(|| VecDeque::with_capacity(self.max_len));
            if series.len() == self.max_len {
                series.pop_front();
            }
            series.push_back(value);
        }
    }

    /// Oldest-first copy of one trend line
    pub fn series(&self, kind: ReadingKind, electrode: Electrode) -> Vec<f64> {
        self.series
            .get(&(kind, electrode))
            .map(|values| values.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, kind: ReadingKind, electrode: Electrode) -> usize {
        self.series.get(&(kind, electrode)).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = History::new(3);
        for value in 1..=5 {
            history.push(ReadingKind::Signal, &ElectrodeReadings::uniform(value as f64));
        }

        assert_eq!(
            history.series(ReadingKind::Signal, Electrode::T4),
            vec![3.0, 4.0, 5.0]
        );
        assert_eq!(history.len(ReadingKind::Impedance, Electrode::T4), 0);
    }

    #[test]
    fn test_feed_drains_in_order() {
        let (mut producer, mut consumer) = trend_feed(4);
        let mut history = History::new(10);
        for value in [600.0, 700.0] {
            producer.push(TrendSample {
                kind: ReadingKind::Impedance,
                readings: ElectrodeReadings::uniform(value),
            });
        }

        assert_eq!(consumer.drain_into(&mut history), 2);
        assert_eq!(
            history.series(ReadingKind::Impedance, Electrode::O1),
            vec![600.0, 700.0]
        );
        assert_eq!(consumer.drain_into(&mut history), 0);
    }

    #[test]
    fn test_full_feed_drops_instead_of_blocking() {
        let (mut producer, _consumer) = trend_feed(1);
        let sample = TrendSample {
            kind: ReadingKind::Signal,
            readings: ElectrodeReadings::uniform(1.0),
        };

        assert!(producer.push(sample.clone()));
        assert!(!producer.push(sample));
        assert_eq!(producer.dropped(), 1);
    }
}
