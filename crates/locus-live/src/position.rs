//! Position sources for the local device.

use std::sync::Arc;
use std::time::{Duration, Instant};

use locus_core::{PositionConfig, PositionError};
use locus_geo::Coordinate;
use parking_lot::Mutex;

use crate::subscription::{subscription, Feed, Subscription};

/// One delivery from a position source: a fix or a failure.
pub type PositionUpdate = Result<Coordinate, PositionError>;

const WATCH_BUFFER: usize = 16;

/// Options for watching the device position.
///
/// A watch reports [`PositionError::Timeout`] whenever no update arrives
/// within `timeout` and then keeps watching; a zero `timeout` waits forever.
/// `maximum_age` lets a source hand out a cached fix at the start of a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    pub maximum_age: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::from(&PositionConfig::default())
    }
}

impl From<&PositionConfig> for WatchOptions {
    fn from(config: &PositionConfig) -> Self {
        Self {
            high_accuracy: config.high_accuracy,
            timeout: config.timeout(),
            maximum_age: config.maximum_age(),
        }
    }
}

/// Forward `raw`, inserting a timeout error for every `timeout` that
/// passes without an update.
fn with_deadline(
    mut raw: Subscription<PositionUpdate>,
    options: &WatchOptions,
) -> Subscription<PositionUpdate> {
    if options.timeout.is_zero() {
        return raw;
    }

    let timeout = options.timeout;
    let (feed, sub) = raw.linked(WATCH_BUFFER);

    tokio::spawn(async move {
        loop {
            let update = match tokio::time::timeout(timeout, raw.recv()).await {
                Ok(Some(update)) => update,
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!("No position fix within {:?}", timeout);
                    Err(PositionError::Timeout)
                }
            };
            if !feed.send(update).await {
                break;
            }
        }
    });

    sub
}

/// Supplies position updates for the local device.
pub trait PositionSource {
    /// Start watching. Updates arrive until the subscription is cancelled
    /// or the source runs dry. Must be called inside a tokio runtime.
    fn watch(&self, options: &WatchOptions) -> Subscription<PositionUpdate>;
}

/// Replays a recorded track at a fixed pace.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    samples: Vec<Coordinate>,
    interval: Duration,
}

impl ReplaySource {
    pub fn new(samples: Vec<Coordinate>, interval: Duration) -> Self {
        Self { samples, interval }
    }

    /// Parse a JSON array of `{ "latitude": .., "longitude": .. }` objects.
    pub fn from_json(json: &str, interval: Duration) -> Result<Self, serde_json::Error> {
        let samples: Vec<Coordinate> = serde_json::from_str(json)?;
        Ok(Self::new(samples, interval))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl PositionSource for ReplaySource {
    fn watch(&self, options: &WatchOptions) -> Subscription<PositionUpdate> {
        let (feed, sub) = subscription(WATCH_BUFFER);
        let samples = self.samples.clone();
        let interval = self.interval;
        tracing::debug!(
            "Replaying {} samples every {:?} (high accuracy: {})",
            samples.len(),
            interval,
            options.high_accuracy
        );

        tokio::spawn(async move {
            for sample in samples {
                if !interval.is_zero() {
                    tokio::select! {
                        _ = feed.cancelled() => return,
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
                if !feed.send(Ok(sample)).await {
                    return;
                }
            }
            tracing::debug!("Replay finished");
        });

        with_deadline(sub, options)
    }
}

#[derive(Debug, Default)]
struct ManualState {
    watchers: Vec<Feed<PositionUpdate>>,
    last_fix: Option<(Coordinate, Instant)>,
}

/// Position source driven by hand through [`ManualSource::push`].
#[derive(Debug, Clone, Default)]
pub struct ManualSource {
    state: Arc<Mutex<ManualState>>,
}

impl ManualSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `update` to every live watcher; returns how many received it.
    pub async fn push(&self, update: PositionUpdate) -> usize {
        let watchers = {
            let mut state = self.state.lock();
            if let Ok(at) = &update {
                state.last_fix = Some((*at, Instant::now()));
            }
            state.watchers.clone()
        };

        let mut delivered = 0;
        for watcher in watchers {
            if watcher.send(update.clone()).await {
                delivered += 1;
            }
        }

        self.state.lock().watchers.retain(|w| !w.is_closed());
        delivered
    }

    /// End every watch, as if the device stopped reporting.
    pub fn close(&self) {
        self.state.lock().watchers.clear();
    }

    pub fn watcher_count(&self) -> usize {
        self.state
            .lock()
            .watchers
            .iter()
            .filter(|w| !w.is_closed())
            .count()
    }
}

impl PositionSource for ManualSource {
    fn watch(&self, options: &WatchOptions) -> Subscription<PositionUpdate> {
        let (feed, sub) = subscription(WATCH_BUFFER);
        let mut state = self.state.lock();

        if let Some((at, taken)) = state.last_fix {
            if !options.maximum_age.is_zero() && taken.elapsed() <= options.maximum_age {
                feed.try_send(Ok(at));
            }
        }
        state.watchers.push(feed);
        drop(state);

        with_deadline(sub, options)
    }
}
