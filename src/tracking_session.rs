use chrono::{DateTime, Utc};
use std::sync::mpsc::{self, Receiver, Sender};

use crate::activity::{GeoPoint, NewActivity};
use crate::distance::haversine_km;
use crate::errors::{Error, Result};

/// Options forwarded to the position source on subscribe. Defaults mirror
/// what the app ships with: high accuracy, an update every 5s or 10m.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SubscribeOptions {
    pub high_accuracy: bool,
    pub min_interval_ms: u64,
    pub min_distance_meters: f64,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        SubscribeOptions {
            high_accuracy: true,
            min_interval_ms: 5000,
            min_distance_meters: 10.0,
        }
    }
}

/// Events pushed by a position source into the session's channel.
#[derive(Clone, Debug, PartialEq)]
pub enum PositionEvent {
    Update(GeoPoint),
    Failure(String),
}

/// An asynchronous producer of position fixes. Subscribing hands the
/// source a channel sender; cancellation is explicit via `unsubscribe`
/// with the handle returned by `subscribe`.
pub trait PositionSource {
    type Subscription;

    fn request_permission(&mut self) -> bool;

    fn subscribe(
        &mut self,
        options: &SubscribeOptions,
        events: Sender<PositionEvent>,
    ) -> Result<Self::Subscription>;

    fn unsubscribe(&mut self, subscription: Self::Subscription);
}

/// A periodic time-event producer, used only to advance the displayed
/// elapsed time while tracking.
pub trait Ticker {
    type Handle;

    fn start(&mut self, period_ms: u64, ticks: Sender<()>) -> Result<Self::Handle>;

    fn stop(&mut self, handle: Self::Handle);
}

pub const TICK_PERIOD_MS: u64 = 1000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Tracking,
    Stopped,
}

/* The session is a one-shot state machine: Idle -> Tracking -> Stopped,
never reused. It owns both external subscriptions while tracking; they are
acquired in `start` and released on every exit path of `stop`, including
drop of an abandoned session, so a live location subscription can never
leak past the session's lifetime. */
pub struct TrackingSession<S: PositionSource, T: Ticker> {
    source: S,
    ticker: T,
    options: SubscribeOptions,

    state: SessionState,
    route: Vec<GeoPoint>,
    distance_km: f64,
    last_point: Option<GeoPoint>,
    start_time: Option<DateTime<Utc>>,
    stop_time: Option<DateTime<Utc>>,
    // tick-driven counter for display only; the persisted duration is
    // reconciled to wall-clock start/stop in `finalize`.
    elapsed_secs: u64,

    position_rx: Option<Receiver<PositionEvent>>,
    tick_rx: Option<Receiver<()>>,
    subscription: Option<S::Subscription>,
    ticker_handle: Option<T::Handle>,
}

impl<S: PositionSource, T: Ticker> TrackingSession<S, T> {
    pub fn new(source: S, ticker: T) -> Self {
        Self::with_options(source, ticker, SubscribeOptions::default())
    }

    pub fn with_options(source: S, ticker: T, options: SubscribeOptions) -> Self {
        TrackingSession {
            source,
            ticker,
            options,
            state: SessionState::Idle,
            route: Vec::new(),
            distance_km: 0.0,
            last_point: None,
            start_time: None,
            stop_time: None,
            elapsed_secs: 0,
            position_rx: None,
            tick_rx: None,
            subscription: None,
            ticker_handle: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn route(&self) -> &[GeoPoint] {
        &self.route
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    /// Elapsed seconds as counted by ticks, for display while tracking.
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    /// Begins tracking: requests permission, subscribes to the position
    /// source and starts the ticker. Valid only from `Idle`.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            SessionState::Tracking => return Err(Error::AlreadyTracking),
            SessionState::Stopped => return Err(Error::SessionFinished),
            SessionState::Idle => (),
        }
        if !self.source.request_permission() {
            return Err(Error::PermissionDenied);
        }

        let (position_tx, position_rx) = mpsc::channel();
        let (tick_tx, tick_rx) = mpsc::channel();
        let subscription = self.source.subscribe(&self.options, position_tx)?;
        let ticker_handle = match self.ticker.start(TICK_PERIOD_MS, tick_tx) {
            Ok(handle) => handle,
            Err(err) => {
                // don't leak the position subscription on a partial start
                self.source.unsubscribe(subscription);
                return Err(err);
            }
        };

        self.route.clear();
        self.distance_km = 0.0;
        self.last_point = None;
        self.elapsed_secs = 0;
        self.start_time = Some(Utc::now());
        self.stop_time = None;
        self.position_rx = Some(position_rx);
        self.tick_rx = Some(tick_rx);
        self.subscription = Some(subscription);
        self.ticker_handle = Some(ticker_handle);
        self.state = SessionState::Tracking;
        info!("tracking session started");
        Ok(())
    }

    /// Applies one position fix. Ignored unless `Tracking`: the source may
    /// still emit events after a stop request, before unsubscription
    /// completes, and those must not grow the route.
    pub fn on_position_update(&mut self, point: GeoPoint) {
        if self.state != SessionState::Tracking {
            debug!("dropping position update outside of tracking");
            return;
        }
        if let Some(last) = self.last_point {
            // accumulate, never recompute from scratch
            self.distance_km += haversine_km(&last, &point);
        }
        self.route.push(point);
        self.last_point = Some(point);
    }

    /// Advances the displayed elapsed time by one tick period.
    pub fn on_tick(&mut self) {
        if self.state == SessionState::Tracking {
            self.elapsed_secs += TICK_PERIOD_MS / 1000;
        }
    }

    /// Drains all pending events from both producers and applies them in
    /// the order received. A source failure stops the session (releasing
    /// both subscriptions) and is surfaced to the caller.
    pub fn process_events(&mut self) -> Result<()> {
        if let Some(position_rx) = self.position_rx.take() {
            let mut failure = None;
            for event in position_rx.try_iter() {
                match event {
                    PositionEvent::Update(point) => self.on_position_update(point),
                    PositionEvent::Failure(message) => {
                        failure = Some(message);
                        break;
                    }
                }
            }
            self.position_rx = Some(position_rx);
            if let Some(message) = failure {
                warn!("position source failed, stopping session: {}", message);
                self.stop();
                return Err(Error::PositionSource(message));
            }
        }
        if let Some(tick_rx) = self.tick_rx.take() {
            for () in tick_rx.try_iter() {
                self.on_tick();
            }
            self.tick_rx = Some(tick_rx);
        }
        Ok(())
    }

    /// Stops tracking, releasing the position subscription and the ticker.
    /// Idempotent; a no-op from `Idle`.
    pub fn stop(&mut self) {
        if self.state != SessionState::Tracking {
            return;
        }
        if let Some(subscription) = self.subscription.take() {
            self.source.unsubscribe(subscription);
        }
        if let Some(handle) = self.ticker_handle.take() {
            self.ticker.stop(handle);
        }
        self.position_rx = None;
        self.tick_rx = None;
        self.stop_time = Some(Utc::now());
        self.state = SessionState::Stopped;
        info!(
            "tracking session stopped: {} points, {:.3} km",
            self.route.len(),
            self.distance_km
        );
    }

    /// Produces the activity record for this session. Valid only once
    /// `Stopped`; the store assigns the id on save. The persisted duration
    /// is wall-clock stop minus start in whole seconds, not the tick count.
    pub fn finalize(&mut self, name: &str, photo_uri: Option<String>) -> Result<NewActivity> {
        if self.state != SessionState::Stopped {
            return Err(Error::NotStopped);
        }
        if self.route.is_empty() {
            return Err(Error::NoRouteData);
        }
        let (Some(start), Some(stop)) = (self.start_time, self.stop_time) else {
            return Err(Error::NotStopped);
        };
        let duration_secs = (stop - start).num_seconds().max(0);
        Ok(NewActivity {
            name: name.to_string(),
            date: start,
            duration_secs,
            distance_km: self.distance_km,
            route: std::mem::take(&mut self.route),
            photo_uri,
        })
    }
}

impl<S: PositionSource, T: Ticker> Drop for TrackingSession<S, T> {
    fn drop(&mut self) {
        self.stop();
    }
}
