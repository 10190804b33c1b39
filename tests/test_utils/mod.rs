use paceline_core::activity::GeoPoint;
use paceline_core::errors::{Error, Result};
use paceline_core::tracking_session::{
    PositionEvent, PositionSource, SubscribeOptions, Ticker, TrackingSession,
};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

pub fn point(latitude: f64, longitude: f64) -> GeoPoint {
    GeoPoint {
        latitude,
        longitude,
    }
}

#[derive(Default)]
struct SourceState {
    permission_granted: bool,
    fail_subscribe: bool,
    subscribes: u32,
    unsubscribes: u32,
    options: Option<SubscribeOptions>,
    events: Option<Sender<PositionEvent>>,
}

/// Shared observer for a `FakePositionSource`, kept by the test while the
/// session owns the source itself.
#[derive(Clone, Default)]
pub struct SourceProbe {
    state: Arc<Mutex<SourceState>>,
}

impl SourceProbe {
    pub fn subscribes(&self) -> u32 {
        self.state.lock().unwrap().subscribes
    }

    pub fn unsubscribes(&self) -> u32 {
        self.state.lock().unwrap().unsubscribes
    }

    pub fn subscribed(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.subscribes > state.unsubscribes
    }

    pub fn options(&self) -> Option<SubscribeOptions> {
        self.state.lock().unwrap().options
    }

    /// Pushes one position fix into the subscribed session's channel.
    pub fn emit(&self, point: GeoPoint) {
        self.send(PositionEvent::Update(point));
    }

    pub fn emit_failure(&self, message: &str) {
        self.send(PositionEvent::Failure(message.to_string()));
    }

    fn send(&self, event: PositionEvent) {
        let state = self.state.lock().unwrap();
        let sender = state.events.as_ref().expect("no active subscription");
        // best effort, the receiver may already be gone after a stop
        let _ = sender.send(event);
    }
}

pub struct FakePositionSource {
    probe: SourceProbe,
}

impl FakePositionSource {
    pub fn new() -> (Self, SourceProbe) {
        Self::with_permission(true)
    }

    pub fn with_permission(granted: bool) -> (Self, SourceProbe) {
        let probe = SourceProbe::default();
        probe.state.lock().unwrap().permission_granted = granted;
        (
            FakePositionSource {
                probe: probe.clone(),
            },
            probe,
        )
    }
}

impl PositionSource for FakePositionSource {
    type Subscription = u32;

    fn request_permission(&mut self) -> bool {
        self.probe.state.lock().unwrap().permission_granted
    }

    fn subscribe(
        &mut self,
        options: &SubscribeOptions,
        events: Sender<PositionEvent>,
    ) -> Result<Self::Subscription> {
        let mut state = self.probe.state.lock().unwrap();
        if state.fail_subscribe {
            return Err(Error::PositionSource("subscribe refused".to_string()));
        }
        state.subscribes += 1;
        state.options = Some(*options);
        state.events = Some(events);
        Ok(state.subscribes)
    }

    fn unsubscribe(&mut self, _subscription: Self::Subscription) {
        let mut state = self.probe.state.lock().unwrap();
        state.unsubscribes += 1;
        state.events = None;
    }
}

#[derive(Default)]
struct TickerState {
    fail_start: bool,
    starts: u32,
    stops: u32,
    period_ms: Option<u64>,
    ticks: Option<Sender<()>>,
}

#[derive(Clone, Default)]
pub struct TickerProbe {
    state: Arc<Mutex<TickerState>>,
}

impl TickerProbe {
    pub fn starts(&self) -> u32 {
        self.state.lock().unwrap().starts
    }

    pub fn stops(&self) -> u32 {
        self.state.lock().unwrap().stops
    }

    pub fn running(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.starts > state.stops
    }

    pub fn period_ms(&self) -> Option<u64> {
        self.state.lock().unwrap().period_ms
    }

    pub fn tick(&self) {
        let state = self.state.lock().unwrap();
        let sender = state.ticks.as_ref().expect("ticker not running");
        let _ = sender.send(());
    }
}

pub struct FakeTicker {
    probe: TickerProbe,
}

impl FakeTicker {
    pub fn new() -> (Self, TickerProbe) {
        let probe = TickerProbe::default();
        (
            FakeTicker {
                probe: probe.clone(),
            },
            probe,
        )
    }

    pub fn failing() -> (Self, TickerProbe) {
        let (ticker, probe) = Self::new();
        probe.state.lock().unwrap().fail_start = true;
        (ticker, probe)
    }
}

impl Ticker for FakeTicker {
    type Handle = u32;

    fn start(&mut self, period_ms: u64, ticks: Sender<()>) -> Result<Self::Handle> {
        let mut state = self.probe.state.lock().unwrap();
        if state.fail_start {
            return Err(Error::PositionSource("ticker refused".to_string()));
        }
        state.starts += 1;
        state.period_ms = Some(period_ms);
        state.ticks = Some(ticks);
        Ok(state.starts)
    }

    fn stop(&mut self, _handle: Self::Handle) {
        let mut state = self.probe.state.lock().unwrap();
        state.stops += 1;
        state.ticks = None;
    }
}

pub type FakeSession = TrackingSession<FakePositionSource, FakeTicker>;

/// A session wired to fakes, with probes for both collaborators.
pub fn session() -> (FakeSession, SourceProbe, TickerProbe) {
    let (source, source_probe) = FakePositionSource::new();
    let (ticker, ticker_probe) = FakeTicker::new();
    (
        TrackingSession::new(source, ticker),
        source_probe,
        ticker_probe,
    )
}
