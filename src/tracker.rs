// Live line tracking: keeps a reconciled station timeline in sync with the live feed

use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::error::Result;
use crate::models::{Direction, LiveVehicle, Station, VehiclePosition};
use crate::reconciler::{self, TimelineRow};
use crate::upstream::LineSource;

pub const STATIONS_ERROR_MESSAGE: &str = "Could not load the stations of this line";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedRoute {
    pub line_code: String,
    pub direction: Direction,
}

impl SelectedRoute {
    pub fn route_code(&self) -> String {
        self.direction.route_code(&self.line_code)
    }
}

/// What a line view renders. Positions are derived and recomputed on every
/// change to either input.
#[derive(Debug, Clone, Default)]
pub struct LineView {
    route: Option<SelectedRoute>,
    stations: Vec<Station>,
    vehicles: Vec<LiveVehicle>,
    positions: Vec<VehiclePosition>,
    focus_sequence: Option<i32>,
    error: Option<String>,
}

impl LineView {
    pub fn route(&self) -> Option<&SelectedRoute> {
        self.route.as_ref()
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn vehicles(&self) -> &[LiveVehicle] {
        &self.vehicles
    }

    pub fn positions(&self) -> &[VehiclePosition] {
        &self.positions
    }

    pub fn focus_sequence(&self) -> Option<i32> {
        self.focus_sequence
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn timeline(&self) -> Vec<TimelineRow> {
        reconciler::build_timeline(&self.stations, &self.positions)
    }

    fn load(&mut self, route: SelectedRoute, stations: Vec<Station>, vehicles: Vec<LiveVehicle>) {
        self.route = Some(route);
        self.stations = stations;
        self.vehicles = vehicles;
        self.error = None;
        self.recompute();
    }

    fn set_vehicles(&mut self, vehicles: Vec<LiveVehicle>) {
        self.vehicles = vehicles;
        self.recompute();
    }

    fn fail(&mut self, route: SelectedRoute, message: &str) {
        self.route = Some(route);
        self.stations.clear();
        self.vehicles.clear();
        self.error = Some(message.to_string());
        self.recompute();
    }

    fn recompute(&mut self) {
        self.positions = reconciler::reconcile(&self.stations, &self.vehicles);
        self.focus_sequence = reconciler::pick_focus_sequence(&self.positions);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Updated,
    /// A previous refresh was still running
    Skipped,
    /// The refresh failed or its selection is gone; the view is unchanged
    Ignored,
}

struct Shared<S> {
    source: S,
    view: Mutex<LineView>,
    /// Bumped on every selection so late results of an old route are dropped
    generation: AtomicU64,
    in_flight: AtomicBool,
    /// Counts finished refreshes, for callers that render after each one
    refreshed: watch::Sender<u64>,
}

/// Holds the in-flight flag for one refresh; released even if the task is aborted.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<S: LineSource> Shared<S> {
    fn view(&self) -> MutexGuard<'_, LineView> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn refresh_vehicles(&self, route_code: &str, generation: u64) -> PollOutcome {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            warn!("⏳ Live refresh of {} still running, skipping this tick", route_code);
            return PollOutcome::Skipped;
        }

        let result = {
            let _guard = InFlight(&self.in_flight);
            self.source.fetch_vehicles(route_code).await
        };

        let outcome = self.apply(route_code, generation, result);
        self.refreshed.send_modify(|count| *count += 1);
        outcome
    }

    fn apply(
        &self,
        route_code: &str,
        generation: u64,
        result: Result<Vec<LiveVehicle>>,
    ) -> PollOutcome {
        let mut view = self.view();
        if self.generation.load(Ordering::Acquire) != generation || view.error.is_some() {
            info!("🗑️  Dropping live result of {}, selection is no longer current", route_code);
            return PollOutcome::Ignored;
        }

        match result {
            Ok(vehicles) => {
                info!("🚌 {}: {} live vehicles", route_code, vehicles.len());
                view.set_vehicles(vehicles);
                PollOutcome::Updated
            }
            Err(e) => {
                // Keep showing the previous vehicles until a poll succeeds
                warn!("⚠️  Live refresh of {} failed: {}", route_code, e);
                PollOutcome::Ignored
            }
        }
    }
}

/// Tracks one line at a time, polling its live vehicles in the background.
///
/// At most one poll task exists; it is aborted before a new selection loads
/// and when the tracker is dropped.
pub struct LineTracker<S: LineSource> {
    shared: Arc<Shared<S>>,
    poll_interval: Duration,
    poll_task: Option<JoinHandle<()>>,
}

impl<S: LineSource> LineTracker<S> {
    pub fn new(source: S, poll_interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                view: Mutex::new(LineView::default()),
                generation: AtomicU64::new(0),
                in_flight: AtomicBool::new(false),
                refreshed: watch::channel(0).0,
            }),
            poll_interval,
            poll_task: None,
        }
    }

    /// Loads stations and vehicles of a route concurrently, then starts polling.
    ///
    /// On a station failure the view is cleared, polling stays stopped and the
    /// error is returned; a vehicle failure only leaves the markers empty.
    pub async fn select(&mut self, line_code: &str, direction: Direction) -> Result<()> {
        self.stop();
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.in_flight.store(false, Ordering::Release);

        let route = SelectedRoute {
            line_code: line_code.trim().to_uppercase(),
            direction,
        };
        let route_code = route.route_code();
        info!("🔄 Loading line {} ({})", route.line_code, route_code);

        let (stations, vehicles) = tokio::join!(
            self.shared.source.fetch_stations(&route_code),
            self.shared.source.fetch_vehicles(&route_code),
        );

        let stations = match stations {
            Ok(stations) => stations,
            Err(e) => {
                error!("❌ Failed to load stations of {}: {}", route_code, e);
                self.shared.view().fail(route, STATIONS_ERROR_MESSAGE);
                return Err(e);
            }
        };

        let vehicles = vehicles.unwrap_or_else(|e| {
            warn!("⚠️  Initial live fetch of {} failed: {}", route_code, e);
            Vec::new()
        });

        self.shared.view().load(route, stations, vehicles);
        self.start_polling(route_code, generation);
        Ok(())
    }

    /// Reloads the current line in the other direction.
    pub async fn toggle_direction(&mut self) -> Result<()> {
        let current = self.shared.view().route().cloned();
        match current {
            Some(route) => self.select(&route.line_code, route.direction.toggled()).await,
            None => Ok(()),
        }
    }

    /// Runs one live refresh of the current selection right away.
    ///
    /// Nothing is fetched when no line is selected or its stations failed to load.
    pub async fn refresh(&self) -> PollOutcome {
        let route_code = {
            let view = self.shared.view();
            match view.route() {
                Some(route) if view.error().is_none() => route.route_code(),
                _ => return PollOutcome::Ignored,
            }
        };
        let generation = self.shared.generation.load(Ordering::Acquire);
        self.shared.refresh_vehicles(&route_code, generation).await
    }

    pub fn snapshot(&self) -> LineView {
        self.shared.view().clone()
    }

    /// Changes once per finished refresh, whether or not it updated the view.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.refreshed.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        self.poll_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancels the poll task, if any.
    pub fn stop(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }

    fn start_polling(&mut self, route_code: String, generation: u64) {
        let shared = Arc::clone(&self.shared);
        let period = self.poll_interval;

        self.poll_task = Some(tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                shared.refresh_vehicles(&route_code, generation).await;
            }
        }));
    }
}

impl<S: LineSource> Drop for LineTracker<S> {
    fn drop(&mut self) {
        self.stop();
    }
}
