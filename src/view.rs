use crate::animation::{spawn_animation, VehicleTarget};
use crate::api::TransitApi;
use crate::config::MAP_ZOOM;
use crate::geo::{locate, GeoError, Geolocator, PositionOptions};
use crate::lock;
use crate::map::{LineId, LineStyle, MapView, MarkerId, MarkerStyle, TileLayer};
use crate::structs::*;

use chrono::{DateTime, Local};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const STATUS_LOCATING: &str = "A obter a tua localização...";
pub const STATUS_GEO_UNSUPPORTED: &str = "Geolocation não suportada";
pub const STATUS_SEARCHING: &str = "A procurar paragens próximas...";
pub const STATUS_STOPS_ERROR: &str = "Erro a obter paragens";
pub const STATUS_NO_STOPS: &str = "Nenhuma paragem encontrada para essa linha nas proximidades.";

pub const ARRIVAL_LOADING: &str = "A obter estimativa...";
pub const ARRIVAL_REQUESTING: &str = "A pedir chegada...";
pub const ARRIVAL_ERROR: &str = "Erro a obter chegada";
pub const ARRIVAL_NO_DATA: &str = "Sem dados disponíveis";
pub const REALTIME_HEADER: &str = "Dados em tempo real — veículos próximos:";
pub const SCHEDULE_HEADER: &str = "Sem veículo em tempo real. Próximos horários (programados):";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanelKind {
    #[default]
    Loading,
    Realtime,
    Schedule,
    Message,
    Error,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArrivalPanel {
    pub visible: bool,
    pub kind: PanelKind,
    pub lines: Vec<String>,
    pub updated_at: Option<DateTime<Local>>,
}

impl ArrivalPanel {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    fn show(&mut self, kind: PanelKind, lines: Vec<String>) {
        self.visible = true;
        self.kind = kind;
        self.lines = lines;
    }
}

#[derive(Debug, Default)]
pub struct ViewState {
    pub status: String,
    pub line: String,
    pub stops: Vec<Stop>,
    pub chosen: Option<Stop>,
    pub panel: ArrivalPanel,
    stop_marker: Option<MarkerId>,
    vehicle_markers: Vec<MarkerId>,
    vehicle_lines: Vec<LineId>,
    stops_seq: u64,
    arrival_seq: u64,
    animation: Option<JoinHandle<()>>,
}

impl ViewState {
    fn stop_animation(&mut self) {
        if let Some(handle) = self.animation.take() {
            handle.abort();
        }
    }

    pub fn is_animating(&self) -> bool {
        self.animation.as_ref().map_or(false, |h| !h.is_finished())
    }
}

/// Outcome of a stop search, for the surface to render.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Found(Vec<Stop>),
    Empty,
    Failed,
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrivalOutcome {
    Shown(ArrivalPanel),
    NoStopChosen,
    Superseded,
}

/// Owns the view state, the map and the backend.
pub struct StopFinder<A, M> {
    api: A,
    map: Arc<Mutex<M>>,
    state: Mutex<ViewState>,
    frame_interval: Duration,
}

impl<A: TransitApi, M: MapView> StopFinder<A, M> {
    pub fn new(api: A, map: M, frame_interval: Duration) -> Self {
        StopFinder {
            api,
            map: Arc::new(Mutex::new(map)),
            state: Mutex::new(ViewState::default()),
            frame_interval,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn map(&self) -> &Arc<Mutex<M>> {
        &self.map
    }

    /// Runs `f` against the current state.
    pub fn with_state<R>(&self, f: impl FnOnce(&ViewState) -> R) -> R {
        f(&lock(&self.state))
    }

    pub fn set_line(&self, line: &str) {
        lock(&self.state).line = line.trim().to_string();
    }

    //////////////////////////////////////////////////////////
    // Location & stop search
    //////////////////////////////////////////////////////////
    pub async fn find_stops<G: Geolocator + ?Sized>(&self, geo: &G) -> SearchOutcome {
        let seq = {
            let mut state = lock(&self.state);
            state.stops_seq += 1;
            state.status = STATUS_LOCATING.to_string();
            state.panel.visible = false;
            state.stops.clear();
            state.stops_seq
        };

        let position = locate(geo, PositionOptions::default()).await;

        let line = {
            let mut state = lock(&self.state);
            if state.stops_seq != seq {
                log::debug!("Dropping geolocation result of superseded search {}", seq);
                return SearchOutcome::Superseded;
            }
            match position {
                Ok(_) => state.status = STATUS_SEARCHING.to_string(),
                Err(GeoError::Unsupported) => {
                    state.status = STATUS_GEO_UNSUPPORTED.to_string();
                    return SearchOutcome::Failed;
                }
                Err(ref e) => {
                    log::warn!("Geolocation failed: {}", e);
                    state.status = format!("Não foi possível obter localização: {}", e);
                    return SearchOutcome::Failed;
                }
            }
            state.line.clone()
        };
        let at = match position {
            Ok(at) => at,
            Err(_) => return SearchOutcome::Failed,
        };

        log::info!("Searching stops near {:.5}, {:.5} (line {:?})", at.lat, at.lon, line);
        let result = self.api.nearby_stops(at, &line).await;

        let mut state = lock(&self.state);
        if state.stops_seq != seq {
            log::debug!("Dropping stale stop search {}", seq);
            return SearchOutcome::Superseded;
        }

        match result {
            Err(e) => {
                log::warn!("Stop search failed: {}", e);
                state.status = STATUS_STOPS_ERROR.to_string();
                SearchOutcome::Failed
            }
            Ok(stops) if stops.is_empty() => {
                state.status = STATUS_NO_STOPS.to_string();
                SearchOutcome::Empty
            }
            Ok(stops) => {
                state.status = format!("Encontradas {} paragens.", stops.len());
                state.stops = stops.clone();
                SearchOutcome::Found(stops)
            }
        }
    }

    //////////////////////////////////////////////////////////
    // Stop selection
    //////////////////////////////////////////////////////////
    /// Selects one of the listed stops by id. Returns `None` when the id is
    /// not in the current list.
    pub async fn choose_stop_by_id(&self, stop_id: &str) -> Option<ArrivalOutcome> {
        let stop = {
            let state = lock(&self.state);
            state.stops.iter().find(|s| s.id == stop_id).cloned()
        };
        match stop {
            Some(stop) => Some(self.choose_stop(stop).await),
            None => {
                log::warn!("Stop {:?} is not in the current list", stop_id);
                None
            }
        }
    }

    pub async fn choose_stop(&self, stop: Stop) -> ArrivalOutcome {
        log::info!("Chose stop {} ({})", stop.name, stop.id);
        let center = stop.position();
        {
            let mut state = lock(&self.state);
            state.stop_animation();
            state.panel.show(PanelKind::Loading, vec![ARRIVAL_LOADING.to_string()]);

            let mut map = lock(&self.map);
            if map.is_initialized() {
                map.set_view(center, MAP_ZOOM);
            } else {
                map.init(center, MAP_ZOOM, TileLayer::default());
            }
            clear_vehicles(&mut *map, &mut state);
            if let Some(old) = state.stop_marker.take() {
                map.remove_marker(old);
            }
            state.stop_marker = Some(map.add_circle_marker(center, MarkerStyle::stop()));
            state.chosen = Some(stop);
        }
        self.fetch_arrival().await
    }

    //////////////////////////////////////////////////////////
    // Arrival
    //////////////////////////////////////////////////////////
    /// Queries arrivals for the chosen stop. Also serves as the manual refresh.
    pub async fn fetch_arrival(&self) -> ArrivalOutcome {
        let (seq, stop_id, line) = {
            let mut state = lock(&self.state);
            let stop_id = match &state.chosen {
                Some(stop) => stop.id.clone(),
                None => return ArrivalOutcome::NoStopChosen,
            };
            state.arrival_seq += 1;
            state.panel.show(PanelKind::Loading, vec![ARRIVAL_REQUESTING.to_string()]);
            (state.arrival_seq, stop_id, state.line.clone())
        };

        log::debug!("Arrival request {} for stop {} (line {:?})", seq, stop_id, line);
        let result = self.api.arrival(&stop_id, &line).await;

        let mut state = lock(&self.state);
        if state.arrival_seq != seq {
            log::debug!("Dropping stale arrival response {}", seq);
            return ArrivalOutcome::Superseded;
        }

        match result {
            Err(e) => {
                log::warn!("Arrival request for {} failed: {}", stop_id, e);
                state.panel.show(PanelKind::Error, vec![ARRIVAL_ERROR.to_string()]);
            }
            Ok(Arrival::Realtime { vehicles }) => {
                let mut lines = vec![REALTIME_HEADER.to_string()];
                lines.extend(vehicles.iter().map(render_vehicle));
                state.panel.show(PanelKind::Realtime, lines);
                self.redraw_vehicles(&mut state, &vehicles);
            }
            Ok(Arrival::Schedule { scheduled }) => {
                let mut lines = vec![SCHEDULE_HEADER.to_string()];
                lines.extend(scheduled.iter().map(render_scheduled));
                state.panel.show(PanelKind::Schedule, lines);
            }
            Ok(Arrival::Unavailable { kind, message }) => {
                log::info!("No arrival data for {} (type {:?})", stop_id, kind);
                let text = message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| ARRIVAL_NO_DATA.to_string());
                state.panel.show(PanelKind::Message, vec![text]);
            }
        }
        state.panel.updated_at = Some(Local::now());

        ArrivalOutcome::Shown(state.panel.clone())
    }

    /// Replaces the vehicle layer and restarts the animation.
    fn redraw_vehicles(&self, state: &mut ViewState, vehicles: &[Vehicle]) {
        let target = match &state.chosen {
            Some(stop) => stop.position(),
            None => return,
        };
        state.stop_animation();

        let mut targets = Vec::with_capacity(vehicles.len());
        {
            let mut map = lock(&self.map);
            clear_vehicles(&mut *map, state);

            let mut rng = rand::thread_rng();
            for v in vehicles {
                let marker = map.add_circle_marker(v.position(), MarkerStyle::vehicle());
                let line = map.add_polyline(vec![v.position(), target], LineStyle::connector());
                state.vehicle_markers.push(marker);
                state.vehicle_lines.push(line);
                targets.push(VehicleTarget::new(marker, line, target, &mut rng));
            }
        }

        if !targets.is_empty() {
            state.animation = Some(spawn_animation(self.map.clone(), targets, self.frame_interval));
        }
    }

    /// Stops the animation and forgets the selection.
    pub fn cancel(&self) {
        let mut state = lock(&self.state);
        state.stop_animation();
        state.arrival_seq += 1;
        state.stops_seq += 1;
        state.chosen = None;
        state.panel = ArrivalPanel::default();
    }
}

fn clear_vehicles<M: MapView + ?Sized>(map: &mut M, state: &mut ViewState) {
    for marker in state.vehicle_markers.drain(..) {
        map.remove_marker(marker);
    }
    for line in state.vehicle_lines.drain(..) {
        map.remove_line(line);
    }
}

//////////////////////////////////////////////////////////
// Text
//////////////////////////////////////////////////////////
pub fn render_stop(stop: &Stop) -> String {
    let lines = match &stop.lines {
        Some(lines) => lines.join(", "),
        None => "—".to_string(),
    };
    format!("{} — {} m — linhas: {}", stop.name, stop.distance_m, lines)
}

pub fn render_vehicle(v: &Vehicle) -> String {
    format!("Veículo {} — {} m — ETA {} min", v.vehicle_id, v.distance_m, v.eta_minutes)
}

pub fn render_scheduled(s: &ScheduledArrival) -> String {
    format!("ETA {} min", s.eta_minutes)
}
