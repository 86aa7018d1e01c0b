// Transit API proxy server
//
// Every /api route except timeline and qr/resolve forwards its query string to
// the municipal API and relays the JSON as-is, so the browser app never talks
// cross-origin to the upstream.

use actix_cors::Cors;
use actix_files as fs;
use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use chrono::{TimeZone, Utc};
use chrono_tz::Europe::Istanbul;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::AppConfig;
use crate::error::{Result, TransitError};
use crate::models::Direction;
use crate::qr::{self, PayloadError};
use crate::reconciler::{self, TimelineRow};
use crate::upstream::{Endpoint, LineSource, TransitClient};

#[derive(Clone)]
pub struct AppState {
    pub client: TransitClient,
    pub weather_cache_control: String,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            client: TransitClient::new(config)?,
            weather_cache_control: config.weather_cache_control.clone(),
        })
    }
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now().timestamp(),
        }
    }

    fn error(message: String) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now().timestamp(),
        }
    }
}

pub fn format_timestamp_full(timestamp: i64) -> String {
    match Utc.timestamp_opt(timestamp, 0).single() {
        Some(dt) => dt.with_timezone(&Istanbul).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("Invalid timestamp: {}", timestamp),
    }
}

// ============================================================================
// Parameter validation
// ============================================================================

type QueryParams = web::Query<HashMap<String, String>>;

fn required<'a>(params: &'a HashMap<String, String>, name: &'static str) -> Result<&'a str> {
    params
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or(TransitError::MissingParameter(name))
}

fn coordinate(params: &HashMap<String, String>, name: &'static str, limit: f64) -> Result<()> {
    let value = required(params, name)?;
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() && v.abs() <= limit => Ok(()),
        _ => Err(TransitError::InvalidParameter {
            name,
            reason: format!("'{}' is not a valid coordinate", value),
        }),
    }
}

/// Query pairs in a stable order, forwarded untouched.
fn forwarded(params: &HashMap<String, String>) -> Vec<(String, String)> {
    let mut pairs: Vec<_> = params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    pairs.sort();
    pairs
}

async fn relay(
    state: &AppState,
    endpoint: Endpoint,
    params: &HashMap<String, String>,
    cache_control: &str,
) -> Result<HttpResponse> {
    match state.client.relay(endpoint, &forwarded(params)).await {
        Ok(body) => {
            info!("📡 Relayed {} ({} bytes)", endpoint.label(), body.len());
            Ok(HttpResponse::Ok()
                .content_type("application/json")
                .insert_header(("Cache-Control", cache_control.to_string()))
                .body(body))
        }
        Err(e) => {
            error!("❌ {} request failed: {}", endpoint.label(), e);
            Err(e)
        }
    }
}

const NO_STORE: &str = "no-store";

// ============================================================================
// Proxy Endpoints
// ============================================================================

async fn station_buses(state: web::Data<AppState>, query: QueryParams) -> Result<HttpResponse> {
    required(&query, "stationId")?;
    relay(&state, Endpoint::StationBuses, &query, NO_STORE).await
}

async fn station_routes(state: web::Data<AppState>, query: QueryParams) -> Result<HttpResponse> {
    required(&query, "stationId")?;
    relay(&state, Endpoint::StationRoutes, &query, NO_STORE).await
}

async fn line_live(state: web::Data<AppState>, query: QueryParams) -> Result<HttpResponse> {
    required(&query, "routeCode")?;
    relay(&state, Endpoint::LiveVehicles, &query, NO_STORE).await
}

async fn line_stations(state: web::Data<AppState>, query: QueryParams) -> Result<HttpResponse> {
    required(&query, "routeCode")?;
    relay(&state, Endpoint::RouteStations, &query, NO_STORE).await
}

async fn card_balance(state: web::Data<AppState>, query: QueryParams) -> Result<HttpResponse> {
    if required(&query, "mifareId").is_err() {
        required(&query, "nationalId").map_err(|_| TransitError::MissingParameter("mifareId"))?;
    }
    relay(&state, Endpoint::CardBalance, &query, NO_STORE).await
}

async fn nearby_stations(state: web::Data<AppState>, query: QueryParams) -> Result<HttpResponse> {
    validate_nearby(&query)?;
    relay(&state, Endpoint::NearbyStations, &query, NO_STORE).await
}

async fn nearby_dealers(state: web::Data<AppState>, query: QueryParams) -> Result<HttpResponse> {
    validate_nearby(&query)?;
    relay(&state, Endpoint::NearbyDealers, &query, NO_STORE).await
}

fn validate_nearby(params: &HashMap<String, String>) -> Result<()> {
    coordinate(params, "lat", 90.0)?;
    coordinate(params, "lng", 180.0)?;
    if let Some(count) = params.get("count") {
        if count.trim().parse::<u32>().map_or(true, |c| c == 0) {
            return Err(TransitError::InvalidParameter {
                name: "count",
                reason: format!("'{}' is not a positive record count", count),
            });
        }
    }
    Ok(())
}

async fn schedule_images(state: web::Data<AppState>, query: QueryParams) -> Result<HttpResponse> {
    required(&query, "lineCode")?;
    relay(&state, Endpoint::ScheduleImages, &query, NO_STORE).await
}

async fn weather(state: web::Data<AppState>) -> Result<HttpResponse> {
    relay(&state, Endpoint::Weather, &HashMap::new(), &state.weather_cache_control).await
}

// ============================================================================
// Line timeline & QR
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LineTimeline {
    line_code: String,
    direction: Direction,
    route_code: String,
    focus_sequence: Option<i32>,
    /// Vehicles whose last stop is not on this route
    off_route: usize,
    rows: Vec<TimelineRow>,
}

async fn line_timeline(state: web::Data<AppState>, query: QueryParams) -> Result<HttpResponse> {
    let line_code = required(&query, "lineCode")?.to_uppercase();
    let direction = match query.get("direction") {
        Some(raw) => raw.parse::<Direction>()?,
        None => Direction::default(),
    };
    let route_code = direction.route_code(&line_code);

    let (stations, vehicles) = tokio::join!(
        state.client.fetch_stations(&route_code),
        state.client.fetch_vehicles(&route_code),
    );

    let stations = stations.map_err(|e| {
        error!("❌ Stations of {} unavailable: {}", route_code, e);
        e
    })?;
    let vehicles = vehicles.unwrap_or_else(|e| {
        warn!("⚠️  Live vehicles of {} unavailable: {}", route_code, e);
        Vec::new()
    });

    let positions = reconciler::reconcile(&stations, &vehicles);
    let timeline = LineTimeline {
        line_code,
        direction,
        focus_sequence: reconciler::pick_focus_sequence(&positions),
        off_route: positions.iter().filter(|p| !p.is_placed()).count(),
        rows: reconciler::build_timeline(&stations, &positions),
        route_code,
    };

    Ok(HttpResponse::Ok()
        .insert_header(("Cache-Control", NO_STORE))
        .json(ApiResponse::success(timeline)))
}

#[derive(Deserialize)]
struct QrQuery {
    payload: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolvedStation {
    station_id: String,
}

async fn qr_resolve(query: web::Query<QrQuery>) -> Result<HttpResponse> {
    let payload = query
        .payload
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or(TransitError::MissingParameter("payload"))?;

    match qr::extract_station_id(payload) {
        Ok(station_id) => {
            Ok(HttpResponse::Ok().json(ApiResponse::success(ResolvedStation { station_id })))
        }
        Err(err) => {
            let message = match err {
                PayloadError::UnexpectedPrefix => "QR code is not a Denizli smart-stop link",
                PayloadError::MissingStation => "QR code carries no station number",
            };
            info!("🔍 Rejected QR payload: {}", message);
            Ok(HttpResponse::UnprocessableEntity().json(ApiResponse::<()>::error(message.to_string())))
        }
    }
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "Denizli Transit API Proxy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().timestamp(),
    }))
}

// ============================================================================
// Server Setup
// ============================================================================

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check)).service(
        web::scope("/api")
            .route("/station/buses", web::get().to(station_buses))
            .route("/station/routes", web::get().to(station_routes))
            .route("/line/live", web::get().to(line_live))
            .route("/line/stations", web::get().to(line_stations))
            .route("/line/timeline", web::get().to(line_timeline))
            .route("/card/balance", web::get().to(card_balance))
            .route("/nearby/stations", web::get().to(nearby_stations))
            .route("/nearby/dealers", web::get().to(nearby_dealers))
            .route("/schedule/images", web::get().to(schedule_images))
            .route("/weather", web::get().to(weather))
            .route("/qr/resolve", web::get().to(qr_resolve)),
    );
}

pub async fn run_server(config: AppConfig) -> std::io::Result<()> {
    let app_state = AppState::new(&config)
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let static_dir = config.static_dir.clone();

    info!("🚀 Denizli transit proxy listening on http://{}", config.bind_address);
    info!("📡 Upstream: {}", config.upstream_base_url);
    info!("🕒 Started at {}", format_timestamp_full(Utc::now().timestamp()));
    match &static_dir {
        Some(dir) => info!("📱 Serving frontend from {:?}", dir),
        None => info!("📱 No static frontend configured, API only"),
    }

    HttpServer::new(move || {
        let cors = Cors::permissive();

        let app = App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(configure_routes);

        match &static_dir {
            Some(dir) => app.service(fs::Files::new("/", dir).index_file("index.html")),
            None => app,
        }
    })
    .bind(config.bind_address)?
    .run()
    .await
}
