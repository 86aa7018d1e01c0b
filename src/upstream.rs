// Client for the Denizli municipal transit API
//
// Upstream endpoints (relative to the configured base URL):
// - Station bus list:        /StationBusList?stationId=
// - Station route list:      /StationRouteList?stationId=
// - Live vehicle positions:  /LiveBusPositions?routeCode=
// - Route station sequence:  /RouteStations?routeCode=
// - Card balance:            /CardBalance?mifareId= | ?nationalId=
// - Nearby stations:         /NearbyStations?lat=&lng=&count=
// - Nearby dealers:          /NearbyDealers?lat=&lng=&count=
// - Schedule image index:    /BusScheduleImages?lineCode=
// Weather comes from a separate, fully configured URL.

use bytes::Bytes;
use log::{debug, warn};
use reqwest::Client;
use std::future::Future;

use crate::config::AppConfig;
use crate::error::{Result, TransitError};
use crate::models::{self, LiveVehicle, Station};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    StationBuses,
    StationRoutes,
    LiveVehicles,
    RouteStations,
    CardBalance,
    NearbyStations,
    NearbyDealers,
    ScheduleImages,
    Weather,
}

impl Endpoint {
    fn path(self) -> &'static str {
        match self {
            Endpoint::StationBuses => "/StationBusList",
            Endpoint::StationRoutes => "/StationRouteList",
            Endpoint::LiveVehicles => "/LiveBusPositions",
            Endpoint::RouteStations => "/RouteStations",
            Endpoint::CardBalance => "/CardBalance",
            Endpoint::NearbyStations => "/NearbyStations",
            Endpoint::NearbyDealers => "/NearbyDealers",
            Endpoint::ScheduleImages => "/BusScheduleImages",
            Endpoint::Weather => "",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Endpoint::StationBuses => "station buses",
            Endpoint::StationRoutes => "station routes",
            Endpoint::LiveVehicles => "live vehicles",
            Endpoint::RouteStations => "route stations",
            Endpoint::CardBalance => "card balance",
            Endpoint::NearbyStations => "nearby stations",
            Endpoint::NearbyDealers => "nearby dealers",
            Endpoint::ScheduleImages => "schedule images",
            Endpoint::Weather => "weather",
        }
    }
}

/// Source of the two feeds the line tracker reconciles.
pub trait LineSource: Send + Sync + 'static {
    fn fetch_stations(&self, route_code: &str) -> impl Future<Output = Result<Vec<Station>>> + Send;
    fn fetch_vehicles(&self, route_code: &str)
    -> impl Future<Output = Result<Vec<LiveVehicle>>> + Send;
}

#[derive(Debug, Clone)]
pub struct TransitClient {
    client: Client,
    base_url: String,
    weather_url: String,
}

impl TransitClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransitError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.upstream_base_url.trim_end_matches('/').to_string(),
            weather_url: config.weather_url.clone(),
        })
    }

    fn url_for(&self, endpoint: Endpoint) -> String {
        match endpoint {
            Endpoint::Weather => self.weather_url.clone(),
            _ => format!("{}{}", self.base_url, endpoint.path()),
        }
    }

    /// Forwards `params` verbatim and returns the raw upstream JSON body.
    ///
    /// Non-success statuses and bodies that are not JSON are errors; the body
    /// is otherwise returned byte for byte.
    pub async fn relay(&self, endpoint: Endpoint, params: &[(String, String)]) -> Result<Bytes> {
        let url = self.url_for(endpoint);
        debug!("➡️  Forwarding {} request to {}", endpoint.label(), url);

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| {
                TransitError::NetworkError(format!("Failed to fetch {}: {}", endpoint.label(), e))
            })?;

        if !response.status().is_success() {
            warn!("⚠️  Upstream {} returned {}", endpoint.label(), response.status());
            return Err(TransitError::UpstreamStatus(response.status().as_u16()));
        }

        let body = response.bytes().await.map_err(|e| {
            TransitError::NetworkError(format!(
                "Failed to read {} response: {}",
                endpoint.label(),
                e
            ))
        })?;

        serde_json::from_slice::<serde::de::IgnoredAny>(&body).map_err(|e| {
            TransitError::ParseError(format!("Invalid JSON from {}: {}", endpoint.label(), e))
        })?;

        Ok(body)
    }
}

impl LineSource for TransitClient {
    async fn fetch_stations(&self, route_code: &str) -> Result<Vec<Station>> {
        let params = [("routeCode".to_string(), route_code.to_string())];
        let body = self.relay(Endpoint::RouteStations, &params).await?;
        models::parse_stations(&body)
    }

    async fn fetch_vehicles(&self, route_code: &str) -> Result<Vec<LiveVehicle>> {
        let params = [("routeCode".to_string(), route_code.to_string())];
        let body = self.relay(Endpoint::LiveVehicles, &params).await?;
        models::parse_vehicles(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_urls_hang_off_the_base_url() {
        let config = AppConfig {
            upstream_base_url: "http://upstream.test/api/".to_string(),
            weather_url: "http://weather.test/now?city=denizli".to_string(),
            ..AppConfig::default()
        };
        let client = TransitClient::new(&config).unwrap();

        assert_eq!(
            client.url_for(Endpoint::LiveVehicles),
            "http://upstream.test/api/LiveBusPositions"
        );
        assert_eq!(
            client.url_for(Endpoint::Weather),
            "http://weather.test/now?city=denizli"
        );
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_network_error() {
        let config = AppConfig {
            upstream_base_url: "http://127.0.0.1:1".to_string(),
            ..AppConfig::default()
        };
        let client = TransitClient::new(&config).unwrap();

        let err = client.fetch_stations("190_G").await.unwrap_err();
        assert!(matches!(err, TransitError::NetworkError(_)));
    }
}
