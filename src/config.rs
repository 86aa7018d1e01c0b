// Server and client configuration, read from the environment (and `.env` when present)

use log::warn;
use std::fmt::{Debug, Display};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://ulasim.denizli.bel.tr/api";
pub const DEFAULT_WEATHER_URL: &str = "https://api.open-meteo.com/v1/forecast?latitude=37.7765&longitude=29.0864&current_weather=true";
pub const DEFAULT_WEATHER_CACHE_CONTROL: &str = "public, max-age=300, stale-while-revalidate=60";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the proxy listens on, something like 0.0.0.0:8080
    pub bind_address: SocketAddr,
    /// Base URL of the municipal transit API, without trailing slash
    pub upstream_base_url: String,
    /// Full URL of the weather snapshot, query included
    pub weather_url: String,
    pub request_timeout: Duration,
    /// Interval between two live vehicle refreshes of a tracked line
    pub poll_interval: Duration,
    pub weather_cache_control: String,
    /// Prebuilt frontend to serve at `/`, if any
    pub static_dir: Option<PathBuf>,
    /// Where recent stations, cards and lines are kept by the CLI
    pub history_path: PathBuf,
}

pub fn default_bind_address() -> SocketAddr {
    ([0, 0, 0, 0], 8080).into()
}

pub fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

pub fn default_poll_interval() -> Duration {
    Duration::from_millis(40_000)
}

pub fn default_history_path() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("denizli_transit");
    path.push("history.json");
    path
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            upstream_base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            weather_url: DEFAULT_WEATHER_URL.to_string(),
            request_timeout: default_request_timeout(),
            poll_interval: default_poll_interval(),
            weather_cache_control: DEFAULT_WEATHER_CACHE_CONTROL.to_string(),
            static_dir: None,
            history_path: default_history_path(),
        }
    }
}

impl AppConfig {
    pub fn new_from_env_vars() -> Self {
        // A missing .env file is the normal case in production
        let _ = dotenv::dotenv();

        let defaults = Self::default();
        let parse_secs = |s: &str| s.parse::<u64>().map(Duration::from_secs);
        let parse_millis = |s: &str| s.parse::<u64>().map(Duration::from_millis);

        Self {
            bind_address: parse_env_var("TRANSIT_BIND_ADDRESS", defaults.bind_address, |s| {
                s.parse::<SocketAddr>()
            }),
            upstream_base_url: parse_env_var(
                "TRANSIT_UPSTREAM_BASE_URL",
                defaults.upstream_base_url,
                parse_url,
            ),
            weather_url: parse_env_var("TRANSIT_WEATHER_URL", defaults.weather_url, parse_url),
            request_timeout: parse_env_var(
                "TRANSIT_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout,
                parse_secs,
            ),
            poll_interval: parse_env_var(
                "TRANSIT_POLL_INTERVAL_MS",
                defaults.poll_interval,
                parse_millis,
            ),
            weather_cache_control: parse_env_var(
                "TRANSIT_WEATHER_CACHE_CONTROL",
                defaults.weather_cache_control,
                |s| Ok::<_, String>(s.to_string()),
            ),
            static_dir: parse_env_var("TRANSIT_STATIC_DIR", defaults.static_dir, |s| {
                Ok::<_, String>(Some(PathBuf::from(s)))
            }),
            history_path: parse_env_var("TRANSIT_HISTORY_PATH", defaults.history_path, |s| {
                Ok::<_, String>(PathBuf::from(s))
            }),
        }
    }
}

fn parse_url(s: &str) -> Result<String, String> {
    let trimmed = s.trim().trim_end_matches('/');
    reqwest::Url::parse(trimmed)
        .map(|_| trimmed.to_string())
        .map_err(|e| e.to_string())
}

/// Reads `name` through `parse`; an unset, non-UTF-8 or unparsable value keeps `default`.
pub fn parse_env_var<T, E>(name: &str, default: T, parse: impl Fn(&str) -> Result<T, E>) -> T
where
    T: Debug,
    E: Display,
{
    let Ok(raw) = std::env::var(name) else {
        return default;
    };
    match parse(raw.trim()) {
        Ok(value) => value,
        Err(e) => {
            warn!("⚠️  Ignoring {}={:?} ({}), keeping {:?}", name, raw, e, default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparsable_value_falls_back_to_default() {
        // Env var names are unique to this test so parallel tests don't race
        unsafe { std::env::set_var("TRANSIT_TEST_BAD_TIMEOUT", "soon") };
        let value = parse_env_var("TRANSIT_TEST_BAD_TIMEOUT", Duration::from_secs(30), |s| {
            s.parse::<u64>().map(Duration::from_secs)
        });
        assert_eq!(value, Duration::from_secs(30));
    }

    #[test]
    fn present_value_is_parsed() {
        unsafe { std::env::set_var("TRANSIT_TEST_GOOD_URL", "http://127.0.0.1:9000/api/") };
        let value = parse_env_var("TRANSIT_TEST_GOOD_URL", String::new(), parse_url);
        assert_eq!(value, "http://127.0.0.1:9000/api");
    }

    #[test]
    fn unset_value_keeps_default() {
        let value = parse_env_var("TRANSIT_TEST_NEVER_SET", 7u64, |s| s.parse::<u64>());
        assert_eq!(value, 7);
    }

    #[test]
    fn poll_interval_defaults_to_forty_seconds() {
        assert_eq!(AppConfig::default().poll_interval, Duration::from_millis(40_000));
    }
}
