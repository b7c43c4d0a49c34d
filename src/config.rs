use std::time::Duration;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_FRAME_MS: u64 = 16;

// Geolocation
pub const GEO_HIGH_ACCURACY: bool = true;
pub const GEO_TIMEOUT: Duration = Duration::from_secs(10);

// Map
pub const MAP_ZOOM: u8 = 16;
pub const TILE_URL: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";
pub const TILE_ATTRIBUTION: &str = "© OpenStreetMap contributors";
pub const NEON: &str = "#0ff";
pub const NEON_CLASS: &str = "neon-marker";
pub const STOP_MARKER_RADIUS: u32 = 10;
pub const VEHICLE_MARKER_RADIUS: u32 = 8;
pub const CONNECTOR_WEIGHT: u32 = 2;
pub const CONNECTOR_OPACITY: f64 = 0.7;
pub const CONNECTOR_DASH: &str = "4 4";

// Animation, in degrees per frame
pub const ARRIVED_THRESHOLD: f64 = 0.00005;
pub const BASE_SPEED: f64 = 0.00005;
pub const SPEED_JITTER: f64 = 0.00003;
pub const STEP_GAIN: f64 = 20.0;

#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: String,
    pub frame_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            frame_interval: Duration::from_millis(DEFAULT_FRAME_MS),
        }
    }
}

impl Config {
    /// Reads `.env` (if present) and the process environment.
    pub fn from_env() -> Self {
        if let Err(e) = dotenv::dotenv() {
            log::debug!("No .env file loaded: {}", e);
        }
        Self::from_vars(
            std::env::var("STOP_FINDER_BACKEND_URL").ok(),
            std::env::var("STOP_FINDER_FRAME_MS").ok(),
        )
    }

    pub fn from_vars(backend_url: Option<String>, frame_ms: Option<String>) -> Self {
        let mut config = Config::default();

        if let Some(url) = backend_url.filter(|u| !u.trim().is_empty()) {
            config.backend_url = url.trim().trim_end_matches('/').to_string();
        }

        if let Some(raw) = frame_ms {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.frame_interval = Duration::from_millis(ms),
                _ => log::warn!(
                    "Ignoring STOP_FINDER_FRAME_MS={:?}, using {} ms",
                    raw,
                    DEFAULT_FRAME_MS
                ),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_vars(None, None);
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.frame_interval, Duration::from_millis(16));
    }

    #[test]
    fn overrides_are_trimmed_and_validated() {
        let config = Config::from_vars(
            Some(" https://paragens.example/ ".to_string()),
            Some("0".to_string()),
        );
        assert_eq!(config.backend_url, "https://paragens.example");
        assert_eq!(config.frame_interval, Duration::from_millis(16));

        let config = Config::from_vars(None, Some("33".to_string()));
        assert_eq!(config.frame_interval, Duration::from_millis(33));
    }
}
