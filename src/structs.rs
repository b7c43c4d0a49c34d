use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        LatLon { lat, lon }
    }
}

/// A stop as listed by `/api/nearby_stops`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Stop {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// Distance from the user, in meters
    pub distance_m: f64,
    #[serde(default, deserialize_with = "lenient_ids")]
    pub lines: Option<Vec<String>>,
}

impl Stop {
    pub fn position(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Vehicle {
    #[serde(deserialize_with = "lenient_id")]
    pub vehicle_id: String,
    pub lat: f64,
    pub lon: f64,
    /// Distance to the stop, in meters
    pub distance_m: f64,
    pub eta_minutes: f64,
}

impl Vehicle {
    pub fn position(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScheduledArrival {
    pub eta_minutes: f64,
    #[serde(default)]
    pub eta_seconds: Option<i64>,
}

/// Body of `/api/arrival`, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawArrival")]
pub enum Arrival {
    Realtime { vehicles: Vec<Vehicle> },
    Schedule { scheduled: Vec<ScheduledArrival> },
    Unavailable { kind: String, message: Option<String> },
}

#[derive(Deserialize)]
struct RawArrival {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    vehicles: Option<Vec<Vehicle>>,
    #[serde(default)]
    scheduled: Option<Vec<ScheduledArrival>>,
    #[serde(default)]
    message: Option<String>,
}

impl From<RawArrival> for Arrival {
    fn from(raw: RawArrival) -> Self {
        match raw.kind.as_str() {
            "realtime" => Arrival::Realtime {
                vehicles: raw.vehicles.unwrap_or_default(),
            },
            "schedule" => Arrival::Schedule {
                scheduled: raw.scheduled.unwrap_or_default(),
            },
            _ => Arrival::Unavailable {
                kind: raw.kind,
                message: raw.message,
            },
        }
    }
}

//////////////////////////////////////////////////////////
// Identifiers
//////////////////////////////////////////////////////////
// Upstream ids show up as strings, numbers or null.
fn id_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(id_to_string(value))
}

fn lenient_ids<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?;
    Ok(values.map(|v| v.into_iter().map(id_to_string).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stop_accepts_numeric_ids_and_missing_lines() {
        let stops: Vec<Stop> = serde_json::from_str(
            r#"[
                {"id": 10101, "name": "Alameda", "lat": 38.73, "lon": -9.13, "distance_m": 120},
                {"id": "020202", "name": "Areeiro", "lat": 38.74, "lon": -9.13, "distance_m": 340, "lines": ["1702", 735]}
            ]"#,
        )
        .unwrap();

        assert_eq!(stops[0].id, "10101");
        assert_eq!(stops[0].lines, None);
        assert_eq!(stops[1].id, "020202");
        assert_eq!(stops[1].lines, Some(vec!["1702".to_string(), "735".to_string()]));
        assert_eq!(stops[1].distance_m, 340.0);
    }

    #[test]
    fn arrival_realtime() {
        let arrival: Arrival = serde_json::from_str(
            r#"{"type": "realtime", "stop": {"id": "1"}, "vehicles": [
                {"vehicle_id": "41|1234", "lat": 38.7, "lon": -9.1, "distance_m": 850, "eta_minutes": 2.5}
            ]}"#,
        )
        .unwrap();

        match arrival {
            Arrival::Realtime { vehicles } => {
                assert_eq!(vehicles.len(), 1);
                assert_eq!(vehicles[0].vehicle_id, "41|1234");
                assert_eq!(vehicles[0].eta_minutes, 2.5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn arrival_schedule_keeps_seconds() {
        let arrival: Arrival = serde_json::from_str(
            r#"{"type": "schedule", "scheduled": [{"eta_seconds": 420, "eta_minutes": 7}]}"#,
        )
        .unwrap();

        assert_eq!(
            arrival,
            Arrival::Schedule {
                scheduled: vec![ScheduledArrival { eta_minutes: 7.0, eta_seconds: Some(420) }]
            }
        );
    }

    #[test]
    fn arrival_unknown_type_keeps_message() {
        let arrival: Arrival = serde_json::from_str(
            r#"{"type": "none", "message": "Sem dados em tempo real. Tenta mais tarde."}"#,
        )
        .unwrap();

        assert_eq!(
            arrival,
            Arrival::Unavailable {
                kind: "none".to_string(),
                message: Some("Sem dados em tempo real. Tenta mais tarde.".to_string()),
            }
        );
    }

    #[test]
    fn arrival_without_list_is_empty() {
        let arrival: Arrival = serde_json::from_str(r#"{"type": "realtime"}"#).unwrap();
        assert_eq!(arrival, Arrival::Realtime { vehicles: vec![] });

        let arrival: Arrival = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(arrival, Arrival::Unavailable { kind: String::new(), message: None });
    }
}
