use crate::config::*;
use crate::structs::LatLon;

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct TileLayer {
    pub url_template: String,
    pub attribution: String,
}

impl Default for TileLayer {
    fn default() -> Self {
        TileLayer {
            url_template: TILE_URL.to_string(),
            attribution: TILE_ATTRIBUTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerStyle {
    pub radius: u32,
    pub color: String,
    pub fill_color: String,
    pub fill_opacity: f64,
    pub class_name: String,
}

impl MarkerStyle {
    pub fn neon(radius: u32) -> Self {
        MarkerStyle {
            radius,
            color: NEON.to_string(),
            fill_color: NEON.to_string(),
            fill_opacity: 1.0,
            class_name: NEON_CLASS.to_string(),
        }
    }

    pub fn stop() -> Self {
        Self::neon(STOP_MARKER_RADIUS)
    }

    pub fn vehicle() -> Self {
        Self::neon(VEHICLE_MARKER_RADIUS)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineStyle {
    pub color: String,
    pub weight: u32,
    pub opacity: f64,
    pub dash_array: Option<String>,
}

impl LineStyle {
    /// Dashed vehicle-to-stop connector.
    pub fn connector() -> Self {
        LineStyle {
            color: NEON.to_string(),
            weight: CONNECTOR_WEIGHT,
            opacity: CONNECTOR_OPACITY,
            dash_array: Some(CONNECTOR_DASH.to_string()),
        }
    }
}

/// The operations the view needs from a map widget.
pub trait MapView: Send + 'static {
    fn is_initialized(&self) -> bool;
    fn init(&mut self, center: LatLon, zoom: u8, tiles: TileLayer);
    fn set_view(&mut self, center: LatLon, zoom: u8);

    fn add_circle_marker(&mut self, at: LatLon, style: MarkerStyle) -> MarkerId;
    fn marker_position(&self, id: MarkerId) -> Option<LatLon>;
    fn set_marker_position(&mut self, id: MarkerId, at: LatLon);
    fn remove_marker(&mut self, id: MarkerId);

    fn add_polyline(&mut self, points: Vec<LatLon>, style: LineStyle) -> LineId;
    fn set_line_points(&mut self, id: LineId, points: Vec<LatLon>);
    fn remove_line(&mut self, id: LineId);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub at: LatLon,
    pub style: MarkerStyle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    pub points: Vec<LatLon>,
    pub style: LineStyle,
}

/// In-memory map: keeps every layer so it can be inspected or described.
#[derive(Debug, Default)]
pub struct Scene {
    tiles: Option<TileLayer>,
    center: Option<LatLon>,
    zoom: u8,
    next_id: u64,
    markers: BTreeMap<MarkerId, Marker>,
    lines: BTreeMap<LineId, Polyline>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn center(&self) -> Option<LatLon> {
        self.center
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn tiles(&self) -> Option<&TileLayer> {
        self.tiles.as_ref()
    }

    pub fn marker(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.get(&id)
    }

    pub fn line(&self, id: LineId) -> Option<&Polyline> {
        self.lines.get(&id)
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Plain-text description of the current layers.
    pub fn describe(&self) -> String {
        let center = match self.center {
            Some(c) => c,
            None => return "Mapa ainda não iniciado.".to_string(),
        };

        let mut out = format!(
            "Mapa centrado em {:.5}, {:.5} (zoom {})",
            center.lat, center.lon, self.zoom
        );
        for marker in self.markers.values() {
            let kind = if marker.style.radius == STOP_MARKER_RADIUS {
                "paragem"
            } else {
                "veículo"
            };
            out.push_str(&format!(
                "\n• {} em {:.5}, {:.5}",
                kind, marker.at.lat, marker.at.lon
            ));
        }
        if let Some(tiles) = &self.tiles {
            out.push_str(&format!("\n{}", tiles.attribution));
        }
        out
    }
}

impl MapView for Scene {
    fn is_initialized(&self) -> bool {
        self.tiles.is_some()
    }

    fn init(&mut self, center: LatLon, zoom: u8, tiles: TileLayer) {
        self.tiles = Some(tiles);
        self.set_view(center, zoom);
    }

    fn set_view(&mut self, center: LatLon, zoom: u8) {
        self.center = Some(center);
        self.zoom = zoom;
    }

    fn add_circle_marker(&mut self, at: LatLon, style: MarkerStyle) -> MarkerId {
        let id = MarkerId(self.next());
        self.markers.insert(id, Marker { at, style });
        id
    }

    fn marker_position(&self, id: MarkerId) -> Option<LatLon> {
        self.markers.get(&id).map(|m| m.at)
    }

    fn set_marker_position(&mut self, id: MarkerId, at: LatLon) {
        if let Some(marker) = self.markers.get_mut(&id) {
            marker.at = at;
        }
    }

    fn remove_marker(&mut self, id: MarkerId) {
        self.markers.remove(&id);
    }

    fn add_polyline(&mut self, points: Vec<LatLon>, style: LineStyle) -> LineId {
        let id = LineId(self.next());
        self.lines.insert(id, Polyline { points, style });
        id
    }

    fn set_line_points(&mut self, id: LineId, points: Vec<LatLon>) {
        if let Some(line) = self.lines.get_mut(&id) {
            line.points = points;
        }
    }

    fn remove_line(&mut self, id: LineId) {
        self.lines.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_then_recenter() {
        let mut scene = Scene::new();
        assert!(!scene.is_initialized());
        assert_eq!(scene.describe(), "Mapa ainda não iniciado.");

        scene.init(LatLon::new(38.7, -9.1), MAP_ZOOM, TileLayer::default());
        scene.set_view(LatLon::new(38.8, -9.2), MAP_ZOOM);

        assert!(scene.is_initialized());
        assert_eq!(scene.center(), Some(LatLon::new(38.8, -9.2)));
        assert_eq!(scene.zoom(), 16);
        assert_eq!(scene.tiles().unwrap().url_template, TILE_URL);
    }

    #[test]
    fn markers_and_lines_have_distinct_ids() {
        let mut scene = Scene::new();
        let m = scene.add_circle_marker(LatLon::new(1.0, 1.0), MarkerStyle::vehicle());
        let l = scene.add_polyline(
            vec![LatLon::new(1.0, 1.0), LatLon::new(2.0, 2.0)],
            LineStyle::connector(),
        );
        assert_ne!(m.0, l.0);

        scene.set_marker_position(m, LatLon::new(1.5, 1.5));
        assert_eq!(scene.marker_position(m), Some(LatLon::new(1.5, 1.5)));

        scene.remove_marker(m);
        scene.remove_line(l);
        scene.set_marker_position(m, LatLon::new(3.0, 3.0));
        assert_eq!(scene.marker_position(m), None);
        assert_eq!(scene.marker_count(), 0);
        assert_eq!(scene.line_count(), 0);
    }

    #[test]
    fn describe_lists_markers() {
        let mut scene = Scene::new();
        scene.init(LatLon::new(38.7, -9.1), MAP_ZOOM, TileLayer::default());
        scene.add_circle_marker(LatLon::new(38.7, -9.1), MarkerStyle::stop());
        scene.add_circle_marker(LatLon::new(38.71, -9.11), MarkerStyle::vehicle());

        let text = scene.describe();
        assert!(text.starts_with("Mapa centrado em 38.70000, -9.10000 (zoom 16)"));
        assert!(text.contains("• paragem em 38.70000, -9.10000"));
        assert!(text.contains("• veículo em 38.71000, -9.11000"));
        assert!(text.ends_with(TILE_ATTRIBUTION));
    }
}
