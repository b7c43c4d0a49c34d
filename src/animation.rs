use crate::config::*;
use crate::lock;
use crate::map::{LineId, MapView, MarkerId};
use crate::structs::LatLon;

use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// One vehicle marker drifting toward the chosen stop.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleTarget {
    pub marker: MarkerId,
    pub line: LineId,
    pub target: LatLon,
    pub speed: f64,
}

impl VehicleTarget {
    pub fn new<R: Rng>(marker: MarkerId, line: LineId, target: LatLon, rng: &mut R) -> Self {
        VehicleTarget {
            marker,
            line,
            target,
            speed: BASE_SPEED + rng.gen_range(0.0..SPEED_JITTER),
        }
    }
}

/// Advances every marker that is still outside the arrival threshold.
/// Returns whether any marker moved.
pub fn step_frame<M: MapView + ?Sized>(map: &mut M, targets: &[VehicleTarget]) -> bool {
    let mut moving = false;

    for t in targets {
        let at = match map.marker_position(t.marker) {
            Some(at) => at,
            None => continue,
        };
        let d_lat = t.target.lat - at.lat;
        let d_lon = t.target.lon - at.lon;
        let dist = (d_lat * d_lat + d_lon * d_lon).sqrt();

        if dist > ARRIVED_THRESHOLD {
            moving = true;
            let next = LatLon::new(
                at.lat + d_lat * t.speed * STEP_GAIN,
                at.lon + d_lon * t.speed * STEP_GAIN,
            );
            map.set_marker_position(t.marker, next);
            map.set_line_points(t.line, vec![next, t.target]);
        }
    }

    moving
}

/// Runs frames on `interval` until every marker has arrived. Aborting the
/// returned handle stops the animation.
pub fn spawn_animation<M: MapView>(
    map: Arc<Mutex<M>>,
    targets: Vec<VehicleTarget>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        let mut frames: u64 = 0;

        loop {
            ticker.tick().await;
            frames += 1;

            let moving = {
                let mut map = lock(&map);
                step_frame(&mut *map, &targets)
            };
            if !moving {
                break;
            }
        }

        log::debug!("Animation of {} vehicles done after {} frames", targets.len(), frames);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{LineStyle, MarkerStyle, Scene};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn scene_with_vehicle(from: LatLon, to: LatLon) -> (Scene, VehicleTarget) {
        let mut scene = Scene::new();
        let marker = scene.add_circle_marker(from, MarkerStyle::vehicle());
        let line = scene.add_polyline(vec![from, to], LineStyle::connector());
        let mut rng = StdRng::seed_from_u64(7);
        let target = VehicleTarget::new(marker, line, to, &mut rng);
        (scene, target)
    }

    #[test]
    fn speed_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let t = VehicleTarget::new(MarkerId(1), LineId(2), LatLon::default(), &mut rng);
            assert!(t.speed >= BASE_SPEED && t.speed < BASE_SPEED + SPEED_JITTER);
        }
    }

    #[test]
    fn frame_moves_marker_and_line_toward_stop() {
        let stop = LatLon::new(38.7, -9.1);
        let (mut scene, target) = scene_with_vehicle(LatLon::new(38.71, -9.11), stop);

        assert!(step_frame(&mut scene, &[target.clone()]));

        let at = scene.marker_position(target.marker).unwrap();
        let factor = target.speed * STEP_GAIN;
        assert!((at.lat - (38.71 + (38.7 - 38.71) * factor)).abs() < 1e-12);
        assert!((at.lon - (-9.11 + (-9.1 - -9.11) * factor)).abs() < 1e-12);
        assert_eq!(scene.line(target.line).unwrap().points, vec![at, stop]);
    }

    #[test]
    fn marker_inside_threshold_does_not_move() {
        let stop = LatLon::new(38.7, -9.1);
        let start = LatLon::new(38.7 + ARRIVED_THRESHOLD / 2.0, -9.1);
        let (mut scene, target) = scene_with_vehicle(start, stop);

        assert!(!step_frame(&mut scene, &[target.clone()]));
        assert_eq!(scene.marker_position(target.marker), Some(start));
    }

    #[test]
    fn frames_converge_and_stop() {
        let stop = LatLon::new(38.7, -9.1);
        let (mut scene, target) = scene_with_vehicle(LatLon::new(38.72, -9.13), stop);

        let mut frames = 0;
        while step_frame(&mut scene, &[target.clone()]) {
            frames += 1;
            assert!(frames < 100_000, "animation never settled");
        }

        let at = scene.marker_position(target.marker).unwrap();
        let dist = ((at.lat - stop.lat).powi(2) + (at.lon - stop.lon).powi(2)).sqrt();
        assert!(dist <= ARRIVED_THRESHOLD);
    }

    #[test]
    fn removed_markers_are_skipped() {
        let stop = LatLon::new(38.7, -9.1);
        let (mut scene, target) = scene_with_vehicle(LatLon::new(38.72, -9.13), stop);
        scene.remove_marker(target.marker);

        assert!(!step_frame(&mut scene, &[target]));
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_animation_finishes() {
        let stop = LatLon::new(38.7, -9.1);
        let (scene, target) = scene_with_vehicle(LatLon::new(38.7003, -9.1003), stop);
        let marker = target.marker;
        let map = Arc::new(Mutex::new(scene));

        let handle = spawn_animation(map.clone(), vec![target], Duration::from_millis(16));
        handle.await.unwrap();

        let at = lock(&map).marker_position(marker).unwrap();
        let dist = ((at.lat - stop.lat).powi(2) + (at.lon - stop.lon).powi(2)).sqrt();
        assert!(dist <= ARRIVED_THRESHOLD);
    }
}
