use std::sync::{PoisonError, RwLock};

use log::debug;
use minercore::map::{MapAdapter, MapClickHandler};
use minercore::prelude::Coordinates;
use minercore::Detection;

use crate::api_bridge::model::{MapView, Marker, ScanCircle};

/// Headless map: keeps the drawable state in memory for the HTTP bridge to serve.
#[derive(Default)]
pub struct FieldMap {
    view: RwLock<MapView>,
    handlers: RwLock<Vec<MapClickHandler>>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> MapView {
        self.view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Simulate the operator clicking the map.
    pub fn click(&self, at: Coordinates) {
        self.view
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .selected = Some(at);
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in handlers {
            handler(at);
        }
    }
}

impl MapAdapter for FieldMap {
    fn set_markers(&self, detections: &[Detection]) {
        let markers: Vec<Marker> = detections.iter().map(Marker::from).collect();
        debug!("map now shows {} markers", markers.len());
        self.view
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .markers = markers;
    }

    fn set_scan_circle(&self, center: Coordinates, radius_m: u32) {
        self.view
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .scan_circle = Some(ScanCircle { center, radius_m });
    }

    fn on_map_click(&self, handler: MapClickHandler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn click_reaches_every_handler_and_marks_selection() {
        let map = FieldMap::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..2 {
            let seen = seen.clone();
            map.on_map_click(Arc::new(move |at| seen.lock().unwrap().push(at)));
        }
        let at = Coordinates::new(33.64, 46.42);
        map.click(at);
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(map.view().selected, Some(at));
    }

    #[test]
    fn scan_circle_replaces_previous_area() {
        let map = FieldMap::new();
        map.set_scan_circle(Coordinates::new(1.0, 2.0), 500);
        map.set_scan_circle(Coordinates::new(3.0, 4.0), 750);
        let circle = map.view().scan_circle.unwrap();
        assert_eq!(circle.radius_m, 750);
        assert_eq!(circle.center, Coordinates::new(3.0, 4.0));
        assert!(map.view().markers.is_empty());
    }
}
