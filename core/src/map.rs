//! Rendering-agnostic map seam. The core never holds map library handles.

use std::sync::Arc;

use crate::interface::Detection;
use crate::prelude::Coordinates;

pub type MapClickHandler = Arc<dyn Fn(Coordinates) + Send + Sync>;

pub trait MapAdapter: Send + Sync {
    fn set_markers(&self, detections: &[Detection]);

    fn set_scan_circle(&self, center: Coordinates, radius_m: u32);

    fn on_map_click(&self, handler: MapClickHandler);
}
