pub mod bridge;
pub mod map;
pub mod model;
