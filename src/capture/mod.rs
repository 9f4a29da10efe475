pub mod http_camera;
pub mod media_source;

pub use http_camera::HttpCameraSource;
pub use media_source::{MediaSource, StillSurface, VideoConstraints};
