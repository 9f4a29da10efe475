pub mod encoded_image;
pub mod frame_encoder;

pub use encoded_image::EncodedImage;
pub use frame_encoder::FrameEncoder;
