#[cfg(feature = "image-host")]
pub mod image;

#[cfg(feature = "image-host")]
pub use image::{ImageArch, ImageHost};
