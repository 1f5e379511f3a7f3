pub mod binaries;
pub mod image;
pub mod labels;
pub mod project;
pub mod scripts;
pub mod util;

pub use binaries::*;
pub use image::*;
pub use labels::*;
pub use project::*;
pub use scripts::*;
pub use util::*;
