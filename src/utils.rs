//! Helper functions for serial ports, app images and frame dumps.

mod dump;
mod image;
mod ports;

pub(crate) use dump::dump;
pub use dump::format_digest;
pub use image::read_image;
pub(crate) use ports::{detect_port, open_port};
