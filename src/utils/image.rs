//! Loading application images from disk.

use std::fs;

use log::debug;

use crate::error::{PreconditionError, Result};
use crate::protocol::transfer::check_size;

/// Read the app image at `path` and check that the token can take it.
pub fn read_image(path: &str) -> Result<Vec<u8>> {
    let image = fs::read(path).map_err(|source| PreconditionError::Image {
        path: path.to_owned(),
        source,
    })?;
    debug!("`{}`: {} bytes", path, image.len());
    check_size(image.len())?;
    Ok(image)
}

// =============================================================================
// Unit Tests
// =============================================================================
