//! Module extraction from archive layers.
//!
//! Archive layers are gzip-compressed tarballs unpacked into a cache
//! entry's staging directory. Layers are applied in manifest order, so a
//! later layer overrides files from an earlier one.

use flate2::read::GzDecoder;
use std::path::Path;
use tar::Archive;
use tracing::{debug, trace};

use crate::error::{CacheError, Result};

/// Unpack a tar+gzip layer into `dest`.
///
/// Entries that would land outside `dest` (absolute paths, `..`
/// components) are skipped. Returns the number of entries unpacked.
pub fn unpack_layer(data: &[u8], dest: &Path) -> Result<usize> {
    let mut archive = Archive::new(GzDecoder::new(data));
    let entries = archive
        .entries()
        .map_err(|e| CacheError::io(e, dest, "read archive"))?;

    let mut unpacked = 0;
    for entry in entries {
        let mut entry = entry.map_err(|e| CacheError::io(e, dest, "read archive entry"))?;
        let path = entry
            .path()
            .map_err(|e| CacheError::io(e, dest, "read archive entry path"))?
            .into_owned();

        if entry
            .unpack_in(dest)
            .map_err(|e| CacheError::io(e, dest.join(&path), "unpack"))?
        {
            trace!(?path, "Unpacked layer entry");
            unpacked += 1;
        } else {
            debug!(?path, "Skipped layer entry outside the module directory");
        }
    }

    debug!(?dest, unpacked, "Unpacked layer");
    Ok(unpacked)
}
