//! Upload strategy selection.
//!
//! Maps an artifact size to an [`UploadPlan`] before any network traffic
//! happens. Small artifacts go up in a single request; mid-size artifacts use
//! narrow, highly parallel chunks to stay under per-request time ceilings;
//! large artifacts trade parallelism for wider chunks to bound connection and
//! memory pressure.

use crate::{MAX_ARTIFACT_BYTES, MAX_DIRECT_BYTES};
use serde::{Deserialize, Serialize};

/// Ceiling for the narrow-chunk tier: 25 MiB.
pub const MID_TIER_BYTES: u64 = 25 * 1024 * 1024;

/// Chunk size for artifacts in (10 MiB, 25 MiB]: 1 MiB.
pub const NARROW_CHUNK_BYTES: u64 = 1024 * 1024;

/// Chunk size for artifacts in (25 MiB, 50 MiB]: 1.5 MiB.
pub const WIDE_CHUNK_BYTES: u64 = 1536 * 1024;

/// Parallelism for the narrow-chunk tier.
pub const NARROW_TIER_PARALLELISM: u32 = 8;

/// Parallelism for the wide-chunk tier.
pub const WIDE_TIER_PARALLELISM: u32 = 6;

/// How an artifact is transferred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMethod {
    /// One request carrying the whole artifact.
    Direct,
    /// Multiple chunk requests with bounded parallelism.
    Chunked,
}

/// The transfer strategy derived from an artifact size.
///
/// Immutable once computed. A `Direct` plan is the degenerate chunked plan:
/// its chunk size equals the artifact size, so the chunk count is exactly 1
/// and the transfer reuses the chunk pipeline end to end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPlan {
    pub method: UploadMethod,
    pub chunk_size_bytes: u64,
    pub parallelism: u32,
    pub max_artifact_bytes: u64,
}

impl UploadPlan {
    /// Number of chunks this plan produces for an artifact of `file_size` bytes.
    ///
    /// Always at least 1, including for empty artifacts.
    pub fn chunk_count(&self, file_size: u64) -> u32 {
        crate::chunk::chunk_count(file_size, self.chunk_size_bytes)
    }

    pub fn is_direct(&self) -> bool {
        self.method == UploadMethod::Direct
    }
}

/// Pick the transfer strategy for an artifact of `file_size_bytes`.
///
/// Fails with [`Error::SizeExceeded`](crate::Error::SizeExceeded) for
/// artifacts over [`MAX_ARTIFACT_BYTES`], before any network call is made.
pub fn plan_for_size(file_size_bytes: u64) -> crate::Result<UploadPlan> {
    if file_size_bytes > MAX_ARTIFACT_BYTES {
        return Err(crate::Error::SizeExceeded {
            size: file_size_bytes,
            max: MAX_ARTIFACT_BYTES,
        });
    }

    let plan = if file_size_bytes <= MAX_DIRECT_BYTES {
        UploadPlan {
            method: UploadMethod::Direct,
            // Floored at one byte so an empty artifact still yields one chunk.
            chunk_size_bytes: file_size_bytes.max(1),
            parallelism: 1,
            max_artifact_bytes: MAX_ARTIFACT_BYTES,
        }
    } else if file_size_bytes <= MID_TIER_BYTES {
        UploadPlan {
            method: UploadMethod::Chunked,
            chunk_size_bytes: NARROW_CHUNK_BYTES,
            parallelism: NARROW_TIER_PARALLELISM,
            max_artifact_bytes: MAX_ARTIFACT_BYTES,
        }
    } else {
        UploadPlan {
            method: UploadMethod::Chunked,
            chunk_size_bytes: WIDE_CHUNK_BYTES,
            parallelism: WIDE_TIER_PARALLELISM,
            max_artifact_bytes: MAX_ARTIFACT_BYTES,
        }
    };

    Ok(plan)
}
