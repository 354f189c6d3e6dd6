//! Client library for the Gantry upload service.
//!
//! Three layers, each usable on its own:
//! - [`api`]: one typed method per HTTP endpoint
//! - [`source`]: chunk-at-a-time reads from a local artifact file
//! - [`transmitter`]: plan selection, batched concurrent sends, retries,
//!   and progress reporting, from session creation through finalize

pub mod api;
pub mod error;
pub mod source;
pub mod transmitter;

pub use api::ApiClient;
pub use error::{ClientError, ClientResult};
pub use source::ArtifactSource;
pub use transmitter::{Transmitter, UploadOptions};
