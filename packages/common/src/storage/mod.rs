mod error;
mod traits;

pub mod local;
#[cfg(feature = "object-storage")]
pub mod s3;

pub use error::StorageError;
pub use local::LocalStore;
#[cfg(feature = "object-storage")]
pub use s3::{S3Settings, S3Store};
pub use traits::ObjectStore;

/// Directory prefix under which user uploads are stored.
pub const UPLOAD_DIR: &str = "uploads";
