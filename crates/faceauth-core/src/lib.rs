pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use error::{FaceauthError, FaceauthResult};
pub use types::KdfAlgorithm;
