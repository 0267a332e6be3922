//! # cnn_server
//!
//! HTTP surface for a JPEG binary image classifier:
//!
//! - `GET /ping` reports whether the model can be loaded.
//! - `POST /invocations` scores one `image/jpeg` body and returns the score
//!   as a JSON number.

pub mod config;
pub mod error;
pub mod handlers;
pub mod preprocess;

pub use config::Args;
pub use error::InvocationError;
pub use handlers::{routes, AppState, JPEG_CONTENT_TYPE};
pub use preprocess::{decode_batch, ChannelOrder, ImageSpec, PreprocessError};
