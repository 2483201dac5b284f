pub mod error;
pub mod format;
pub mod mesh;
pub mod model;
pub mod util;

pub use error::{DecodeError, Result};
