//! Errors raised while decoding records

mod model_error;

pub use model_error::{ModelError, ModelResult};
