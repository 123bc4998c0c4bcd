#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod scoring;
pub mod time;
pub mod unlock;

pub use error::{Error, InvalidStageError};
pub use time::Clock;
