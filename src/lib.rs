pub mod billing;
pub mod config;
pub mod device;
pub mod echonetlite;
pub mod error;
pub mod skstack;

pub use config::*;
pub use device::*;
pub use error::{Error, Result};
