pub mod config;
pub mod request;
pub mod types;

pub use config::*;
pub use request::*;
pub use types::*;
