pub mod client;
pub mod error;
pub mod types;

pub use client::{ForwardClient, PayloadSender};
pub use error::ForwardError;
pub use types::{ForwardRequest, ForwardResult};
