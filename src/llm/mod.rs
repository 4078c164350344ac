pub mod client;
pub mod prompts;
pub mod structurer;
pub mod types;

pub use client::*;
pub use structurer::*;
pub use types::*;
