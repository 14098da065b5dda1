mod health;
mod sessions;
pub mod sse;

pub use health::*;
pub use sessions::*;
