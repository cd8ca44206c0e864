pub mod error;
pub mod payload;


pub use error::{Result, WordTreeError};
pub use payload::Payload;
