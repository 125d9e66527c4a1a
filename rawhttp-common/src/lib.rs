// rawhttp-common - Wire codec, message types and errors shared by the
// rawhttp client and the demo server.

pub mod error;
pub mod protocol;
pub mod types;

// Re-export for convenience
pub use error::*;
pub use protocol::*;
pub use types::*;
