pub mod io_core;
pub mod socket;
mod error;
/* low-level plumbing, crate-wide only */
pub(crate) use io_core::IoCore;

/* public types */
pub use error::ClientError;
pub use socket::SocketClient;
