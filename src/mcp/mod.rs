pub mod codec;
pub mod process;
pub mod session;
pub mod stdio;
pub mod transport;
