//! Audio input: device abstraction, cpal backend and level helpers.

pub mod capture;
pub mod device;
pub mod level;

pub use capture::CpalInput;
pub use device::{AudioDevice, InputStream, StreamGuard};
