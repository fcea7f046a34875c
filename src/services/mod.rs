//! Service layer: file I/O and debug dump hooks kept apart from segmentation

pub mod debug;
pub mod io;

pub use debug::{DebugSink, DirectoryDebugSink, NoOpDebugSink};
pub use io::ImageIOService;
