mod diff;
mod logger;
mod stdin_reader;

pub use diff::*;
pub use logger::*;
pub use stdin_reader::*;
