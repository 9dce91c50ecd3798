pub mod file;
pub mod post;
pub mod stats;

pub use file::*;
pub use post::*;
pub use stats::*;
