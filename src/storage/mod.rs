pub mod hasher;
pub mod local;
pub mod provider;

pub use hasher::{hash_bytes, hash_reader, ContentHasher, Fingerprint};
pub use local::*;
pub use provider::*;
