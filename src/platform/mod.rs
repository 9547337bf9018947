//! Host filesystem primitives.
//!
//! - [`reflink`]: copy-on-write clone creation and shared-extent detection

pub mod reflink;

pub use reflink::{
    ensure_supported, is_supported_platform, CloneBackend, CloneUnsupported, ReflinkBackend,
};
