//! File actions module.
//!
//! This module provides functionality for:
//! - Replacing duplicates with copy-on-write clones ([`replace`])
//! - Capturing and restoring per-file metadata ([`attributes`])
//! - Byte-for-byte verification in paranoid mode ([`verify`])
//!
//! ```no_run
//! use cowdupe::actions::replace::{DedupExecutor, ReplaceConfig};
//!
//! let executor = DedupExecutor::native(ReplaceConfig::default().with_dry_run(true));
//! let report = executor.execute(Vec::new());
//! println!("would reclaim {} bytes", report.would_reclaim);
//! ```

pub mod attributes;
pub mod replace;
pub mod verify;

pub use attributes::{AttributeError, FileAttributes};
pub use replace::{
    DedupExecutor, DedupReport, GroupReport, ReplaceConfig, ReplaceError, ReplaceOutcome,
    ReplaceRecord,
};
