//! Final report formatters.
//!
//! - Text summary for terminals
//! - JSON for automation and scripting
//!
//! ```no_run
//! use cowdupe::actions::DedupExecutor;
//! use cowdupe::duplicates::DuplicateFinder;
//! use cowdupe::error::ExitCode;
//! use cowdupe::output::JsonOutput;
//! use std::path::PathBuf;
//!
//! let finder = DuplicateFinder::with_defaults();
//! let (groups, summary) = finder.find_duplicates(&[PathBuf::from(".")]).unwrap();
//! let report = DedupExecutor::native(Default::default()).execute(groups);
//!
//! let output = JsonOutput::new(&summary, &report, ExitCode::Success);
//! println!("{}", output.to_json_pretty().unwrap());
//! ```

pub mod json;
pub mod text;

pub use json::{JsonOutput, JsonOutputError};
pub use text::write_summary;
