#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod config;
pub mod name;
pub mod pattern;
pub mod strings;
pub mod summary;
pub mod tags;

pub use config::{Config, ConfigEntry};
pub use name::{NameError, PkgBase, PkgName, PkgPath, PkgVersion};
pub use pattern::{PatternError, PkgPattern, VersionCmp};
pub use strings::{trim, words, words_sep};
pub use summary::{PkgMap, PkgVars, Summary};
pub use tags::{Tag, TagSet};
