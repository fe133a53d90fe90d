//! Data Package descriptors
//!
//! Loads, dereferences and validates [Data Package](https://specs.frictionlessdata.io/)
//! descriptors: JSON documents describing a dataset and the resources it is
//! made of.
//!
//! ## Features
//!
//! - **Reference Resolution**: `$ref` JSON References and path/URL strings are
//!   replaced with the documents they point at
//! - **Profile Registry**: profile ids resolve to JSON Schemas through a
//!   registry; the standard profiles are bundled with the crate
//! - **Validation**: descriptors are checked against their profiles, and
//!   whole packages can be checked for data integrity
//! - **Tabular Data**: CSV and inline tables are readable, and CSV files can be
//!   inferred into resource descriptors
//!
//! ## Example
//!
//! ```no_run
//! use datapackage::Package;
//!
//! let package = Package::open("path/to/package")?;
//! for resource in package.resources() {
//!     println!("{:?} valid={}", resource.name(), resource.valid());
//! }
//! # Ok::<(), datapackage::PackageError>(())
//! ```

pub mod archive;
pub mod config;
pub mod defaults;
pub mod error;
pub mod fetch;
pub mod interpreter;
pub mod location;
pub mod package;
pub mod profile;
pub mod reference;
pub mod registry;
pub mod resource;
pub mod table;
pub mod validator;

pub use config::Settings;
pub use error::{
    FetchError, PackageError, ProfileError, ReferenceError, RegistryError, ResourceError, ValidationError,
};
pub use fetch::{DefaultFetcher, Fetch};
pub use interpreter::{Interpreter, TypeAndFormat};
pub use package::{Package, PackageMetadata, PackageOptions};
pub use profile::{Profile, ValidationIssue};
pub use reference::{dereference, Dereferencer};
pub use registry::{ProfileMetadata, Registry};
pub use resource::{Resource, ResourceData, Source, SourceType};
pub use table::Table;
pub use validator::{check, ValidationReport};

/// An ordered descriptor mapping
pub type Descriptor = serde_json::Map<String, serde_json::Value>;
