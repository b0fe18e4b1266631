pub mod cert;
pub mod deployment;
pub mod domain;
pub mod project;
pub mod raw_bundle;

pub use cert::*;
pub use deployment::*;
pub use domain::*;
pub use project::*;
pub use raw_bundle::*;
