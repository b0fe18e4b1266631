pub mod cert;
pub mod deployment;
pub mod domain;
pub mod project;
pub mod raw_bundle;
