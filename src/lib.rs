//! Packages local CMSSW releases into relocatable sandboxes.
//!
//! A batch job running on a remote worker needs the software environment of
//! the release it was configured against. `cmssw-sandbox` packs the parts of
//! a local release that a worker needs to rebuild that environment into a
//! single `tar.bz2` archive, named so that repeated submissions against the
//! same release reuse it.
//!
//! # Modules
//!
//! - [`config`]: Configuration system with layered precedence (CLI > env > file > defaults)
//! - [`error`]: Semantic error types for the library
//! - [`sandbox`]: Release discovery, inclusion policy and archive assembly
//! - [`stage`]: Copying packaged sandboxes to where local workers read them

pub mod config;
pub mod error;
pub mod sandbox;
pub mod stage;
