//! Asset Notary
//!
//! Canonicalizes local assets (files, directories, repositories, container
//! images) into content-addressed artifacts, resolves which notarization
//! record applies to a hash, and drives passphrase-protected signing
//! against a backend.

pub mod backend;
pub mod bundle;
pub mod config;
pub mod error;
pub mod extract;
pub mod logging;
pub mod signing;
pub mod trust;

pub use backend::{LocalLedger, SigningBackend, VerificationBackend};
pub use bundle::{Bundler, Manifest};
pub use error::{NotaryError, Result};
pub use extract::{Artifact, Extractor, Kind};
pub use signing::{SignError, SignIntent, SigningOrchestrator};
pub use trust::{Authenticator, Scope, TrustError, TrustQuery, TrustResolver};
