//! # forge_recovery
//!
//! Failure triage for appforge.
//!
//! [`classify`] turns raw failure text into an [`ErrorClassification`];
//! a [`RecoveryStrategist`] turns that into a [`RecoverySuggestion`] that
//! is either safe to apply unattended or needs approval.
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use forge_recovery::{classify, FixTarget, RecoveryStrategist};
//!
//! let failure = classify("npm ERR! code ERESOLVE");
//! let mut strategist = RecoveryStrategist::default();
//! let fix = strategist.suggest(&failure, &BTreeMap::new()).unwrap();
//! assert_eq!(fix.target, FixTarget::RetryWithFlags);
//! ```

pub mod classifier;
pub mod error;
pub mod patch;
pub mod strategist;

pub use classifier::{classify, extract_file, extract_line, ErrorCategory, ErrorClassification};
pub use error::{RecoveryError, RecoveryResult};
pub use patch::apply_suggestion;
pub use strategist::{
    FixKind, FixTarget, RecoveryStrategist, RecoverySuggestion, DEFAULT_ESM_TARGET,
    DEFAULT_MAX_RETRIES, LEGACY_PEER_DEPS_FLAG,
};
