//! Transactional installation of portable applications.
//!
//! An archive is extracted with [`lodge_archive`], the most plausible main
//! executable is picked by a heuristic scorer, and a launcher script plus
//! desktop integration is written around it. Every step registers a
//! compensating action, so a failed install leaves nothing behind.
//!
//! # Architecture
//!
//! - `select/` - Candidate discovery and executable scoring
//! - `transaction.rs` - LIFO compensating-action log
//! - `effects.rs` - Package manager and desktop collaborators
//! - `installer.rs` - The orchestrator tying it together

pub mod effects;
pub mod error;
pub mod installer;
pub mod select;
pub mod transaction;

pub use effects::{
    DesktopEntry, DesktopIntegration, PackageConverter, PackageManager, XdgDesktop, exec_arg,
};
pub use error::{
    BoxError, InstallError, RollbackCause, RollbackError, RollbackFailure, SelectError,
};
pub use installer::{InstallLayout, InstallReceipt, Installer, PackageReceipt, app_id};
pub use select::{
    ExecutableCandidate, choose_best, find_candidates, name_variants, score_executable,
};
pub use transaction::Transaction;
