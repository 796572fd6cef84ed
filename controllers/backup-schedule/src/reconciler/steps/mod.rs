//! Steps of the backup-schedule pipeline

pub mod calculate;
pub mod cascade;
pub mod create;
pub mod dependencies;
pub mod finalizer;
pub mod lifecycle;
pub mod next_run;
pub mod retention;
pub mod validate;

pub use calculate::{needs_one_shot_calculation, needs_recurring_calculation, CalculateOneShot, CalculateRecurring};
pub use cascade::CascadeDelete;
pub use create::CreateBackup;
pub use dependencies::{LoadBackups, LoadScope, LoadSource};
pub use finalizer::{EnsureFinalizer, RemoveFinalizer};
pub use lifecycle::{CheckCompletion, CheckSuspended};
pub use next_run::EvaluateNextRun;
pub use retention::DeleteBackups;
pub use validate::{ValidateCron, ValidateWindow};
