//! Screen-facing call handling.
//!
//! A `CallWrapper` runs one remote operation at a time for its screen,
//! gives a failed 401 one more refresh-and-retry, and turns everything else
//! into a `CallOutcome`. Unrecoverable auth failures log the user out and
//! hand control to the `Navigator`.

pub mod budget;
pub mod outcome;
pub mod wrapper;

pub use budget::RetryBudget;
pub use outcome::CallOutcome;
pub use wrapper::{CallWrapper, Navigator};
