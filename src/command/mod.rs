mod check;
mod pods;
mod version;

pub use check::run_check;
pub use pods::run_pods;
pub use version::run_version;
