pub mod reconciler;

pub use reconciler::{RetryPolicy, SyncReconciler};
