pub mod cycle;
pub mod infra;
pub mod notify;
pub mod pipeline;
pub mod scheduling;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
