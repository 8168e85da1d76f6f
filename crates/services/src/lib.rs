#![forbid(unsafe_code)]

pub mod course_services;
pub mod error;
pub mod progress_store;
pub mod retry;

pub use course_core::Clock;

pub use course_services::CourseServices;
pub use error::{CourseServicesError, ProgressStoreError};
pub use progress_store::{ImportReport, ProgressStore, StoreSettings};
pub use retry::RetryPolicy;
