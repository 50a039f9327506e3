//! Storage module
//!
//! Resume records and their on-disk lifecycle.

pub mod resume;

pub use resume::{prepare, resume_file_path, PreparedResume, ResumeCleanup, ResumeData, ResumeManager};
