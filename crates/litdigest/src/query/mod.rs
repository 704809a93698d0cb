//! Search expression and coverage window.
//!
//! Both are pure: given the same profile and reference instant they always
//! produce the same output.

mod builder;
mod window;

pub use builder::QueryBuilder;
pub use window::SearchWindow;
