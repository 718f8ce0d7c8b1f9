//! Explain Module
//!
//! Gắn lý do và detector đóng góp nhiều nhất vào từng kết quả.
//!
//! ## Structure
//! - `types`: AnomalyResult
//! - `engine`: Explanation text, feature reasons, contextual threat score
//!
//! ## Usage
//! ```ignore
//! use crate::logic::explain::explain;
//!
//! let result = explain(&record, features.row(i), fused, &bands);
//! if result.is_flagged() {
//!     println!("{}", result.explanation);
//! }
//! ```

pub mod types;
pub mod engine;

pub use types::AnomalyResult;
pub use engine::{explain, feature_reasons, threat_score};
