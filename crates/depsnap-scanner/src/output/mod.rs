//! Output formatters for reports

pub mod excerpt;
pub mod json;
pub mod markdown;

pub use excerpt::excerpt;
pub use json::to_json;
pub use markdown::to_markdown;
