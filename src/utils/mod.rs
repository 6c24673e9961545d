pub mod logging;

pub use logging::{single_line, truncate_text};
