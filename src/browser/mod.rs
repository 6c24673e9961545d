pub mod connection;

pub use connection::{endpoint_url, ChromiumConnector, ChromiumSession};
