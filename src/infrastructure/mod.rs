pub mod session;

pub use session::{BrowserConnector, BrowserSession, Locator, SessionGuard};
