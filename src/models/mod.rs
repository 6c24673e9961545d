pub mod event;

pub use event::{EventKind, StageEvent, END_OF_STREAM, LINK_PREFIX};
