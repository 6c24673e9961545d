pub mod extraction_ctx;
pub mod extraction_flow;
pub mod stage;

pub use extraction_ctx::{EventSink, ExtractionRequest, RequestRejection};
pub use extraction_flow::{ExtractionFlow, PipelineOutcome};
pub use stage::Stage;
