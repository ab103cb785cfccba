pub mod citations;
pub mod composer;
pub mod pipeline;
pub mod sse;

pub use citations::{CitationAccumulator, CitationPolicy, CitationRecord, ReferenceBlock};
pub use composer::{ComposerPhase, OutputComposer};
pub use pipeline::ResponsePipeline;
pub use sse::{classify_line, LineFramer, SseLine};
