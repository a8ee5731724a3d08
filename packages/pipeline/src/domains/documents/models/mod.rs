pub mod batch;
pub mod document;
pub mod result;

pub use batch::{Batch, BatchStatus, BatchStatusCounts};
pub use document::{Document, DocumentStatus, FileType};
pub use result::{
    AssessmentResult, ParagraphResult, ResultStatus, ResultUpdate, LABEL_AI_GENERATED,
    LABEL_ERROR, LABEL_HUMAN_WRITTEN, LABEL_UNDETERMINED,
};
