pub mod calendar;
pub mod customer;
pub mod document;
pub mod failure;
pub mod mapping;
pub mod queue;
pub mod result;

pub use calendar::{DeliveryCalendar, InvoiceDates};
pub use customer::{BranchIdentifier, Customer, VatConfig};
pub use document::{ExtractedLine, RawLine};
pub use failure::{FailureType, NewParsingFailure, ParsingFailure};
pub use mapping::ProductMapping;
pub use queue::{ExportStatus, NewQueueItem, QueueItem, QueueSource, QueueStats, QueueStatus};
pub use result::{
    BranchSummary, ExtractionQuality, LineItem, ParseResult, PriceSource, QuantitySource, Totals,
    PARSE_RESULT_VERSION,
};
