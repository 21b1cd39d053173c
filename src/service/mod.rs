pub mod customer_resolver;
pub mod export;
pub mod extractor;
pub mod mapping_index;
pub mod matcher;
pub mod normalizer;
pub mod pipeline;
pub mod pricing;
pub mod quality;

pub use export::{CsvExporter, ExportRecord, ExportSink};
pub use extractor::{PlainTextExtractor, TextExtractor};
pub use matcher::{MatcherConfig, ReverseLookupMatcher};
pub use pipeline::{BatchReport, CycleReport, ExportReport, ItemOutcome, ParseOutcome, Pipeline};
