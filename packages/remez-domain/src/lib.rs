pub mod chunk;
pub mod corpus;
pub mod finding;
pub mod grounding;
pub mod hebrew;
pub mod prefilter;
pub mod repair;

pub use chunk::{Chunk, split_document, split_for_retry};
pub use finding::{DetectionMethod, Finding, dedup_findings};
pub use grounding::{Grounding, ground};
pub use prefilter::{CanonicalPassage, Detection, FuzzyMatch, Prefilter};
pub use repair::{RepairOutcome, RepairStrategy, parse_or_repair};
