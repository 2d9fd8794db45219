pub mod aggregator;
pub mod interpretation;
pub mod probability;

pub use aggregator::{Assessment, ResultAggregator};
pub use interpretation::{InterpretationBank, InterpretationSelector};
pub use probability::{ProbabilityError, ProbabilityVector};
