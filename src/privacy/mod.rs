pub mod bucketing;
pub mod recoding;
pub mod suppression;

pub use bucketing::{calculate_imd_group, ImdLabelStyle};
pub use recoding::{CategoryRecoder, Ethnicity};
pub use suppression::{redact_small_numbers, suppress_column, RedactionReport};
