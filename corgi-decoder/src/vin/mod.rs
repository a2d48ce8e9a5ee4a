//! VIN structure: decomposition, check digit and model year
//!
//! Everything in this module is pure computation over the 17 characters of a
//! VIN. Nothing here touches the dataset.

pub mod check_digit;
pub mod model_year;
pub mod segments;

pub use check_digit::CheckDigitReport;
pub use model_year::{ModelYearResolution, ModelYearResolver, YearSource};
pub use segments::{VinSegments, VIN_LENGTH};
