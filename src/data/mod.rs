mod catalogue;
pub use catalogue::LineCatalogue;

mod line_mask;
pub use line_mask::LineMatchMask;

mod spectrum;
pub use spectrum::{IntensityUnit, ObservedSpectrum};
