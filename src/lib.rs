//! In-memory feature store and split search for decision tree ensembles.
pub use feature::{Feature, FeatureData, FeatureKind, RawFeature};
pub use resample::{Bag, BootstrapOptions, Resampler, ResamplerOptions};
pub use split::{CategoricalSplit, CategorySets, NumericalSplit, Split, TextualSplit};
pub use table::{FeatureTable, FilteredPair, Provenance, TableError, TableOptions};

pub mod feature;
pub mod hash;
pub mod impurity;
pub mod resample;
pub mod split;
pub mod table;

mod functions;
