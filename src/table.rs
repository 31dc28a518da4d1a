use crate::feature::{Feature, FeatureKind, RawFeature, STR_NAN};
use crate::functions;
use itertools::Itertools as _;
use log::debug;
use ordered_float::OrderedFloat;
use rand::Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::collections::HashMap;
use thiserror::Error;

/// Sample identifier used when the input carries none.
pub const NO_SAMPLE_ID: &str = "NO_SAMPLE_ID";

/// Name suffix of contrast features.
pub const CONTRAST_SUFFIX: &str = "_CONTRAST";

#[derive(Debug, Clone, Default)]
pub struct TableOptions {
    use_contrasts: bool,
    sample_headers: Option<Vec<String>>,
}

impl TableOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a copy of every feature, to be permuted with [`FeatureTable::permute_contrasts`].
    pub fn use_contrasts(mut self, enabled: bool) -> Self {
        self.use_contrasts = enabled;
        self
    }

    pub fn sample_headers(mut self, headers: Vec<String>) -> Self {
        self.sample_headers = Some(headers);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Real,
    /// A copy of the real feature with the given index.
    Contrast(usize),
}

/// Values of a feature and a target, co-indexed with the samples they come from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredPair {
    pub feature: Vec<f64>,
    pub target: Vec<f64>,
    pub samples: Vec<usize>,
}

impl FilteredPair {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FeatureTable {
    features: Vec<Feature>,
    provenance: Vec<Provenance>,
    name_to_idx: HashMap<String, usize>,
    sample_headers: Vec<String>,
    use_contrasts: bool,
}

impl FeatureTable {
    pub fn new(features: Vec<Feature>, options: TableOptions) -> Result<Self, TableError> {
        if features.is_empty() || features[0].is_empty() {
            return Err(TableError::EmptyTable);
        }

        let n_samples = features[0].len();
        if let Some(f) = features.iter().find(|f| f.len() != n_samples) {
            return Err(TableError::DimensionMismatch {
                feature: f.name().to_owned(),
                expected: n_samples,
                actual: f.len(),
            });
        }

        let sample_headers = match options.sample_headers {
            Some(headers) if headers.len() != n_samples => {
                return Err(TableError::SampleHeaderMismatch {
                    expected: n_samples,
                    actual: headers.len(),
                });
            }
            Some(headers) => headers,
            None => vec![NO_SAMPLE_ID.to_owned(); n_samples],
        };

        // Room for the contrasts at a load factor of at most one half.
        let mut name_to_idx = HashMap::with_capacity(4 * features.len());
        for (i, f) in features.iter().enumerate() {
            if name_to_idx.insert(f.name().to_owned(), i).is_some() {
                return Err(TableError::DuplicateFeatureName {
                    name: f.name().to_owned(),
                });
            }
        }

        let mut table = Self {
            provenance: vec![Provenance::Real; features.len()],
            features,
            name_to_idx,
            sample_headers,
            use_contrasts: options.use_contrasts,
        };
        if table.use_contrasts {
            table.create_contrasts()?;
        }
        debug!(
            "Feature table: features={}, samples={}, contrasts={}",
            table.n_features(),
            table.n_samples(),
            table.use_contrasts
        );
        Ok(table)
    }

    pub fn from_raw(features: Vec<RawFeature>, options: TableOptions) -> Result<Self, TableError> {
        let features = features
            .into_iter()
            .map(Feature::from_raw)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(features, options)
    }

    fn create_contrasts(&mut self) -> Result<(), TableError> {
        let n = self.features.len();
        for i in 0..n {
            let mut contrast = self.features[i].clone();
            let name = format!("{}{}", contrast.name(), CONTRAST_SUFFIX);
            if self.name_to_idx.insert(name.clone(), n + i).is_some() {
                return Err(TableError::DuplicateFeatureName { name });
            }
            contrast.set_name(name);
            self.features.push(contrast);
            self.provenance.push(Provenance::Contrast(i));
        }
        debug!("Created {} contrast features", n);
        Ok(())
    }

    /// Shuffles every contrast feature independently. Missing slots stay in place.
    pub fn permute_contrasts<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for (f, p) in self.features.iter_mut().zip(self.provenance.iter()) {
            if let Provenance::Contrast(_) = p {
                f.permute(rng);
            }
        }
        debug!("Permuted {} contrast features", self.n_features());
    }

    /// Number of real features. Contrasts are not counted.
    pub fn n_features(&self) -> usize {
        if self.use_contrasts {
            self.features.len() / 2
        } else {
            self.features.len()
        }
    }

    /// Number of stored features, contrasts included.
    pub fn n_stored_features(&self) -> usize {
        self.features.len()
    }

    pub fn n_samples(&self) -> usize {
        self.sample_headers.len()
    }

    pub fn use_contrasts(&self) -> bool {
        self.use_contrasts
    }

    pub fn feature(&self, feature_idx: usize) -> &Feature {
        &self.features[feature_idx]
    }

    pub fn provenance(&self, feature_idx: usize) -> Provenance {
        self.provenance[feature_idx]
    }

    pub fn is_contrast(&self, feature_idx: usize) -> bool {
        matches!(self.provenance[feature_idx], Provenance::Contrast(_))
    }

    pub fn is_numerical(&self, feature_idx: usize) -> bool {
        self.features[feature_idx].is_numerical()
    }

    pub fn is_categorical(&self, feature_idx: usize) -> bool {
        self.features[feature_idx].is_categorical()
    }

    pub fn is_textual(&self, feature_idx: usize) -> bool {
        self.features[feature_idx].is_textual()
    }

    pub fn feature_idx(&self, name: &str) -> Option<usize> {
        self.name_to_idx.get(name).copied()
    }

    pub fn feature_name(&self, feature_idx: usize) -> &str {
        self.features[feature_idx].name()
    }

    pub fn sample_name(&self, sample_idx: usize) -> &str {
        &self.sample_headers[sample_idx]
    }

    pub fn sample_headers(&self) -> &[String] {
        &self.sample_headers
    }

    pub fn n_real_samples(&self, feature_idx: usize) -> usize {
        self.features[feature_idx].n_real_samples()
    }

    /// Number of samples that are present in both features.
    pub fn n_real_samples_pair(&self, feature_idx1: usize, feature_idx2: usize) -> usize {
        let (f1, f2) = (&self.features[feature_idx1], &self.features[feature_idx2]);
        (0..self.n_samples())
            .filter(|&i| !f1.is_missing(i) && !f2.is_missing(i))
            .count()
    }

    pub fn n_categories(&self, feature_idx: usize) -> usize {
        self.features[feature_idx].n_categories()
    }

    pub fn n_max_categories(&self) -> usize {
        self.features[..self.n_features()]
            .iter()
            .map(Feature::n_categories)
            .max()
            .unwrap_or(0)
    }

    /// Category labels in code order. Empty for non-categorical features.
    pub fn categories(&self, feature_idx: usize) -> Vec<String> {
        self.features[feature_idx]
            .categories()
            .map_or_else(Vec::new, |c| c.labels().to_vec())
    }

    /// Values of every sample, `NaN` where missing.
    pub fn feature_data(&self, feature_idx: usize) -> Vec<f64> {
        let f = &self.features[feature_idx];
        (0..self.n_samples()).map(|i| f.raw_value(i)).collect()
    }

    /// Values of the given samples, `NaN` where missing.
    pub fn feature_data_at(&self, feature_idx: usize, sample_ics: &[usize]) -> Vec<f64> {
        let f = &self.features[feature_idx];
        sample_ics.iter().map(|&i| f.raw_value(i)).collect()
    }

    /// Drops the samples that are missing in the feature. Returns the values and the kept samples.
    pub fn filtered_feature_data(
        &self,
        feature_idx: usize,
        sample_ics: &[usize],
    ) -> (Vec<f64>, Vec<usize>) {
        let f = &self.features[feature_idx];
        sample_ics
            .iter()
            .map(|&i| (f.raw_value(i), i))
            .filter(|(v, _)| !v.is_nan())
            .unzip()
    }

    /// Drops the samples that are missing in either the feature or the target.
    /// Surviving samples keep their relative order.
    pub fn filter_pair(
        &self,
        feature_idx: usize,
        target_idx: usize,
        sample_ics: &[usize],
    ) -> FilteredPair {
        let (f, t) = (&self.features[feature_idx], &self.features[target_idx]);
        let mut filtered = FilteredPair::default();
        for &i in sample_ics {
            let (x, y) = (f.raw_value(i), t.raw_value(i));
            if !x.is_nan() && !y.is_nan() {
                filtered.feature.push(x);
                filtered.target.push(y);
                filtered.samples.push(i);
            }
        }
        filtered
    }

    /// Like [`FeatureTable::filter_pair`], then stably sorted ascending by feature value.
    pub fn filter_sort_ascending_by_feature(
        &self,
        feature_idx: usize,
        target_idx: usize,
        sample_ics: &[usize],
    ) -> FilteredPair {
        let filtered = self.filter_pair(feature_idx, target_idx, sample_ics);
        let (feature, positions) = functions::filter_sort_ascending(&filtered.feature);
        FilteredPair {
            feature,
            target: functions::sort_from_ref(&filtered.target, &positions),
            samples: functions::sort_from_ref(&filtered.samples, &positions),
        }
    }

    /// String form of a sample's value, as it was read in.
    pub fn raw_feature_data(&self, feature_idx: usize, sample_idx: usize) -> Result<String, TableError> {
        let v = self.features[feature_idx].raw_value(sample_idx);
        self.raw_feature_value(feature_idx, v)
    }

    pub fn raw_feature_column(&self, feature_idx: usize) -> Result<Vec<String>, TableError> {
        (0..self.n_samples())
            .map(|i| self.raw_feature_data(feature_idx, i))
            .collect()
    }

    /// Translates a numerical value or a category code into its string form.
    pub fn raw_feature_value(&self, feature_idx: usize, value: f64) -> Result<String, TableError> {
        let f = &self.features[feature_idx];
        if f.is_textual() {
            return Err(TableError::FeatureTypeMismatch {
                feature: f.name().to_owned(),
                expected: FeatureKind::Categorical,
            });
        }
        if value.is_nan() {
            return Ok(STR_NAN.to_owned());
        }
        match f.categories() {
            None => Ok(value.to_string()),
            Some(c) => {
                let code = value as u32;
                c.label(code)
                    .filter(|_| value >= 0.0 && f64::from(code) == value)
                    .map(str::to_owned)
                    .ok_or_else(|| TableError::UnknownCategoryValue {
                        feature: f.name().to_owned(),
                        value,
                    })
            }
        }
    }

    /// Replaces a feature with numerical data. The name and provenance are kept.
    pub fn replace_feature_data(
        &mut self,
        feature_idx: usize,
        data: Vec<Option<f64>>,
    ) -> Result<(), TableError> {
        self.check_replacement_len(feature_idx, data.len())?;
        let name = self.features[feature_idx].name().to_owned();
        self.features[feature_idx] = Feature::numerical(name, data);
        debug!("Replaced feature {} with numerical data", feature_idx);
        Ok(())
    }

    /// Replaces a feature with categorical data, encoded from raw labels.
    pub fn replace_raw_feature_data(
        &mut self,
        feature_idx: usize,
        data: Vec<String>,
    ) -> Result<(), TableError> {
        self.check_replacement_len(feature_idx, data.len())?;
        let name = self.features[feature_idx].name().to_owned();
        self.features[feature_idx] = Feature::categorical(name, &data);
        debug!("Replaced feature {} with categorical data", feature_idx);
        Ok(())
    }

    fn check_replacement_len(&self, feature_idx: usize, len: usize) -> Result<(), TableError> {
        let f = &self.features[feature_idx];
        if len != f.len() {
            return Err(TableError::DimensionMismatch {
                feature: f.name().to_owned(),
                expected: f.len(),
                actual: len,
            });
        }
        Ok(())
    }

    pub fn has_hash(&self, feature_idx: usize, sample_idx: usize, hash: u32) -> bool {
        self.features[feature_idx].has_hash(sample_idx, hash)
    }

    pub fn get_hash(&self, feature_idx: usize, sample_idx: usize, integer: usize) -> Option<u32> {
        self.features[feature_idx].get_hash(sample_idx, integer)
    }

    pub fn feature_entropy(&self, feature_idx: usize) -> Result<f64, TableError> {
        let f = &self.features[feature_idx];
        f.entropy().ok_or_else(|| TableError::FeatureTypeMismatch {
            feature: f.name().to_owned(),
            expected: FeatureKind::Textual,
        })
    }

    /// Entropies of every stored textual feature, highest first.
    pub fn textual_entropies(&self) -> Vec<(usize, f64)> {
        let entropies = (0..self.features.len())
            .into_par_iter()
            .filter_map(|i| self.features[i].entropy().map(|e| (i, e)))
            .collect::<Vec<_>>();
        entropies
            .into_iter()
            .sorted_by_key(|&(_, e)| std::cmp::Reverse(OrderedFloat(e)))
            .collect()
    }
}

#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TableError {
    #[error("table must have at least one feature and one sample")]
    EmptyTable,

    #[error("feature {feature:?} has {actual} samples, expected {expected}")]
    DimensionMismatch {
        feature: String,
        expected: usize,
        actual: usize,
    },

    #[error("there are {actual} sample headers, expected {expected}")]
    SampleHeaderMismatch { expected: usize, actual: usize },

    #[error("duplicate feature name {name:?}")]
    DuplicateFeatureName { name: String },

    #[error("invalid sampling parameter: fraction={fraction}, with_replacement={with_replacement} (without replacement the fraction must be in (0, 1])")]
    InvalidSamplingParameter {
        fraction: f64,
        with_replacement: bool,
    },

    #[error("feature {feature:?} has no category with code {value}")]
    UnknownCategoryValue { feature: String, value: f64 },

    #[error("feature {feature:?} has a non-numerical value {value:?}")]
    InvalidNumber { feature: String, value: String },

    #[error("feature {feature:?} cannot be used here, expected a {expected:?} feature")]
    FeatureTypeMismatch {
        feature: String,
        expected: FeatureKind,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn table(use_contrasts: bool) -> Result<FeatureTable, TableError> {
        let features = vec![
            Feature::numerical(
                "N:x",
                vec![Some(1.0), None, Some(3.0), None, Some(5.0)],
            ),
            Feature::numerical(
                "N:y",
                vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0)],
            ),
            Feature::categorical("C:c", &["a", "b", "a", "NA", "c"]),
            Feature::textual("T:t", &["red dog", "dog", "", "red", "cat"]),
        ];
        FeatureTable::new(features, TableOptions::new().use_contrasts(use_contrasts))
    }

    #[test]
    fn construction_works() -> Result<(), anyhow::Error> {
        let table = table(false)?;
        assert_eq!(table.n_features(), 4);
        assert_eq!(table.n_samples(), 5);
        assert_eq!(table.feature_idx("C:c"), Some(2));
        assert_eq!(table.feature_idx("nope"), None);
        assert_eq!(table.sample_name(3), NO_SAMPLE_ID);
        assert!(table.is_numerical(0));
        assert!(table.is_categorical(2));
        assert!(table.is_textual(3));
        assert!(!table.is_contrast(0));
        Ok(())
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert_eq!(
            FeatureTable::new(Vec::new(), TableOptions::new()).err(),
            Some(TableError::EmptyTable)
        );

        let features = vec![
            Feature::numerical("N:a", vec![Some(1.0), Some(2.0)]),
            Feature::numerical("N:b", vec![Some(1.0)]),
        ];
        assert_eq!(
            FeatureTable::new(features, TableOptions::new()).err(),
            Some(TableError::DimensionMismatch {
                feature: "N:b".to_owned(),
                expected: 2,
                actual: 1
            })
        );

        let features = vec![
            Feature::numerical("N:a", vec![Some(1.0)]),
            Feature::categorical("N:a", &["x"]),
        ];
        assert_eq!(
            FeatureTable::new(features, TableOptions::new()).err(),
            Some(TableError::DuplicateFeatureName {
                name: "N:a".to_owned()
            })
        );

        let features = vec![Feature::numerical("N:a", vec![Some(1.0), Some(2.0)])];
        let options = TableOptions::new().sample_headers(vec!["s1".to_owned()]);
        assert_eq!(
            FeatureTable::new(features, options).err(),
            Some(TableError::SampleHeaderMismatch {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn from_raw_works() -> Result<(), anyhow::Error> {
        let raw = vec![
            RawFeature::new(
                "N:x",
                FeatureKind::Numerical,
                vec!["1".to_owned(), "NA".to_owned()],
            ),
            RawFeature::new(
                "C:c",
                FeatureKind::Categorical,
                vec!["u".to_owned(), "v".to_owned()],
            ),
        ];
        let options = TableOptions::new().sample_headers(vec!["s1".to_owned(), "s2".to_owned()]);
        let table = FeatureTable::from_raw(raw, options)?;
        assert_eq!(table.sample_name(1), "s2");
        assert_eq!(table.raw_feature_column(0)?, vec!["1", STR_NAN]);
        assert_eq!(table.raw_feature_column(1)?, vec!["u", "v"]);
        Ok(())
    }

    #[test]
    fn contrasts_double_storage() -> Result<(), anyhow::Error> {
        let mut table = table(true)?;
        assert_eq!(table.n_features(), 4);
        assert_eq!(table.n_stored_features(), 8);
        for i in 0..4 {
            let name = format!("{}{}", table.feature_name(i), CONTRAST_SUFFIX);
            assert_eq!(table.feature_idx(&name), Some(i + 4));
            assert_eq!(table.provenance(i + 4), Provenance::Contrast(i));
            assert!(table.is_contrast(i + 4));
            assert_eq!(table.feature(i + 4).kind(), table.feature(i).kind());
        }
        assert_eq!(table.raw_feature_column(4)?, table.raw_feature_column(0)?);
        assert_eq!(table.raw_feature_column(6)?, table.raw_feature_column(2)?);
        assert_eq!(table.feature(7).hash_set(0), table.feature(3).hash_set(0));

        let original = table.raw_feature_column(0)?;
        table.permute_contrasts(&mut StdRng::seed_from_u64(3));
        assert_eq!(table.raw_feature_column(0)?, original);
        let permuted = table.feature_data(4);
        assert!(permuted[1].is_nan() && permuted[3].is_nan());
        let mut values = [0, 2, 4].iter().map(|&i| permuted[i]).collect::<Vec<_>>();
        values.sort_by_key(|&v| OrderedFloat(v));
        assert_eq!(values, vec![1.0, 3.0, 5.0]);
        Ok(())
    }

    #[test]
    fn filter_pair_keeps_order() -> Result<(), anyhow::Error> {
        let table = table(false)?;
        let filtered = table.filter_pair(0, 1, &[0, 1, 2, 3, 4]);
        assert_eq!(filtered.feature, vec![1.0, 3.0, 5.0]);
        assert_eq!(filtered.target, vec![1.0, 3.0, 5.0]);
        assert_eq!(filtered.samples, vec![0, 2, 4]);

        let filtered = table.filter_pair(2, 1, &[4, 3, 2, 1, 0]);
        assert_eq!(filtered.samples, vec![4, 2, 1, 0]);
        assert_eq!(filtered.len(), table.n_real_samples_pair(2, 1));

        let (values, samples) = table.filtered_feature_data(0, &[4, 3, 0]);
        assert_eq!(values, vec![5.0, 1.0]);
        assert_eq!(samples, vec![4, 0]);
        Ok(())
    }

    #[test]
    fn filter_sort_is_stable() -> Result<(), anyhow::Error> {
        let features = vec![
            Feature::numerical(
                "N:f",
                vec![Some(2.0), Some(1.0), Some(2.0), None, Some(1.0), Some(0.5)],
            ),
            Feature::numerical(
                "N:t",
                vec![Some(10.0), Some(11.0), Some(12.0), Some(13.0), None, Some(15.0)],
            ),
        ];
        let table = FeatureTable::new(features, TableOptions::new())?;
        let sorted = table.filter_sort_ascending_by_feature(0, 1, &[0, 1, 2, 3, 4, 5]);
        assert_eq!(sorted.feature, vec![0.5, 1.0, 2.0, 2.0]);
        assert_eq!(sorted.target, vec![15.0, 11.0, 10.0, 12.0]);
        assert_eq!(sorted.samples, vec![5, 1, 0, 2]);
        Ok(())
    }

    #[test]
    fn raw_feature_data_works() -> Result<(), anyhow::Error> {
        let table = table(false)?;
        assert_eq!(table.raw_feature_data(0, 2)?, "3");
        assert_eq!(table.raw_feature_data(0, 1)?, STR_NAN);
        assert_eq!(table.raw_feature_data(2, 4)?, "c");
        assert_eq!(table.raw_feature_data(2, 3)?, STR_NAN);
        assert_eq!(table.raw_feature_value(2, 1.0)?, "b");
        assert_eq!(
            table.raw_feature_value(2, 7.0),
            Err(TableError::UnknownCategoryValue {
                feature: "C:c".to_owned(),
                value: 7.0
            })
        );
        assert!(table.raw_feature_data(3, 0).is_err());
        assert_eq!(table.categories(2), vec!["a", "b", "c"]);
        assert_eq!(table.n_max_categories(), 3);
        Ok(())
    }

    #[test]
    fn replacement_works() -> Result<(), anyhow::Error> {
        let mut table = table(false)?;
        assert_eq!(
            table.replace_feature_data(0, vec![Some(1.0)]),
            Err(TableError::DimensionMismatch {
                feature: "N:x".to_owned(),
                expected: 5,
                actual: 1
            })
        );

        table.replace_raw_feature_data(
            0,
            ["p", "q", "p", "q", "NA"].iter().map(|s| s.to_string()).collect(),
        )?;
        assert!(table.is_categorical(0));
        assert_eq!(table.feature_name(0), "N:x");
        assert_eq!(table.n_categories(0), 2);

        table.replace_feature_data(0, vec![None; 5])?;
        assert!(table.is_numerical(0));
        assert_eq!(table.n_real_samples(0), 0);
        Ok(())
    }

    #[test]
    fn textual_entropies_are_ranked() -> Result<(), anyhow::Error> {
        let features = vec![
            Feature::textual("T:same", &["a", "a", "a", "a"]),
            Feature::numerical("N:x", vec![Some(1.0); 4]),
            Feature::textual("T:mixed", &["a b", "b", "a", "c"]),
        ];
        let table = FeatureTable::new(features, TableOptions::new())?;
        let ranked = table.textual_entropies();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, 2);
        assert!(ranked[0].1 > 0.0);
        assert_eq!(ranked[1], (0, 0.0));
        assert!(table.feature_entropy(1).is_err());
        assert!(table.has_hash(2, 0, crate::hash::hsieh(b"b")));
        Ok(())
    }
}
