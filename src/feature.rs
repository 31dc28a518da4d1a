use crate::hash;
use crate::table::TableError;
use rand::seq::SliceRandom as _;
use rand::Rng;
use std::collections::{BTreeSet, HashMap};

/// Raw strings that are read as a missing value.
pub const MISSING_TOKENS: &[&str] = &["", "NA", "NaN", "nan", "NAN", "?", "-"];

/// String representation of a missing value.
pub const STR_NAN: &str = "NA";

pub fn is_missing_token(s: &str) -> bool {
    MISSING_TOKENS.contains(&s.trim())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    Numerical,
    Categorical,
    Textual,
}

/// One fully materialized input column, as produced by a file reader.
#[derive(Debug, Clone)]
pub struct RawFeature {
    pub name: String,
    pub kind: FeatureKind,
    pub values: Vec<String>,
}

impl RawFeature {
    pub fn new<S: Into<String>>(name: S, kind: FeatureKind, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            values,
        }
    }
}

/// Integer-coded labels together with the label tables.
#[derive(Debug, Clone, PartialEq)]
pub struct Categories {
    codes: Vec<Option<u32>>,
    mapping: HashMap<String, u32>,
    back_mapping: Vec<String>,
}

impl Categories {
    fn encode<S: AsRef<str>>(values: &[S]) -> Self {
        let mut mapping = HashMap::new();
        let mut back_mapping = Vec::new();
        let codes = values
            .iter()
            .map(|v| {
                let v = v.as_ref().trim();
                if is_missing_token(v) {
                    return None;
                }
                let code = *mapping.entry(v.to_owned()).or_insert_with(|| {
                    back_mapping.push(v.to_owned());
                    (back_mapping.len() - 1) as u32
                });
                Some(code)
            })
            .collect();
        Self {
            codes,
            mapping,
            back_mapping,
        }
    }

    pub fn codes(&self) -> &[Option<u32>] {
        &self.codes
    }

    pub fn code(&self, label: &str) -> Option<u32> {
        self.mapping.get(label).copied()
    }

    pub fn label(&self, code: u32) -> Option<&str> {
        self.back_mapping.get(code as usize).map(String::as_str)
    }

    /// Labels in code order.
    pub fn labels(&self) -> &[String] {
        &self.back_mapping
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureData {
    /// `NaN` marks a missing value.
    Numerical(Vec<f64>),
    Categorical(Categories),
    Textual(Vec<BTreeSet<u32>>),
}

/// One column. Missing numerical values are `NaN`, so two features with missing
/// values never compare equal.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    name: String,
    data: FeatureData,
}

impl Feature {
    /// `None` and `NaN` are both stored as missing.
    pub fn numerical<S: Into<String>>(name: S, values: Vec<Option<f64>>) -> Self {
        let values = values
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        Self {
            name: name.into(),
            data: FeatureData::Numerical(values),
        }
    }

    pub fn categorical<N: Into<String>, S: AsRef<str>>(name: N, values: &[S]) -> Self {
        Self {
            name: name.into(),
            data: FeatureData::Categorical(Categories::encode(values)),
        }
    }

    pub fn textual<N: Into<String>, S: AsRef<str>>(name: N, values: &[S]) -> Self {
        let sets = values.iter().map(|v| hash::hash_text(v.as_ref())).collect();
        Self {
            name: name.into(),
            data: FeatureData::Textual(sets),
        }
    }

    pub fn from_raw(raw: RawFeature) -> Result<Self, TableError> {
        match raw.kind {
            FeatureKind::Numerical => {
                let values = raw
                    .values
                    .iter()
                    .map(|v| {
                        if is_missing_token(v) {
                            Ok(None)
                        } else {
                            v.trim().parse::<f64>().map(Some).map_err(|_| {
                                TableError::InvalidNumber {
                                    feature: raw.name.clone(),
                                    value: v.clone(),
                                }
                            })
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::numerical(raw.name, values))
            }
            FeatureKind::Categorical => Ok(Self::categorical(raw.name, &raw.values)),
            FeatureKind::Textual => Ok(Self::textual(raw.name, &raw.values)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn data(&self) -> &FeatureData {
        &self.data
    }

    pub fn kind(&self) -> FeatureKind {
        match self.data {
            FeatureData::Numerical(_) => FeatureKind::Numerical,
            FeatureData::Categorical(_) => FeatureKind::Categorical,
            FeatureData::Textual(_) => FeatureKind::Textual,
        }
    }

    pub fn is_numerical(&self) -> bool {
        self.kind() == FeatureKind::Numerical
    }

    pub fn is_categorical(&self) -> bool {
        self.kind() == FeatureKind::Categorical
    }

    pub fn is_textual(&self) -> bool {
        self.kind() == FeatureKind::Textual
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        match &self.data {
            FeatureData::Numerical(xs) => xs.len(),
            FeatureData::Categorical(c) => c.codes.len(),
            FeatureData::Textual(sets) => sets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value of a sample, or `None` if missing. Categorical values are their codes.
    /// Textual features have no value.
    pub fn value(&self, sample: usize) -> Option<f64> {
        let v = self.raw_value(sample);
        if v.is_nan() {
            None
        } else {
            Some(v)
        }
    }

    /// Same as [`Feature::value`], but a missing value is `NaN`.
    #[inline]
    pub(crate) fn raw_value(&self, sample: usize) -> f64 {
        match &self.data {
            FeatureData::Numerical(xs) => xs[sample],
            FeatureData::Categorical(c) => c.codes[sample].map_or(f64::NAN, f64::from),
            FeatureData::Textual(_) => f64::NAN,
        }
    }

    pub fn is_missing(&self, sample: usize) -> bool {
        self.raw_value(sample).is_nan()
    }

    /// Number of samples with a non-missing value.
    pub fn n_real_samples(&self) -> usize {
        (0..self.len()).filter(|&i| !self.is_missing(i)).count()
    }

    pub fn categories(&self) -> Option<&Categories> {
        if let FeatureData::Categorical(c) = &self.data {
            Some(c)
        } else {
            None
        }
    }

    pub fn n_categories(&self) -> usize {
        self.categories().map_or(0, |c| c.back_mapping.len())
    }

    pub fn hash_set(&self, sample: usize) -> Option<&BTreeSet<u32>> {
        if let FeatureData::Textual(sets) = &self.data {
            Some(&sets[sample])
        } else {
            None
        }
    }

    pub fn has_hash(&self, sample: usize, hash: u32) -> bool {
        self.hash_set(sample).map_or(false, |s| s.contains(&hash))
    }

    /// Picks the `integer % n`-th smallest hash code of a sample's `n` codes.
    pub fn get_hash(&self, sample: usize, integer: usize) -> Option<u32> {
        let set = self.hash_set(sample)?;
        if set.is_empty() {
            return None;
        }
        set.iter().nth(integer % set.len()).copied()
    }

    /// Sum of the binary presence entropies of every observed hash code.
    pub fn entropy(&self) -> Option<f64> {
        let sets = if let FeatureData::Textual(sets) = &self.data {
            sets
        } else {
            return None;
        };

        let mut counter = HashMap::<u32, usize>::new();
        for &h in sets.iter().flatten() {
            *counter.entry(h).or_default() += 1;
        }

        let n = sets.len() as f64;
        let xlnx = |x: f64| if x > 0.0 { x * x.ln() } else { 0.0 };
        Some(
            counter
                .values()
                .map(|&c| {
                    let f = c as f64 / n;
                    -(xlnx(f) + xlnx(1.0 - f))
                })
                .sum(),
        )
    }

    /// Shuffles non-missing values among the non-missing slots.
    /// Hash sets are shuffled among all samples.
    pub fn permute<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        match &mut self.data {
            FeatureData::Numerical(xs) => {
                let slots = (0..xs.len()).filter(|&i| !xs[i].is_nan()).collect::<Vec<_>>();
                let mut values = slots.iter().map(|&i| xs[i]).collect::<Vec<_>>();
                values.shuffle(rng);
                for (&i, v) in slots.iter().zip(values) {
                    xs[i] = v;
                }
            }
            FeatureData::Categorical(c) => {
                let slots = (0..c.codes.len())
                    .filter(|&i| c.codes[i].is_some())
                    .collect::<Vec<_>>();
                let mut values = slots.iter().map(|&i| c.codes[i]).collect::<Vec<_>>();
                values.shuffle(rng);
                for (&i, v) in slots.iter().zip(values) {
                    c.codes[i] = v;
                }
            }
            FeatureData::Textual(sets) => sets.shuffle(rng),
        }
    }
}
