use crate::table::{FeatureTable, TableError};
use itertools::{EitherOrBoth, Itertools as _};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom as _;
use rand::{Rng, SeedableRng};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::num::NonZeroUsize;

#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    with_replacement: bool,
    sample_fraction: f64,
}

impl BootstrapOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replacement(mut self, enabled: bool) -> Self {
        self.with_replacement = enabled;
        self
    }

    /// Size of the bag relative to the number of eligible samples.
    pub fn sample_fraction(mut self, fraction: f64) -> Self {
        self.sample_fraction = fraction;
        self
    }

    pub fn validate(&self) -> Result<(), TableError> {
        let f = self.sample_fraction;
        if !(f > 0.0) || !f.is_finite() || (!self.with_replacement && f > 1.0) {
            return Err(TableError::InvalidSamplingParameter {
                fraction: f,
                with_replacement: self.with_replacement,
            });
        }
        Ok(())
    }
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            with_replacement: true,
            sample_fraction: 1.0,
        }
    }
}

/// Drawn samples and the eligible samples that were never drawn, both ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bag {
    pub in_bag: Vec<usize>,
    pub out_of_bag: Vec<usize>,
}

impl FeatureTable {
    /// Draws a bag from the samples that are not missing in `feature_idx`.
    ///
    /// `in_bag` may contain repeats when sampling with replacement.
    pub fn bootstrap<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        feature_idx: usize,
        options: &BootstrapOptions,
    ) -> Result<Bag, TableError> {
        options.validate()?;

        let feature = self.feature(feature_idx);
        let population = (0..self.n_samples())
            .filter(|&i| !feature.is_missing(i))
            .collect::<Vec<_>>();
        let n_real = population.len();
        let n_draw = (options.sample_fraction * n_real as f64).floor() as usize;

        let mut in_bag = if n_real == 0 {
            Vec::new()
        } else if options.with_replacement {
            (0..n_draw)
                .map(|_| population[rng.gen_range(0..n_real)])
                .collect::<Vec<_>>()
        } else {
            population
                .choose_multiple(rng, n_draw)
                .copied()
                .collect::<Vec<_>>()
        };
        in_bag.sort_unstable();

        let out_of_bag = population
            .iter()
            .copied()
            .merge_join_by(in_bag.iter().copied().dedup(), |a, b| a.cmp(b))
            .filter_map(|e| match e {
                EitherOrBoth::Left(i) => Some(i),
                _ => None,
            })
            .collect();

        Ok(Bag { in_bag, out_of_bag })
    }
}

#[derive(Debug, Clone)]
pub struct ResamplerOptions {
    bags: NonZeroUsize,
    seed: Option<u64>,
    bootstrap: BootstrapOptions,
}

impl ResamplerOptions {
    pub fn bags(mut self, bags: NonZeroUsize) -> Self {
        self.bags = bags;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn bootstrap(mut self, options: BootstrapOptions) -> Self {
        self.bootstrap = options;
        self
    }

    fn bag_rngs(&self) -> impl Iterator<Item = StdRng> {
        let seed_u64 = self.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let mut seed = [0u8; 32];
        seed[0..8].copy_from_slice(&seed_u64.to_be_bytes()[..]);
        let mut rng = StdRng::from_seed(seed);
        (0..self.bags.get()).map(move |_| {
            let mut seed = [0u8; 32];
            rng.fill(&mut seed);
            StdRng::from_seed(seed)
        })
    }
}

impl Default for ResamplerOptions {
    fn default() -> Self {
        Self {
            bags: NonZeroUsize::new(100).expect("never fails"),
            seed: None,
            bootstrap: BootstrapOptions::default(),
        }
    }
}

/// Draws one bag per ensemble member, each from its own random stream.
#[derive(Debug, Clone)]
pub struct Resampler {
    options: ResamplerOptions,
}

impl Resampler {
    pub fn new(options: ResamplerOptions) -> Result<Self, TableError> {
        options.bootstrap.validate()?;
        Ok(Self { options })
    }

    pub fn bags(&self, table: &FeatureTable, feature_idx: usize) -> Result<Vec<Bag>, TableError> {
        debug!(
            "Drawing {} bags over feature {}",
            self.options.bags, feature_idx
        );
        self.options
            .bag_rngs()
            .map(|mut rng| table.bootstrap(&mut rng, feature_idx, &self.options.bootstrap))
            .collect()
    }

    /// Same bags as [`Resampler::bags`], drawn in parallel.
    pub fn bags_parallel(
        &self,
        table: &FeatureTable,
        feature_idx: usize,
    ) -> Result<Vec<Bag>, TableError> {
        debug!(
            "Drawing {} bags over feature {} in parallel",
            self.options.bags, feature_idx
        );
        self.options
            .bag_rngs()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|mut rng| table.bootstrap(&mut rng, feature_idx, &self.options.bootstrap))
            .collect()
    }
}
