#![warn(missing_docs)]
#![doc(test(no_crate_inject))]
#![doc(test(attr(deny(unused, future_incompatible))))]

//! This crate provides an implementation of Minimally Complex Model selection
//! for binary data, as described by these papers:
//!
//! - de Mulatier, Mazza, Marsili, [Statistical Inference of Minimally Complex
//!   Models][mcm], 2021
//! - Beretta, Battistin, de Mulatier, Mastromatteo, Marsili, [The Stochastic
//!   Complexity of Spin Models: Are Pairwise Models Really Simple?][sc], 2018
//!
//! [mcm]: https://arxiv.org/abs/2008.00520
//! [sc]: https://www.mdpi.com/1099-4300/20/10/739
//!
//! A Minimally Complex Model (MCM) partitions a chosen set of binary basis
//! operators into groups that are modeled independently of one another, while
//! each group is left fully saturated internally. Model selection is exact
//! Bayesian comparison: every set partition of the basis elements is generated
//! in canonical restricted-growth order and scored by its closed-form
//! log-evidence under a Jeffreys prior. The partition with the highest
//! log-evidence wins; exact ties are kept, not discarded.
//!
//! The pieces fit together like this: a [`FrequencyTable`] holds the observed
//! states and their counts, [`RestrictedGrowth`] generates candidate
//! partitions one encoding at a time, [`Partition`] is the decoded
//! block-bitmask form, a [`ModelScorer`] turns a partition into log-likelihood
//! and log-evidence, and the three `search_*` functions drive the enumeration
//! while a [`BestTracker`] follows the running maximum.
//!
//! Because the number of set partitions grows like the Bell numbers, callers
//! are responsible for keeping the searched rank tractable. The search is
//! exhaustive by design; there is no sampling and no parallelism.

use smallvec::SmallVec;
use statrs::function::gamma::ln_gamma;
use std::collections::{BTreeMap, HashMap};
use std::f64::consts::{LN_2, PI};
use std::fmt::{self, Write as _};

/// The widest supported system: states and block bitmasks are stored in a
/// `u64`, so at most 64 binary variables can be modeled at once.
pub const MAX_WIDTH: u32 = 64;

/// A bitmask covering the `width` lowest variable positions.
fn low_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Errors reported when a caller hands this crate something it refuses to
/// score or search.
///
/// Every failure here is a deterministic function of the input; none of them
/// is worth retrying.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelError {
    /// The number of variables must satisfy `1 <= width <= MAX_WIDTH`.
    WidthOutOfRange {
        /// The rejected variable count.
        width: u32,
    },
    /// The basis may not contain more elements than there are variables.
    BasisTooLarge {
        /// The rejected basis size.
        basis_size: u32,
        /// The number of variables.
        width: u32,
    },
    /// Scoring an empty table is meaningless.
    EmptyTable,
    /// An observed state has bits outside the declared basis range.
    StateOutOfRange {
        /// The offending state.
        state: u64,
        /// The declared basis size.
        basis_size: u32,
    },
    /// A search rank must satisfy `1 <= rank <= basis_size`.
    RankOutOfRange {
        /// The rejected rank.
        rank: u32,
        /// The basis size the rank was checked against.
        basis_size: u32,
    },
    /// A block bitmask with no bits set does not define a model.
    EmptyBlock,
    /// A block bitmask has bits outside the basis range.
    BlockOutOfRange {
        /// The offending block mask.
        mask: u64,
        /// The declared basis size.
        basis_size: u32,
    },
    /// The supplied blocks overlap or are empty, so they do not form a
    /// partition.
    NotAPartition,
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ModelError::WidthOutOfRange { width } => {
                write!(f, "variable count {} is not in 1..={}", width, MAX_WIDTH)
            }
            ModelError::BasisTooLarge { basis_size, width } => write!(
                f,
                "basis of {} elements does not fit {} variables",
                basis_size, width
            ),
            ModelError::EmptyTable => write!(f, "the frequency table contains no observations"),
            ModelError::StateOutOfRange { state, basis_size } => write!(
                f,
                "observed state {} has bits outside the {}-element basis",
                state, basis_size
            ),
            ModelError::RankOutOfRange { rank, basis_size } => {
                write!(f, "search rank {} is not in 1..={}", rank, basis_size)
            }
            ModelError::EmptyBlock => write!(f, "a block bitmask with no bits set is not a model"),
            ModelError::BlockOutOfRange { mask, basis_size } => write!(
                f,
                "block mask {} has bits outside the {}-element basis",
                mask, basis_size
            ),
            ModelError::NotAPartition => {
                write!(f, "the supplied blocks do not form a partition of the basis")
            }
        }
    }
}

impl std::error::Error for ModelError {}

/// A sparse frequency table mapping an observed state to the number of times
/// it appeared in the dataset.
///
/// States encode the values of up to [`MAX_WIDTH`] binary variables; bit `i`
/// holds the value of variable `i`, and the first basis element is the least
/// significant bit. As the number of variables grows, the number of observed
/// states is typically far smaller than the size of the state space, so only
/// states that actually occurred are stored. Missing states have count zero.
///
/// A table is built once per basis choice and then borrowed read-only by a
/// [`ModelScorer`]; nothing in the scoring or search paths mutates it.
///
/// # Panics
///
/// [`FrequencyTable::add_cell`] panics when handed a count of zero, so every
/// stored count is positive by construction.
#[derive(Clone, PartialEq, Eq)]
pub struct FrequencyTable {
    cells: HashMap<u64, u64>,
}

impl fmt::Debug for FrequencyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.cells.iter()).finish()
    }
}

impl FrequencyTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        FrequencyTable {
            cells: HashMap::new(),
        }
    }

    /// Creates an empty table with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        FrequencyTable {
            cells: HashMap::with_capacity(capacity),
        }
    }

    /// Adds `count` observations of `state` to the table.
    ///
    /// If the state had not been seen before, it's treated like it had count
    /// zero.
    ///
    /// ```
    /// use mincomplex::FrequencyTable;
    ///
    /// let mut table = FrequencyTable::new();
    /// table.add_cell(0b011, 2).add_cell(0b011, 1).add_cell(0b000, 4);
    /// assert_eq!(table.len(), 2);
    /// assert_eq!(table.sample_size(), 7);
    /// ```
    ///
    /// # Panics
    ///
    /// This method panics if `count` is zero.
    pub fn add_cell(&mut self, state: u64, count: u64) -> &mut Self {
        assert!(count > 0);
        *self.cells.entry(state).or_insert(0) += count;
        self
    }

    /// The number of distinct observed states.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` if no observations have been recorded.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The total number of observations, usually written N.
    pub fn sample_size(&self) -> u64 {
        self.cells.values().sum()
    }

    /// Returns an iterator over the `(state, count)` pairs in the table, in
    /// arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.cells.iter().map(|(&state, &count)| (state, count))
    }

    /// Aggregates the table under a block bitmask: every state is reduced to
    /// `state & mask` and the counts of states with the same image are added
    /// together.
    ///
    /// The result is ordered by reduced state. That makes every downstream
    /// floating-point summation run in a reproducible order, which matters
    /// because the search treats exactly equal scores as ties.
    ///
    /// ```
    /// use mincomplex::FrequencyTable;
    ///
    /// let mut table = FrequencyTable::new();
    /// table.add_cell(0b000, 2).add_cell(0b011, 1).add_cell(0b111, 1);
    ///
    /// let reduced = table.project(0b001);
    /// assert_eq!(reduced[&0b000], 2);
    /// assert_eq!(reduced[&0b001], 2);
    /// ```
    pub fn project(&self, mask: u64) -> BTreeMap<u64, u64> {
        let mut reduced = BTreeMap::new();
        for (&state, &count) in self.cells.iter() {
            *reduced.entry(state & mask).or_insert(0) += count;
        }
        reduced
    }

    /// Re-expresses the whole table in a new basis.
    ///
    /// Basis element `i` is itself a bitmask over the original variables; the
    /// transformed state has bit `i` set when the observed state overlaps
    /// basis element `i` in an odd number of positions. Observations whose
    /// images coincide are aggregated. With `m` basis elements the projected
    /// table only occupies the `m` low bits.
    ///
    /// ```
    /// use mincomplex::FrequencyTable;
    ///
    /// let mut table = FrequencyTable::new();
    /// table.add_cell(0b11, 3);
    ///
    /// // First basis element is the parity of both variables, second is the
    /// // first variable alone.
    /// let projected = table.project_onto_basis(&[0b11, 0b01]);
    /// let cells: Vec<_> = projected.iter().collect();
    /// assert_eq!(cells, vec![(0b10, 3)]);
    /// ```
    pub fn project_onto_basis(&self, basis: &[u64]) -> FrequencyTable {
        let mut projected = FrequencyTable::with_capacity(self.cells.len());
        for (&state, &count) in self.cells.iter() {
            projected.add_cell(transform_state(state, basis), count);
        }
        projected
    }

    /// Shrinks the capacity of the table as much as possible.
    ///
    /// Worth calling once construction is finished, before the table gets
    /// handed to a scorer.
    pub fn shrink_to_fit(&mut self) {
        self.cells.shrink_to_fit();
    }
}

impl std::iter::FromIterator<(u64, u64)> for FrequencyTable {
    /// Builds a table from `(state, count)` pairs. Duplicate states
    /// accumulate.
    fn from_iter<I: IntoIterator<Item = (u64, u64)>>(iter: I) -> Self {
        let mut table = FrequencyTable::new();
        for (state, count) in iter {
            table.add_cell(state, count);
        }
        table
    }
}

/// Projects one state through an ordered basis of operator bitmasks.
///
/// Bit `i` of the image is the parity of `state & basis[i]`.
///
/// ```
/// use mincomplex::transform_state;
///
/// assert_eq!(transform_state(0b01, &[0b11, 0b10]), 0b01);
/// assert_eq!(transform_state(0b11, &[0b11, 0b10]), 0b10);
/// ```
pub fn transform_state(state: u64, basis: &[u64]) -> u64 {
    let mut image = 0;
    for (i, &element) in basis.iter().enumerate() {
        if (state & element).count_ones() % 2 == 1 {
            image |= 1u64 << i;
        }
    }
    image
}

const BLOCKS_INLINE: usize = 8;

/// A candidate model: a list of block bitmasks over the basis elements.
///
/// Each block collects the basis elements that are modeled jointly; distinct
/// blocks are modeled independently of each other. A well-formed partition
/// has non-empty, pairwise-disjoint blocks; [`Partition::check`] verifies
/// that for externally supplied block lists. Partitions decoded from a
/// restricted-growth encoding are well formed by construction and skip the
/// check.
///
/// The basis elements covered by no block are unmodeled; each of them
/// multiplies every candidate's likelihood and evidence by the same fixed
/// factor of one half per observation.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Partition {
    blocks: SmallVec<[u64; BLOCKS_INLINE]>,
}

impl Partition {
    /// Creates a partition from a list of block bitmasks, kept in the given
    /// order.
    ///
    /// No validation happens here; call [`Partition::check`] before scoring
    /// blocks that did not come out of the enumerator.
    pub fn from_blocks(blocks: &[u64]) -> Partition {
        Partition {
            blocks: SmallVec::from_slice(blocks),
        }
    }

    /// The number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if the partition has no blocks at all.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns an iterator over the block bitmasks.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = u64> + ExactSizeIterator + '_ {
        self.blocks.iter().copied()
    }

    /// The blocks as a slice, in block-label order for decoded partitions.
    pub fn as_slice(&self) -> &[u64] {
        &self.blocks
    }

    /// The total number of basis elements covered by the blocks.
    pub fn rank(&self) -> u32 {
        self.blocks.iter().map(|mask| mask.count_ones()).sum()
    }

    /// Checks that the blocks are non-empty and pairwise disjoint, returning
    /// the verdict together with the rank.
    ///
    /// The blocks are disjoint exactly when the popcount of their union
    /// equals the sum of their individual popcounts.
    ///
    /// ```
    /// use mincomplex::Partition;
    ///
    /// assert_eq!(Partition::from_blocks(&[0b110, 0b001]).check(), (true, 3));
    /// assert_eq!(Partition::from_blocks(&[0b011, 0b001]).check(), (false, 3));
    /// assert_eq!(Partition::from_blocks(&[0b011, 0b000]).check(), (false, 2));
    /// ```
    pub fn check(&self) -> (bool, u32) {
        let mut union = 0u64;
        let mut rank = 0u32;
        let mut nonempty = true;
        for &mask in self.blocks.iter() {
            nonempty &= mask != 0;
            union |= mask;
            rank += mask.count_ones();
        }
        (nonempty && union.count_ones() == rank, rank)
    }

    /// Decodes a restricted-growth encoding into its partition.
    ///
    /// Position `i` of the encoding corresponds to bit `r - 1 - i` of the
    /// state, where `r` is the encoding length. In other words the encoding
    /// reads left to right from the most significant modeled bit down to the
    /// least, matching the textual convention used in search records. The
    /// blocks come out indexed by label.
    ///
    /// ```
    /// use mincomplex::Partition;
    ///
    /// let partition = Partition::from_restricted_growth(&[0, 0, 1]);
    /// assert_eq!(partition.as_slice(), &[0b110, 0b001]);
    /// assert_eq!(partition.rank(), 3);
    /// ```
    pub fn from_restricted_growth(encoding: &[u8]) -> Partition {
        let r = encoding.len();
        assert!(r >= 1 && r <= MAX_WIDTH as usize);
        let labels = *encoding.iter().max().unwrap() as usize + 1;
        let mut blocks = SmallVec::from_elem(0u64, labels);
        for (i, &label) in encoding.iter().enumerate() {
            blocks[label as usize] |= 1u64 << (r - 1 - i);
        }
        Partition { blocks }
    }

    /// Decodes a restricted-growth encoding in which label zero means
    /// "excluded from the model".
    ///
    /// Returns the full partition, padding block zero included, together
    /// with a flag telling whether the excluded positions form the one
    /// structurally valid pattern: a single contiguous run of trailing basis
    /// elements, which is a prefix of the encoding array since the array
    /// reads from the most significant bit down. Only encodings with a valid
    /// pattern can be reread as a sub-partition over the remaining basis
    /// prefix by dropping block zero.
    ///
    /// ```
    /// use mincomplex::Partition;
    ///
    /// let (partition, ok) = Partition::from_restricted_growth_with_gap(&[0, 0, 1, 1]);
    /// assert!(ok);
    /// assert_eq!(partition.as_slice(), &[0b1100, 0b0011]);
    ///
    /// // An excluded position between two modeled ones is not usable.
    /// let (_, ok) = Partition::from_restricted_growth_with_gap(&[0, 1, 0, 1]);
    /// assert!(!ok);
    /// ```
    pub fn from_restricted_growth_with_gap(encoding: &[u8]) -> (Partition, bool) {
        let partition = Partition::from_restricted_growth(encoding);
        let boundary = encoding
            .iter()
            .position(|&label| label != 0)
            .unwrap_or_else(|| encoding.len());
        let contiguous = encoding[boundary..].iter().all(|&label| label != 0);
        (partition, contiguous)
    }

    /// Re-encodes the partition as a canonical restricted-growth sequence
    /// over `width` positions, the inverse of
    /// [`Partition::from_restricted_growth`].
    ///
    /// Returns `None` unless the blocks form a partition of exactly the
    /// `width` lowest positions. Labels are assigned by first appearance
    /// scanning from the most significant position down, so the result is
    /// canonical no matter how the blocks were ordered.
    ///
    /// ```
    /// use mincomplex::Partition;
    ///
    /// let partition = Partition::from_blocks(&[0b001, 0b110]);
    /// assert_eq!(partition.to_restricted_growth(3), Some(vec![0, 0, 1]));
    /// assert_eq!(partition.to_restricted_growth(4), None);
    /// ```
    pub fn to_restricted_growth(&self, width: u32) -> Option<Vec<u8>> {
        let (valid, rank) = self.check();
        if !valid || rank != width {
            return None;
        }
        let union = self.blocks.iter().fold(0u64, |acc, &mask| acc | mask);
        if union != low_mask(width) {
            return None;
        }

        let mut assigned: SmallVec<[Option<u8>; BLOCKS_INLINE]> =
            SmallVec::from_elem(None, self.blocks.len());
        let mut next_label = 0u8;
        let mut encoding = vec![0u8; width as usize];
        for (i, slot) in encoding.iter_mut().enumerate() {
            let bit = 1u64 << (width as usize - 1 - i);
            let owner = self
                .blocks
                .iter()
                .position(|&mask| mask & bit != 0)
                .expect("every position is covered by exactly one block");
            let label = *assigned[owner].get_or_insert_with(|| {
                let label = next_label;
                next_label += 1;
                label
            });
            *slot = label;
        }
        Some(encoding)
    }
}

impl std::iter::FromIterator<u64> for Partition {
    /// Collects block bitmasks into a partition, kept in iteration order.
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Partition {
            blocks: SmallVec::from_iter(iter),
        }
    }
}

/// Generates every set partition of `{0, ..., r-1}` exactly once, in
/// canonical order, as restricted-growth encodings.
///
/// This is Algorithm H from Knuth, The Art of Computer Programming volume 4A,
/// section 7.2.1.5. An encoding is an array `a[0..r-1]` of block labels with
/// `a[0] = 0` and `a[i] <= 1 + max(a[0..i-1])`; such arrays are in one-to-one
/// correspondence with set partitions. The generator mutates the encoding in
/// place together with a companion array `b`, where `b[i]` is the largest
/// label position `i` may take given everything to its left. Memory use is
/// two arrays of length `r` no matter how many partitions get visited; the
/// number visited is the Bell number of `r`.
///
/// The sequence starts at the all-zero encoding, the single-block partition,
/// and is not restartable. Build a fresh generator for every search.
///
/// ```
/// use mincomplex::RestrictedGrowth;
///
/// let mut partitions = RestrictedGrowth::new(4);
/// let mut visited = 0;
/// while let Some(_encoding) = partitions.next_encoding() {
///     visited += 1;
/// }
/// assert_eq!(visited, 15); // the Bell number of 4
/// ```
pub struct RestrictedGrowth {
    a: Vec<u8>,
    b: Vec<u8>,
    started: bool,
    done: bool,
}

impl RestrictedGrowth {
    /// Creates a generator over `r` positions.
    ///
    /// # Panics
    ///
    /// This method panics unless `1 <= r <= MAX_WIDTH`.
    pub fn new(r: u32) -> RestrictedGrowth {
        assert!(r >= 1 && r <= MAX_WIDTH);
        RestrictedGrowth {
            a: vec![0; r as usize],
            b: vec![1; r as usize],
            started: false,
            done: false,
        }
    }

    /// The number of positions each encoding covers.
    pub fn width(&self) -> u32 {
        self.a.len() as u32
    }

    /// Steps to the next encoding and returns a view of it, or `None` once
    /// every partition has been visited.
    ///
    /// The returned slice borrows the generator's working array; decode it or
    /// copy it out before advancing again.
    pub fn next_encoding(&mut self) -> Option<&[u8]> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(&self.a);
        }

        let r = self.a.len();
        if r == 1 {
            // A single element only has the one partition.
            self.done = true;
            return None;
        }

        let last = r - 1;
        if self.a[last] < self.b[last] {
            self.a[last] += 1;
            return Some(&self.a);
        }

        // The tail is exhausted. Find the rightmost position left of it that
        // can still grow; position 0 is pinned at label 0, so reaching it
        // means every encoding has been visited.
        let mut pivot = last - 1;
        while pivot > 0 && self.a[pivot] == self.b[pivot] {
            pivot -= 1;
        }
        if pivot == 0 {
            self.done = true;
            return None;
        }

        // Increment the pivot. If it just reached its bound it opened a new
        // block, so everything to its right may now use one more label.
        self.a[pivot] += 1;
        let bound = self.b[pivot] + (self.a[pivot] == self.b[pivot]) as u8;
        for i in pivot + 1..r {
            self.a[i] = 0;
            self.b[i] = bound;
        }
        Some(&self.a)
    }
}

/// The parametric complexity of the saturated model on a block of `width`
/// basis elements, fit to `sample_size` observations.
///
/// A block of `width` binary elements spans a multinomial with `2^width`
/// cells and one fewer free parameters. This is the familiar first-order
/// complexity term of the Bayesian Information Criterion,
/// `(K / 2) ln(N / 2pi)` with `K = 2^width - 1`.
pub fn param_complexity(width: u32, sample_size: u64) -> f64 {
    assert!(width >= 1);
    let parameters = f64::from(width).exp2() - 1.0;
    parameters * ((sample_size as f64) / (2.0 * PI)).ln() / 2.0
}

/// The geometric complexity of the saturated model on a block of `width`
/// basis elements.
///
/// This is the logarithm of the Fisher information volume of the
/// `2^width`-cell multinomial family, the normalization of its Jeffreys
/// prior: `ln(pi^(2^(width-1)) / Gamma(2^(width-1)))`. Unlike the parametric
/// term it does not depend on the sample size.
pub fn geom_complexity(width: u32) -> f64 {
    assert!(width >= 1);
    let half_cells = f64::from(width - 1).exp2();
    half_cells * PI.ln() - ln_gamma(half_cells)
}

/// Everything the scorer has to say about one candidate partition.
///
/// The search itself only compares `log_evidence`; the other fields are
/// reported so that models can also be ranked by penalized likelihood by
/// hand.
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct ModelScore {
    /// Maximized log-likelihood of the partition, unmodeled variables
    /// included.
    pub log_likelihood: f64,
    /// Closed-form log-evidence of the partition under the Jeffreys prior.
    pub log_evidence: f64,
    /// Sum of the blocks' parametric complexity terms.
    pub param_complexity: f64,
    /// Sum of the blocks' geometric complexity terms.
    pub geom_complexity: f64,
    /// The number of basis elements covered by the partition's blocks.
    pub rank: u32,
}

impl ModelScore {
    /// The combined complexity penalty of the partition.
    pub fn total_complexity(&self) -> f64 {
        self.param_complexity + self.geom_complexity
    }

    /// The minimum-description-length style score, log-likelihood minus total
    /// complexity.
    ///
    /// Reported for comparison only. The search maximizes log-evidence, never
    /// this quantity.
    pub fn description_length(&self) -> f64 {
        self.log_likelihood - self.total_complexity()
    }
}

/// Holds the minimum state necessary for scoring many candidate partitions
/// against the same data.
///
/// The scorer borrows the frequency table read-only and precomputes the
/// sample size once. `width` is the total number of binary variables in the
/// system and `basis_size` is how many basis elements the table is expressed
/// over; candidates may only use the `basis_size` low bits, and every basis
/// element left uncovered by a candidate, along with the `width - basis_size`
/// variables outside the basis, costs the fixed unmodeled factor.
#[derive(Debug)]
pub struct ModelScorer<'a> {
    table: &'a FrequencyTable,
    width: u32,
    basis_size: u32,
    sample_size: u64,
}

impl<'a> ModelScorer<'a> {
    /// Creates a scorer for the given table.
    ///
    /// Rejects out-of-range dimensions and any observed state that does not
    /// fit in the declared basis before any scoring can happen.
    ///
    /// ```
    /// use mincomplex::{FrequencyTable, ModelScorer};
    ///
    /// let mut table = FrequencyTable::new();
    /// table.add_cell(0b000, 2).add_cell(0b011, 1).add_cell(0b111, 1);
    ///
    /// let scorer = ModelScorer::new(&table, 3, 3).unwrap();
    /// assert_eq!(scorer.sample_size(), 4);
    /// ```
    pub fn new(
        table: &'a FrequencyTable,
        width: u32,
        basis_size: u32,
    ) -> Result<ModelScorer<'a>, ModelError> {
        if width == 0 || width > MAX_WIDTH {
            return Err(ModelError::WidthOutOfRange { width });
        }
        if basis_size == 0 || basis_size > width {
            return Err(ModelError::BasisTooLarge { basis_size, width });
        }
        if table.is_empty() {
            return Err(ModelError::EmptyTable);
        }
        for (state, _) in table.iter() {
            if state & !low_mask(basis_size) != 0 {
                return Err(ModelError::StateOutOfRange { state, basis_size });
            }
        }
        let sample_size = table.sample_size();
        Ok(ModelScorer {
            table,
            width,
            basis_size,
            sample_size,
        })
    }

    /// The total number of observations in the table.
    pub fn sample_size(&self) -> u64 {
        self.sample_size
    }

    /// The total number of binary variables in the system.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// The number of basis elements the table is expressed over.
    pub fn basis_size(&self) -> u32 {
        self.basis_size
    }

    fn checked_tallies(&self, mask: u64) -> Result<(BTreeMap<u64, u64>, u32), ModelError> {
        if mask == 0 {
            return Err(ModelError::EmptyBlock);
        }
        if mask & !low_mask(self.basis_size) != 0 {
            return Err(ModelError::BlockOutOfRange {
                mask,
                basis_size: self.basis_size,
            });
        }
        Ok((self.table.project(mask), mask.count_ones()))
    }

    // Both per-block sums run over the aggregated counts of the block's
    // reduced states. An aggregated count of zero, or counts that fail to sum
    // back to N, would mean the table broke its own invariants; scoring past
    // that would corrupt every result downstream, so it stops the program.
    fn likelihood_sum(&self, tallies: &BTreeMap<u64, u64>) -> f64 {
        let total = self.sample_size as f64;
        let mut seen = 0u64;
        let mut log_l = 0.0;
        for (&reduced, &count) in tallies.iter() {
            assert!(
                count > 0,
                "zero count aggregated for reduced state {}",
                reduced
            );
            seen += count;
            let count = count as f64;
            log_l += count * (count / total).ln();
        }
        assert_eq!(seen, self.sample_size, "aggregated counts do not sum to N");
        log_l
    }

    // The evidence of one block is the marginal likelihood of its saturated
    // multinomial under a Jeffreys prior, one Beta(1/2, 1/2) pseudocount per
    // cell. Integrating the multinomial against that prior gives
    //
    //   prod_s Gamma(k_s + 1/2) / Gamma(1/2)  *  Gamma(2^(m-1)) / Gamma(N + 2^(m-1))
    //
    // over the observed reduced states s. Each Gamma(1/2) is sqrt(pi), hence
    // the D/2 factor of ln(pi) with D the number of observed reduced states.
    // The cells that were never observed contribute Gamma(1/2)/Gamma(1/2) and
    // cancel out, so they must not be added separately.
    fn evidence_sum(&self, tallies: &BTreeMap<u64, u64>, block_width: u32) -> f64 {
        let mut seen = 0u64;
        let mut log_e = 0.0;
        for (&reduced, &count) in tallies.iter() {
            assert!(
                count > 0,
                "zero count aggregated for reduced state {}",
                reduced
            );
            seen += count;
            log_e += ln_gamma(count as f64 + 0.5);
        }
        assert_eq!(seen, self.sample_size, "aggregated counts do not sum to N");

        let half_cells = f64::from(block_width - 1).exp2();
        log_e + ln_gamma(half_cells) - (tallies.len() as f64 / 2.0) * PI.ln()
            - ln_gamma(self.sample_size as f64 + half_cells)
    }

    // Every variable a candidate leaves unmodeled is taken as a fair coin,
    // which costs ln 2 per observation in both likelihood and evidence.
    fn unmodeled_penalty(&self, rank: u32) -> f64 {
        assert!(
            rank <= self.width,
            "partition rank exceeds the variable count"
        );
        self.sample_size as f64 * f64::from(self.width - rank) * LN_2
    }

    /// The maximized log-likelihood of the saturated model on one block.
    ///
    /// This is `sum_s k_s ln(k_s / N)` over the block's reduced states. The
    /// contribution of unmodeled variables is not included here; whole-model
    /// numbers come from [`ModelScorer::score`].
    pub fn block_log_likelihood(&self, mask: u64) -> Result<f64, ModelError> {
        let (tallies, _) = self.checked_tallies(mask)?;
        Ok(self.likelihood_sum(&tallies))
    }

    /// The closed-form log-evidence of the saturated model on one block
    /// under the Jeffreys prior.
    pub fn block_log_evidence(&self, mask: u64) -> Result<f64, ModelError> {
        let (tallies, block_width) = self.checked_tallies(mask)?;
        Ok(self.evidence_sum(&tallies, block_width))
    }

    /// The log-likelihood of a whole partition: the blocks' sums plus the
    /// unmodeled-variable penalty.
    pub fn partition_log_likelihood(&self, partition: &Partition) -> Result<f64, ModelError> {
        let mut log_l = 0.0;
        let mut rank = 0;
        for mask in partition.iter() {
            log_l += self.block_log_likelihood(mask)?;
            rank += mask.count_ones();
        }
        Ok(log_l - self.unmodeled_penalty(rank))
    }

    /// The log-evidence of a whole partition, the quantity every search
    /// maximizes.
    pub fn partition_log_evidence(&self, partition: &Partition) -> Result<f64, ModelError> {
        let mut log_e = 0.0;
        let mut rank = 0;
        for mask in partition.iter() {
            log_e += self.block_log_evidence(mask)?;
            rank += mask.count_ones();
        }
        Ok(log_e - self.unmodeled_penalty(rank))
    }

    /// Evaluates everything at once: likelihood, evidence, both complexity
    /// terms and the rank.
    ///
    /// Blocks are validated for emptiness and range, but disjointness is the
    /// caller's contract; run [`Partition::check`] first on any partition
    /// that was supplied by hand.
    pub fn score(&self, partition: &Partition) -> Result<ModelScore, ModelError> {
        let mut score = ModelScore {
            log_likelihood: 0.0,
            log_evidence: 0.0,
            param_complexity: 0.0,
            geom_complexity: 0.0,
            rank: 0,
        };
        for mask in partition.iter() {
            let (tallies, block_width) = self.checked_tallies(mask)?;
            score.log_likelihood += self.likelihood_sum(&tallies);
            score.log_evidence += self.evidence_sum(&tallies, block_width);
            score.param_complexity += param_complexity(block_width, self.sample_size);
            score.geom_complexity += geom_complexity(block_width);
            score.rank += block_width;
        }
        let penalty = self.unmodeled_penalty(score.rank);
        score.log_likelihood -= penalty;
        score.log_evidence -= penalty;
        Ok(score)
    }
}

/// The empirical and model probability of one observed state.
#[derive(Clone, Copy, Debug)]
pub struct StateProbability {
    /// The observed state, in the basis the table is expressed in.
    pub state: u64,
    /// How often the state was observed, as a fraction of the sample.
    pub empirical: f64,
    /// The probability the partitioned model assigns to the state.
    pub model: f64,
}

/// Computes, for every observed state, its empirical probability and the
/// probability assigned by the model defined by `partition`.
///
/// Under the partitioned model the probability of a state factors into one
/// saturated term per block times one half per unmodeled variable. The result
/// is sorted by state.
///
/// Unlike the search paths this entry point is meant for partitions chosen by
/// hand, so it validates the partition first and refuses anything that is not
/// one.
pub fn state_probabilities(
    scorer: &ModelScorer<'_>,
    partition: &Partition,
) -> Result<Vec<StateProbability>, ModelError> {
    let (valid, rank) = partition.check();
    if !valid {
        return Err(ModelError::NotAPartition);
    }

    let mut block_tallies = Vec::with_capacity(partition.len());
    for mask in partition.iter() {
        let (tallies, _) = scorer.checked_tallies(mask)?;
        block_tallies.push((mask, tallies));
    }

    let total = scorer.sample_size() as f64;
    let unmodeled = f64::from(scorer.width() - rank).exp2().recip();
    let mut probabilities: Vec<StateProbability> = scorer
        .table
        .iter()
        .map(|(state, count)| {
            let mut model = unmodeled;
            for (mask, tallies) in block_tallies.iter() {
                model *= tallies[&(state & mask)] as f64 / total;
            }
            StateProbability {
                state,
                empirical: count as f64 / total,
                model,
            }
        })
        .collect();
    probabilities.sort_unstable_by_key(|p| p.state);
    Ok(probabilities)
}

/// Whether a logged candidate beat the running best or matched it exactly.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordOutcome {
    /// The candidate's log-evidence was strictly greater than the best so
    /// far.
    NewBest,
    /// The candidate's log-evidence was exactly equal to the best so far.
    Tie,
}

impl RecordOutcome {
    /// The tag this outcome carries in the textual log.
    pub fn tag(&self) -> &'static str {
        match self {
            RecordOutcome::NewBest => "New",
            RecordOutcome::Tie => "Idem",
        }
    }
}

/// One entry of the search's record log.
///
/// An entry is appended whenever a candidate beats or exactly ties the
/// running best. The encoding is digit-per-position, most significant
/// position first, with a literal `x` for every position outside the modeled
/// prefix or excluded from the candidate.
#[derive(Clone, Debug)]
pub struct SearchRecord {
    /// Textual form of the candidate's encoding.
    pub encoding: String,
    /// The candidate's log-evidence.
    pub log_evidence: f64,
    /// Whether this was a new best or a tie.
    pub outcome: RecordOutcome,
    /// The number of candidates visited when this entry was made, starting
    /// at 1.
    pub visit: u64,
}

impl fmt::Display for SearchRecord {
    /// Renders the record in the reference line layout:
    /// `ENCODING\t LOGE \t TAG \t VISIT`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t {} \t {} \t {}",
            self.encoding,
            self.log_evidence,
            self.outcome.tag(),
            self.visit
        )
    }
}

/// Follows the best log-evidence over a stream of scored candidates.
///
/// The tracker starts from the score of the trivial single-block partition
/// and then watches every candidate a search visits. A strictly better
/// candidate replaces the held models and is logged as
/// [`RecordOutcome::NewBest`]; a candidate whose score is exactly equal to
/// the best is appended and logged as [`RecordOutcome::Tie`], so equally good
/// models are never lost. Comparison is exact floating-point equality on
/// purpose.
///
/// Trackers are cheap and single-use: one per search invocation, never
/// shared.
#[derive(Clone, Debug)]
pub struct BestTracker {
    best_score: f64,
    models: Vec<Partition>,
    visited: u64,
    records: Vec<SearchRecord>,
}

impl BestTracker {
    /// Creates a tracker whose bar starts at `initial_score`.
    pub fn new(initial_score: f64) -> BestTracker {
        BestTracker {
            best_score: initial_score,
            models: Vec::new(),
            visited: 0,
            records: Vec::new(),
        }
    }

    /// Feeds one scored candidate to the tracker.
    ///
    /// `encoding` is only rendered when the candidate actually produces a log
    /// entry, which keeps the common no-record case free of formatting work.
    pub fn observe<F>(&mut self, candidate: &Partition, log_evidence: f64, encoding: F)
    where
        F: FnOnce() -> String,
    {
        self.visited += 1;
        let outcome = if log_evidence > self.best_score {
            self.best_score = log_evidence;
            self.models.clear();
            RecordOutcome::NewBest
        } else if log_evidence == self.best_score {
            RecordOutcome::Tie
        } else {
            return;
        };
        self.models.push(candidate.clone());
        self.records.push(SearchRecord {
            encoding: encoding(),
            log_evidence,
            outcome,
            visit: self.visited,
        });
    }

    /// The best log-evidence seen so far.
    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    /// How many candidates have been observed.
    pub fn visited(&self) -> u64 {
        self.visited
    }

    /// Every partition currently holding the best score, oldest first. The
    /// last one is the search's representative answer.
    pub fn models(&self) -> &[Partition] {
        &self.models
    }

    /// The record log accumulated so far.
    pub fn records(&self) -> &[SearchRecord] {
        &self.records
    }
}

/// What a search hands back: the winning models and how it got there.
#[derive(Clone, Debug)]
pub struct SearchOutcome {
    /// Full scores of the representative best partition.
    pub score: ModelScore,
    /// Every partition that holds the best log-evidence, oldest first; ties
    /// are all retained.
    pub models: Vec<Partition>,
    /// The total number of candidates scored.
    pub visited: u64,
    /// The log of record-setting and tying candidates, in visit order.
    pub records: Vec<SearchRecord>,
}

impl SearchOutcome {
    /// The representative best partition, the most recently recorded one.
    pub fn best(&self) -> &Partition {
        self.models
            .last()
            .expect("every search scores the trivial partition")
    }
}

fn prefix_encoding_string(encoding: &[u8], padding: u32) -> String {
    let mut out = String::with_capacity(padding as usize + encoding.len());
    for _ in 0..padding {
        out.push('x');
    }
    for &label in encoding {
        write!(out, "{}", label).unwrap();
    }
    out
}

fn subset_encoding_string(encoding: &[u8]) -> String {
    let mut out = String::with_capacity(encoding.len());
    for &label in encoding {
        if label == 0 {
            out.push('x');
        } else {
            write!(out, "{}", label - 1).unwrap();
        }
    }
    out
}

fn check_rank(rank: u32, basis_size: u32) -> Result<(), ModelError> {
    if rank < 1 || rank > basis_size {
        Err(ModelError::RankOutOfRange { rank, basis_size })
    } else {
        Ok(())
    }
}

// Enumerates every partition of the first `rank` basis elements and feeds it
// to the tracker. Record lines pad the positions beyond the modeled prefix
// with `x`.
fn run_rank(
    scorer: &ModelScorer<'_>,
    rank: u32,
    tracker: &mut BestTracker,
) -> Result<(), ModelError> {
    let padding = scorer.basis_size() - rank;
    let mut encodings = RestrictedGrowth::new(rank);
    while let Some(encoding) = encodings.next_encoding() {
        let candidate = Partition::from_restricted_growth(encoding);
        let log_evidence = scorer.partition_log_evidence(&candidate)?;
        tracker.observe(&candidate, log_evidence, || {
            prefix_encoding_string(encoding, padding)
        });
    }
    Ok(())
}

fn finish(scorer: &ModelScorer<'_>, tracker: BestTracker) -> Result<SearchOutcome, ModelError> {
    let best = tracker
        .models
        .last()
        .expect("every search scores the trivial partition");
    let score = scorer.score(best)?;
    Ok(SearchOutcome {
        score,
        models: tracker.models,
        visited: tracker.visited,
        records: tracker.records,
    })
}

/// Finds the best model among every partition of exactly the first `rank`
/// basis elements.
///
/// All Bell(rank) candidates are scored; each covers the whole prefix, so
/// each has rank exactly `rank`. The rank must satisfy
/// `1 <= rank <= basis_size` and is rejected before anything is enumerated.
///
/// ```
/// use mincomplex::{search_fixed_rank, FrequencyTable, ModelScorer};
///
/// let mut table = FrequencyTable::new();
/// table.add_cell(0b000, 2).add_cell(0b011, 1).add_cell(0b111, 1);
/// let scorer = ModelScorer::new(&table, 3, 3).unwrap();
///
/// let outcome = search_fixed_rank(&scorer, 3).unwrap();
/// assert_eq!(outcome.visited, 5); // the Bell number of 3
/// assert_eq!(outcome.score.rank, 3);
/// ```
pub fn search_fixed_rank(scorer: &ModelScorer<'_>, rank: u32) -> Result<SearchOutcome, ModelError> {
    check_rank(rank, scorer.basis_size())?;
    let trivial = Partition::from_blocks(&[low_mask(rank)]);
    let mut tracker = BestTracker::new(scorer.partition_log_evidence(&trivial)?);
    run_rank(scorer, rank, &mut tracker)?;
    finish(scorer, tracker)
}

/// Finds the best model among every partition of every basis prefix of size
/// 1 through `rank`.
///
/// The subset tested at size k is always the first k basis elements in the
/// caller's order, never an arbitrary k-subset, which bounds the total work
/// to the sum of the first `rank` Bell numbers. One best is tracked globally
/// across all sizes and the visit counter runs through the whole sweep.
pub fn search_all_ranks_ordered(
    scorer: &ModelScorer<'_>,
    rank: u32,
) -> Result<SearchOutcome, ModelError> {
    check_rank(rank, scorer.basis_size())?;
    let trivial = Partition::from_blocks(&[1]);
    let mut tracker = BestTracker::new(scorer.partition_log_evidence(&trivial)?);
    for k in 1..=rank {
        run_rank(scorer, k, &mut tracker)?;
    }
    finish(scorer, tracker)
}

/// Finds the best model among partitions of any subset of basis elements of
/// size up to `rank`, by enumerating partitions of the full basis with block
/// zero read as "excluded".
///
/// Every partition of all `basis_size` elements is generated. When the
/// excluded positions form a contiguous run of trailing basis elements, the
/// leftover blocks form a genuine sub-partition and are scored as a candidate
/// of their own, with the exclusions shown as `x` in record lines. When
/// `rank` equals the basis size, the undivided partition, padding block and
/// all, is additionally scored as a full-rank candidate. This sweeps a much
/// larger encoding space than [`search_all_ranks_ordered`] and discards most
/// of it, in exchange for covering sub-partitions the ordered sweep cannot
/// reach.
pub fn search_all_ranks_any_subset(
    scorer: &ModelScorer<'_>,
    rank: u32,
) -> Result<SearchOutcome, ModelError> {
    let basis_size = scorer.basis_size();
    check_rank(rank, basis_size)?;
    let trivial = Partition::from_blocks(&[low_mask(rank)]);
    let mut tracker = BestTracker::new(scorer.partition_log_evidence(&trivial)?);

    let mut encodings = RestrictedGrowth::new(basis_size);
    while let Some(encoding) = encodings.next_encoding() {
        let (full, gap_ok) = Partition::from_restricted_growth_with_gap(encoding);

        if rank == basis_size {
            let log_evidence = scorer.partition_log_evidence(&full)?;
            tracker.observe(&full, log_evidence, || prefix_encoding_string(encoding, 0));
        }

        if gap_ok {
            let modeled = Partition::from_blocks(&full.as_slice()[1..]);
            let modeled_rank = modeled.rank();
            if modeled_rank >= 1 && modeled_rank <= rank {
                let log_evidence = scorer.partition_log_evidence(&modeled)?;
                tracker.observe(&modeled, log_evidence, || subset_encoding_string(encoding));
            }
        }
    }
    finish(scorer, tracker)
}
