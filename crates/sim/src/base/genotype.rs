use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{PopulationError, Result};

const WORD_BITS: usize = u64::BITS as usize;

/// Spin of locus `locus` in the integer-encoded genotype `genotype`:
/// `+1.0` if the allele is 1, `-1.0` otherwise.
#[inline]
pub fn spin(genotype: usize, locus: usize) -> f64 {
    if (genotype >> locus) & 1 == 1 {
        1.0
    } else {
        -1.0
    }
}

/// Product of the spins of all loci in `subset` for genotype `genotype`.
///
/// Each locus of the subset that carries allele 0 contributes a factor -1.
#[inline]
pub fn spin_product(genotype: usize, subset: usize) -> f64 {
    if (subset & !genotype).count_ones() % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

/// A haploid genome of `L` biallelic loci stored as packed bits.
///
/// Bit `i` holds the allele at locus `i`. Bits past the last locus are always
/// zero so that equality, hashing and popcounts only see real loci.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Genotype {
    words: Vec<u64>,
    loci: usize,
}

impl Genotype {
    /// The wildtype genome (all alleles 0).
    pub fn new(loci: usize) -> Self {
        Self {
            words: vec![0; loci.div_ceil(WORD_BITS)],
            loci,
        }
    }

    /// A genome carrying allele 1 at every locus.
    pub fn ones(loci: usize) -> Self {
        let mut g = Self {
            words: vec![u64::MAX; loci.div_ceil(WORD_BITS)],
            loci,
        };
        g.clear_tail();
        g
    }

    /// A genome carrying allele 1 exactly at the listed loci.
    pub fn from_loci(loci: usize, derived: &[usize]) -> Result<Self> {
        let mut g = Self::new(loci);
        for &locus in derived {
            PopulationError::check_locus(locus, loci)?;
            g.set(locus, true);
        }
        Ok(g)
    }

    /// Build a genome from an integer index (bit `i` is locus `i`).
    ///
    /// Fails if `index` has bits set at or beyond `loci`.
    pub fn from_index(index: usize, loci: usize) -> Result<Self> {
        if loci < usize::BITS as usize && index >> loci != 0 {
            return Err(PopulationError::GenotypeOutOfRange {
                genotype: index,
                loci,
            });
        }
        let mut g = Self::new(loci);
        if !g.words.is_empty() {
            g.words[0] = index as u64;
        }
        Ok(g)
    }

    /// Build a genome from a slice of alleles.
    pub fn from_alleles(alleles: &[bool]) -> Self {
        let mut g = Self::new(alleles.len());
        for (locus, &allele) in alleles.iter().enumerate() {
            if allele {
                g.set(locus, true);
            }
        }
        g
    }

    /// Draw a uniformly random genome, mostly used as a free-recombination mask.
    pub fn random<R: Rng + ?Sized>(loci: usize, rng: &mut R) -> Self {
        let mut g = Self {
            words: (0..loci.div_ceil(WORD_BITS)).map(|_| rng.random()).collect(),
            loci,
        };
        g.clear_tail();
        g
    }

    /// A genome with allele 1 on loci `0..end` and 0 elsewhere.
    pub fn prefix(loci: usize, end: usize) -> Self {
        let end = end.min(loci);
        let mut g = Self::new(loci);
        let full = end / WORD_BITS;
        for w in &mut g.words[..full] {
            *w = u64::MAX;
        }
        let rem = end % WORD_BITS;
        if rem > 0 {
            g.words[full] = (1u64 << rem) - 1;
        }
        g
    }

    /// Integer index of this genome. Fails when the genome does not fit a `usize`.
    pub fn to_index(&self) -> Result<usize> {
        let fits = self.loci <= usize::BITS as usize || self.words.iter().skip(1).all(|&w| w == 0);
        if !fits {
            return Err(PopulationError::InvalidArgument(format!(
                "genotype with {} loci does not fit an integer index",
                self.loci
            )));
        }
        Ok(self.words.first().copied().unwrap_or(0) as usize)
    }

    /// Number of loci.
    #[inline]
    pub fn len(&self) -> usize {
        self.loci
    }

    /// `true` for a zero-locus genome.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.loci == 0
    }

    /// Packed storage, 64 loci per word, least significant bit first.
    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Allele at `locus`. Panics if `locus >= len()`.
    #[inline]
    pub fn get(&self, locus: usize) -> bool {
        assert!(locus < self.loci, "locus {locus} out of range for {} loci", self.loci);
        (self.words[locus / WORD_BITS] >> (locus % WORD_BITS)) & 1 == 1
    }

    /// Set the allele at `locus`. Panics if `locus >= len()`.
    #[inline]
    pub fn set(&mut self, locus: usize, allele: bool) {
        assert!(locus < self.loci, "locus {locus} out of range for {} loci", self.loci);
        let bit = 1u64 << (locus % WORD_BITS);
        if allele {
            self.words[locus / WORD_BITS] |= bit;
        } else {
            self.words[locus / WORD_BITS] &= !bit;
        }
    }

    /// Flip the allele at `locus`. Panics if `locus >= len()`.
    #[inline]
    pub fn flip(&mut self, locus: usize) {
        assert!(locus < self.loci, "locus {locus} out of range for {} loci", self.loci);
        self.words[locus / WORD_BITS] ^= 1u64 << (locus % WORD_BITS);
    }

    /// Spin (+1 / -1) at `locus`.
    #[inline]
    pub fn spin(&self, locus: usize) -> f64 {
        if self.get(locus) {
            1.0
        } else {
            -1.0
        }
    }

    /// Product of spins over `loci`.
    pub fn spin_product(&self, loci: &[usize]) -> f64 {
        let minus = loci.iter().filter(|&&l| !self.get(l)).count();
        if minus % 2 == 0 {
            1.0
        } else {
            -1.0
        }
    }

    /// Number of loci carrying allele 1 (divergence from the wildtype).
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate over the loci carrying allele 1 in increasing order.
    pub fn derived_loci(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            let mut w = word;
            std::iter::from_fn(move || {
                if w == 0 {
                    return None;
                }
                let bit = w.trailing_zeros() as usize;
                w &= w - 1;
                Some(wi * WORD_BITS + bit)
            })
        })
    }

    /// Number of loci at which `self` and `other` differ.
    ///
    /// Genomes of different length are compared over their common prefix.
    #[inline]
    pub fn hamming_distance(&self, other: &Self) -> usize {
        self.words
            .iter()
            .zip(&other.words)
            .map(|(a, b)| (a ^ b).count_ones() as usize)
            .sum()
    }

    /// Hamming distance restricted to loci `start, start + every, ...` inside
    /// each half-open chunk `[start, end)`.
    ///
    /// Models marker subsampling along the genome.
    pub fn hamming_distance_in_chunks(
        &self,
        other: &Self,
        chunks: &[(usize, usize)],
        every: usize,
    ) -> Result<usize> {
        if every == 0 {
            return Err(PopulationError::InvalidArgument(
                "stride for chunked Hamming distance must be positive".into(),
            ));
        }
        let loci = self.loci.min(other.loci);
        let mut distance = 0;
        for &(start, end) in chunks {
            if start > end || end > loci {
                return Err(PopulationError::InvalidArgument(format!(
                    "chunk [{start}, {end}) invalid for {loci} loci"
                )));
            }
            distance += (start..end)
                .step_by(every)
                .filter(|&l| self.get(l) != other.get(l))
                .count();
        }
        Ok(distance)
    }

    /// Combine two parents: loci set in `mask` come from `first`, the rest
    /// from `second`.
    pub fn recombine(first: &Self, second: &Self, mask: &Self) -> Self {
        debug_assert_eq!(first.loci, second.loci);
        debug_assert_eq!(first.loci, mask.loci);
        let words = first
            .words
            .iter()
            .zip(&second.words)
            .zip(&mask.words)
            .map(|((a, b), m)| (a & m) | (b & !m))
            .collect();
        Self {
            words,
            loci: first.loci,
        }
    }

    fn clear_tail(&mut self) {
        let rem = self.loci % WORD_BITS;
        if rem > 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << rem) - 1;
            }
        }
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for locus in 0..self.loci {
            f.write_str(if self.get(locus) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_spin_helpers() {
        assert_eq!(spin(0b101, 0), 1.0);
        assert_eq!(spin(0b101, 1), -1.0);
        // subset {0,1}: locus 1 is 0 -> one minus sign
        assert_eq!(spin_product(0b101, 0b011), -1.0);
        assert_eq!(spin_product(0b101, 0b101), 1.0);
        assert_eq!(spin_product(0b000, 0b110), 1.0);
        assert_eq!(spin_product(0b111, 0), 1.0);
    }

    #[test]
    fn test_new_is_wildtype() {
        let g = Genotype::new(130);
        assert_eq!(g.len(), 130);
        assert_eq!(g.count_ones(), 0);
        assert_eq!(g.words().len(), 3);
    }

    #[test]
    fn test_ones_clears_tail() {
        let g = Genotype::ones(70);
        assert_eq!(g.count_ones(), 70);
        assert_eq!(g.words()[1], (1u64 << 6) - 1);
    }

    #[test]
    fn test_set_get_flip() {
        let mut g = Genotype::new(100);
        g.set(65, true);
        assert!(g.get(65));
        assert_eq!(g.spin(65), 1.0);
        g.flip(65);
        assert!(!g.get(65));
        g.flip(3);
        assert!(g.get(3));
        assert_eq!(g.count_ones(), 1);
    }

    #[test]
    #[should_panic]
    fn test_get_out_of_range_panics() {
        let g = Genotype::new(10);
        g.get(10);
    }

    #[test]
    fn test_index_round_trip() {
        let g = Genotype::from_index(0b1011, 6).unwrap();
        assert!(g.get(0) && g.get(1) && !g.get(2) && g.get(3));
        assert_eq!(g.to_index().unwrap(), 0b1011);
        assert!(Genotype::from_index(0b1000000, 6).is_err());
    }

    #[test]
    fn test_from_loci() {
        let g = Genotype::from_loci(200, &[0, 64, 199]).unwrap();
        assert_eq!(g.derived_loci().collect::<Vec<_>>(), vec![0, 64, 199]);
        assert!(Genotype::from_loci(10, &[10]).is_err());
    }

    #[test]
    fn test_hamming_distance() {
        let a = Genotype::from_loci(150, &[1, 70, 140]).unwrap();
        let b = Genotype::from_loci(150, &[1, 71, 149]).unwrap();
        assert_eq!(a.hamming_distance(&b), 4);
        assert_eq!(a.hamming_distance(&a), 0);
    }

    #[test]
    fn test_hamming_distance_in_chunks() {
        let a = Genotype::new(20);
        let b = Genotype::from_loci(20, &[0, 2, 3, 10, 15]).unwrap();
        // Every locus of [0, 20)
        assert_eq!(a.hamming_distance_in_chunks(&b, &[(0, 20)], 1).unwrap(), 5);
        // Even loci only
        assert_eq!(a.hamming_distance_in_chunks(&b, &[(0, 20)], 2).unwrap(), 3);
        // Two chunks
        assert_eq!(
            a.hamming_distance_in_chunks(&b, &[(0, 4), (14, 16)], 1).unwrap(),
            4
        );
        assert!(a.hamming_distance_in_chunks(&b, &[(0, 21)], 1).is_err());
        assert!(a.hamming_distance_in_chunks(&b, &[(0, 5)], 0).is_err());
    }

    #[test]
    fn test_prefix_and_recombine() {
        let a = Genotype::ones(100);
        let b = Genotype::new(100);
        let mask = Genotype::prefix(100, 66);
        let child = Genotype::recombine(&a, &b, &mask);
        assert_eq!(child.count_ones(), 66);
        assert!(child.get(65));
        assert!(!child.get(66));
    }

    #[test]
    fn test_random_respects_length() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        for _ in 0..20 {
            let g = Genotype::random(67, &mut rng);
            assert!(g.count_ones() <= 67);
            assert_eq!(g.words()[1] >> 3, 0);
        }
    }

    #[test]
    fn test_display() {
        let g = Genotype::from_alleles(&[true, false, true, true]);
        assert_eq!(g.to_string(), "1011");
    }
}
