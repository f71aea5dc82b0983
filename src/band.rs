//! Half-open numeric bands, for grouping ages and similar measurements.
use serde::Serialize;
use std::fmt;

/// Band where lower bound is inclusive, upper bound is exclusive or unbounded.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Band {
    from: f64,
    to: Option<f64>,
}

impl Band {
    /// # Panics
    ///
    /// Panics if `to` is not above `from`.
    pub fn new(from: f64, to: Option<f64>) -> Self {
        if let Some(to) = to {
            assert!(from < to, "bands must go from low to high");
        }
        Band { from, to }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.from && self.to.map_or(true, |to| value < to)
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.to {
            Some(to) => write!(f, "{}-{}", self.from, to),
            None => write!(f, "{}+", self.from),
        }
    }
}

/// Contiguous bands built from a list of cut points, the last one open-ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bands {
    bands: Vec<Band>,
}

impl Bands {
    /// `Bands::from_cuts(&[0., 18., 35.])` gives `0-18`, `18-35`, `35+`.
    pub fn from_cuts(cuts: &[f64]) -> Self {
        let mut bands = cuts
            .windows(2)
            .map(|w| Band::new(w[0], Some(w[1])))
            .collect::<Vec<_>>();
        if let Some(last) = cuts.last() {
            bands.push(Band::new(*last, None));
        }
        Bands { bands }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Band> + '_ {
        self.bands.iter()
    }

    /// Count values per band. Values below the first band are counted as unbanded.
    pub fn bucket(&self, values: impl IntoIterator<Item = f64>) -> BandCounts {
        let mut counts = vec![0; self.bands.len()];
        let mut unbanded = 0;
        for value in values {
            match self.bands.iter().position(|band| band.contains(value)) {
                Some(idx) => counts[idx] += 1,
                None => unbanded += 1,
            }
        }
        BandCounts {
            counts: self.bands.iter().copied().zip(counts).collect(),
            unbanded,
        }
    }
}

/// Bands with their value counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandCounts {
    pub counts: Vec<(Band, usize)>,
    pub unbanded: usize,
}

impl BandCounts {
    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, count)| count).sum::<usize>() + self.unbanded
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bucket_edges() {
        let bands = Bands::from_cuts(&[0., 18., 35., 50., 65., 80.]);
        assert_eq!(bands.iter().count(), 6);
        let counts = bands.bucket([0., 17.9, 18., 34., 50., 80., 101., -1.]);
        let per_band = counts.counts.iter().map(|(_, c)| *c).collect::<Vec<_>>();
        assert_eq!(per_band, vec![2, 2, 0, 1, 0, 2]);
        assert_eq!(counts.unbanded, 1);
        assert_eq!(counts.total(), 8);
        assert_eq!(counts.counts[5].0.to_string(), "80+");
        assert_eq!(counts.counts[1].0.to_string(), "18-35");
    }

    #[test]
    #[should_panic]
    fn inverted_band() {
        Band::new(5., Some(1.));
    }
}
