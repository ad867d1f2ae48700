// This file contains the DistanceMatrix struct and the code for filling it: either by running a
// similarity metric over every pair of profiles or by loading a precomputed table.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of srnaclust. srnaclust is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. srnaclust
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with srnaclust. If not, see <http://www.gnu.org/licenses/>.

use clap::ValueEnum;
use fxhash::FxHashMap;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::fmt;
use std::fs::File;
use std::io;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::dtw::{adtw, ndtw_similarity, xdtw};
use crate::misc::{load_file_lines, quit_with_error, spinner};
use crate::profile::Profile;
use crate::xcorr::{nxcorr, Padding};


#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimilarityMetric {
    Xcorr,      // lag-0 cross-correlation, shorter profile padded with noise
    XcorrZero,  // lag-0 cross-correlation, shorter profile padded with zeros
    Dtw,        // correlation along the peak-normalised DTW path
    Ndtw,       // 1 - peak-normalised DTW cost relative to the larger peak
    Xdtw,       // banded DTW maximising the running cross-correlation
}

impl SimilarityMetric {
    pub fn similarity(&self, a: &Profile, b: &Profile) -> f64 {
        match self {
            SimilarityMetric::Xcorr     => nxcorr(a, b, Padding::Noise),
            SimilarityMetric::XcorrZero => nxcorr(a, b, Padding::Zero),
            SimilarityMetric::Dtw       => adtw(a, b),
            SimilarityMetric::Ndtw      => ndtw_similarity(a, b),
            SimilarityMetric::Xdtw      => xdtw(a, b),
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityMetric::Xcorr     => write!(f, "xcorr"),
            SimilarityMetric::XcorrZero => write!(f, "xcorr-zero"),
            SimilarityMetric::Dtw       => write!(f, "dtw"),
            SimilarityMetric::Ndtw      => write!(f, "ndtw"),
            SimilarityMetric::Xdtw      => write!(f, "xdtw"),
        }
    }
}


pub fn similarity_to_distance(similarity: f64) -> f64 {
    // Anticorrelated profiles are no more distant than uncorrelated ones.
    (1.0 - similarity.max(0.0)).max(0.0)
}


/// A dense distance matrix stored as one row-major buffer. Square matrices (one profile set
/// against itself) are symmetric with a zero diagonal. Rectangular matrices hold the distances
/// from one profile set to another.
#[derive(Clone, Debug)]
pub struct DistanceMatrix {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    pub fn new(rows: usize, cols: usize) -> DistanceMatrix {
        let size = rows.checked_mul(cols).unwrap_or_else(|| {
            quit_with_error(&format!("out of memory: a {} x {} distance matrix is too large",
                                     rows, cols));
        });
        let mut values = Vec::new();
        if values.try_reserve_exact(size).is_err() {
            quit_with_error(&format!("out of memory: unable to allocate a {} x {} distance matrix",
                                     rows, cols));
        }
        values.resize(size, 0.0);
        DistanceMatrix { rows, cols, values }
    }

    pub fn from_similarities(n: usize, similarities: &[(usize, usize, f64)]) -> DistanceMatrix {
        // Builds a square matrix from (i, j, similarity) triplets. Missing pairs stay at 0, so the
        // caller is responsible for supplying every pair.
        let mut matrix = DistanceMatrix::new(n, n);
        for &(i, j, s) in similarities {
            if i == j { continue; }
            let d = similarity_to_distance(s);
            matrix.set(i, j, d);
            matrix.set(j, i, d);
        }
        matrix
    }

    pub fn rows(&self) -> usize { self.rows }

    pub fn cols(&self) -> usize { self.cols }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.cols + j]
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.values[i * self.cols + j] = value;
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.cols..(i + 1) * self.cols]
    }

    pub fn max_distance(&self) -> f64 {
        self.values.iter().cloned().fold(0.0, f64::max)
    }

    pub fn upper_triangle(&self) -> Vec<f64> {
        // Row-major distances d[i][j] with i < j.
        let mut triangle = Vec::with_capacity(self.rows * self.rows.saturating_sub(1) / 2);
        for i in 0..self.rows {
            for j in (i + 1)..self.cols {
                triangle.push(self.get(i, j));
            }
        }
        triangle
    }

    pub fn submatrix(&self, indices: &[usize]) -> DistanceMatrix {
        let mut sub = DistanceMatrix::new(indices.len(), indices.len());
        for (a, &i) in indices.iter().enumerate() {
            for (b, &j) in indices.iter().enumerate() {
                sub.set(a, b, self.get(i, j));
            }
        }
        sub
    }
}


fn build_pool(threads: usize) -> rayon::ThreadPool {
    ThreadPoolBuilder::new().num_threads(threads).build().unwrap_or_else(|e| {
        quit_with_error(&format!("failed to start thread pool\n{}", e));
    })
}


pub fn pairwise_similarities(profiles: &[Profile], metric: SimilarityMetric,
                             threads: usize) -> Vec<(usize, usize, f64)> {
    // Returns the similarity of every pair i < j, in row-major order. The rows are computed in
    // parallel, but the order of the output doesn't depend on the thread count.
    let pb = spinner(&format!("computing {} pairwise similarities...",
                              profiles.len() * profiles.len().saturating_sub(1) / 2));
    let pool = build_pool(threads);
    let rows: Vec<Vec<(usize, usize, f64)>> = pool.install(|| {
        (0..profiles.len()).into_par_iter().map(|i| {
            ((i + 1)..profiles.len())
                .map(|j| (i, j, metric.similarity(&profiles[i], &profiles[j])))
                .collect()
        }).collect()
    });
    pb.finish_and_clear();
    rows.into_iter().flatten().collect()
}


pub fn cross_distances(profiles: &[Profile], others: &[Profile], metric: SimilarityMetric,
                       threads: usize) -> DistanceMatrix {
    // Rectangular matrix: one row per profile, one column per profile of the other set.
    let pb = spinner(&format!("computing {} cross-set similarities...",
                              profiles.len() * others.len()));
    let pool = build_pool(threads);
    let rows: Vec<Vec<f64>> = pool.install(|| {
        profiles.par_iter().map(|p| {
            others.iter().map(|o| similarity_to_distance(metric.similarity(p, o))).collect()
        }).collect()
    });
    pb.finish_and_clear();
    let mut matrix = DistanceMatrix::new(profiles.len(), others.len());
    for (i, row) in rows.iter().enumerate() {
        for (j, &d) in row.iter().enumerate() {
            matrix.set(i, j, d);
        }
    }
    matrix
}


pub fn save_similarities(similarities: &[(usize, usize, f64)], profiles: &[Profile],
                         filename: &Path) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(filename)?);
    for &(i, j, s) in similarities {
        writeln!(writer, "{}\t{}\t{:.6}", profiles[i].coordinate(), profiles[j].coordinate(), s)?;
    }
    writer.flush()
}


pub fn load_similarities(filename: &Path, profiles: &[Profile]) -> Vec<(usize, usize, f64)> {
    // Loads a precomputed similarity table. Two layouts are accepted: triplets keyed by profile
    // coordinates, or one score per line for the upper triangle in row-major order.
    let lines: Vec<(usize, String)> = load_file_lines(filename).into_iter().enumerate()
        .filter(|(_, l)| !l.trim().is_empty()).map(|(i, l)| (i + 1, l)).collect();
    let is_triplets = lines.first().map(|(_, l)| l.split('\t').count() == 3).unwrap_or(false);
    if is_triplets {
        load_triplets(filename, &lines, profiles)
    } else {
        load_flattened(filename, &lines, profiles.len())
    }
}


fn load_triplets(filename: &Path, lines: &[(usize, String)],
                 profiles: &[Profile]) -> Vec<(usize, usize, f64)> {
    let mut index: FxHashMap<String, usize> = FxHashMap::default();
    for (i, p) in profiles.iter().enumerate() {
        if index.insert(p.coordinate(), i).is_some() {
            quit_with_error(&format!("profile {} occurs more than once, so a coordinate-keyed \
                                      distance file is ambiguous", p));
        }
    }
    let mut scores: FxHashMap<(usize, usize), f64> = FxHashMap::default();
    for (line_num, line) in lines {
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() != 3 {
            quit_with_error(&format!("{} line {}: expected 3 tab-delimited columns",
                                     filename.display(), line_num));
        }
        let i = lookup_coordinate(&index, parts[0], filename, *line_num);
        let j = lookup_coordinate(&index, parts[1], filename, *line_num);
        let score = parse_score(parts[2], filename, *line_num);
        if i != j {
            scores.insert((i.min(j), i.max(j)), score);
        }
    }
    let n = profiles.len();
    let mut similarities = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            match scores.get(&(i, j)) {
                Some(&s) => similarities.push((i, j, s)),
                None => quit_with_error(&format!("{} has no score for {} vs {}",
                                                 filename.display(), profiles[i], profiles[j])),
            }
        }
    }
    similarities
}


fn load_flattened(filename: &Path, lines: &[(usize, String)],
                  n: usize) -> Vec<(usize, usize, f64)> {
    let expected = n * n.saturating_sub(1) / 2;
    if lines.len() != expected {
        quit_with_error(&format!("{} has {} scores but {} profiles need {}",
                                 filename.display(), lines.len(), n, expected));
    }
    let mut scores = lines.iter().map(|(line_num, line)| parse_score(line, filename, *line_num));
    let mut similarities = Vec::with_capacity(expected);
    for i in 0..n {
        for j in (i + 1)..n {
            if let Some(s) = scores.next() {
                similarities.push((i, j, s));
            }
        }
    }
    similarities
}


fn lookup_coordinate(index: &FxHashMap<String, usize>, coordinate: &str, filename: &Path,
                     line_num: usize) -> usize {
    match index.get(coordinate.trim()) {
        Some(&i) => i,
        None => quit_with_error(&format!("{} line {}: unknown profile {}",
                                         filename.display(), line_num, coordinate)),
    }
}


fn parse_score(text: &str, filename: &Path, line_num: usize) -> f64 {
    match text.trim().parse::<f64>() {
        Ok(s) if s.is_finite() => s,
        _ => quit_with_error(&format!("{} line {}: non-numeric score: {}",
                                      filename.display(), line_num, text)),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Strand;
    use crate::tests::{assert_almost_eq, make_test_file};
    use rand::{rngs::StdRng, SeedableRng};
    use std::fs::read_to_string;
    use tempfile::tempdir;

    fn test_profiles() -> Vec<Profile> {
        let mut rng = StdRng::seed_from_u64(0);
        let mut profiles = vec![
            Profile::new("chr1".to_string(), 1, 4, Strand::Forward, vec![1.0, 5.0, 2.0, 0.0]),
            Profile::new("chr1".to_string(), 20, 24, Strand::Forward, vec![1.0, 4.0, 2.0, 1.0, 0.0]),
            Profile::new("chr2".to_string(), 5, 7, Strand::Reverse, vec![3.0, 0.0, 3.0]),
            Profile::new("chr2".to_string(), 50, 52, Strand::Reverse, vec![0.0, 7.0, 0.0]),
        ];
        for p in profiles.iter_mut() { p.fill_noise(500, &mut rng); }
        profiles
    }

    #[test]
    fn test_similarity_to_distance() {
        assert_almost_eq(similarity_to_distance(1.0), 0.0, 1e-12);
        assert_almost_eq(similarity_to_distance(0.25), 0.75, 1e-12);
        assert_almost_eq(similarity_to_distance(-0.5), 1.0, 1e-12);
        assert_almost_eq(similarity_to_distance(1.0000001), 0.0, 1e-12);
    }

    #[test]
    fn test_matrix_basics() {
        let sims = vec![(0, 1, 0.9), (0, 2, 0.2), (1, 2, -0.3)];
        let m = DistanceMatrix::from_similarities(3, &sims);
        assert_eq!(m.rows(), 3);
        assert_eq!(m.cols(), 3);
        assert_almost_eq(m.get(0, 1), 0.1, 1e-12);
        assert_almost_eq(m.get(1, 0), 0.1, 1e-12);
        assert_almost_eq(m.get(2, 1), 1.0, 1e-12);
        assert_almost_eq(m.get(1, 1), 0.0, 1e-12);
        assert_almost_eq(m.max_distance(), 1.0, 1e-12);
        assert_eq!(m.upper_triangle().len(), 3);
        assert_almost_eq(m.upper_triangle()[1], 0.8, 1e-12);
        assert_eq!(m.row(0).len(), 3);
        let sub = m.submatrix(&[2, 0]);
        assert_almost_eq(sub.get(0, 1), 0.8, 1e-12);
        assert_almost_eq(sub.get(1, 1), 0.0, 1e-12);
    }

    #[test]
    fn test_pairwise_symmetric_and_thread_independent() {
        let profiles = test_profiles();
        for &metric in SimilarityMetric::value_variants() {
            let one = pairwise_similarities(&profiles, metric, 1);
            let four = pairwise_similarities(&profiles, metric, 4);
            assert_eq!(one.len(), 6);
            assert_eq!(one, four);
            let m = DistanceMatrix::from_similarities(profiles.len(), &one);
            for i in 0..profiles.len() {
                assert_almost_eq(m.get(i, i), 0.0, 1e-12);
                for j in 0..profiles.len() {
                    assert_almost_eq(m.get(i, j), m.get(j, i), 1e-12);
                    assert!(m.get(i, j) >= 0.0 && m.get(i, j) <= 1.0);
                }
            }
        }
    }

    #[test]
    fn test_self_similarity() {
        let profiles = test_profiles();
        for &metric in SimilarityMetric::value_variants() {
            for p in &profiles {
                assert_almost_eq(metric.similarity(p, p), 1.0, 1e-9);
            }
        }
    }

    #[test]
    fn test_metric_names() {
        for &metric in SimilarityMetric::value_variants() {
            let name = metric.to_possible_value().unwrap().get_name().to_string();
            assert_eq!(metric.to_string(), name);
        }
    }

    #[test]
    fn test_zero_padding_metric() {
        let a = Profile::new("chr1".to_string(), 1, 2, Strand::Forward, vec![1.0, 1.0]);
        let mut b = Profile::new("chr1".to_string(), 5, 5, Strand::Forward, vec![1.0]);
        b.noise = vec![-1.0];
        assert_almost_eq(SimilarityMetric::XcorrZero.similarity(&a, &b), 1.0 / 2.0_f64.sqrt(),
                         1e-12);
        assert_almost_eq(SimilarityMetric::Xcorr.similarity(&a, &b), 0.0, 1e-12);
    }

    #[test]
    fn test_cross_distances() {
        let profiles = test_profiles();
        let m = cross_distances(&profiles[..1], &profiles, SimilarityMetric::Xcorr, 2);
        assert_eq!(m.rows(), 1);
        assert_eq!(m.cols(), 4);
        assert_almost_eq(m.get(0, 0), 0.0, 1e-9);
    }

    #[test]
    fn test_save_and_load_triplets() {
        let dir = tempdir().unwrap();
        let filename = dir.path().join("crosscor.dat");
        let profiles = test_profiles();
        let sims = vec![(0, 1, 0.5), (0, 2, 0.25), (0, 3, 0.0),
                        (1, 2, 1.0), (1, 3, -0.125), (2, 3, 0.75)];
        save_similarities(&sims, &profiles, &filename).unwrap();
        let contents = read_to_string(&filename).unwrap();
        assert!(contents.starts_with("chr1:1-4:+\tchr1:20-24:+\t0.500000\n"));
        assert_eq!(load_similarities(&filename, &profiles), sims);
    }

    #[test]
    fn test_load_triplets_any_order() {
        let dir = tempdir().unwrap();
        let filename = dir.path().join("crosscor.dat");
        let profiles = test_profiles();
        make_test_file(&filename, "chr2:50-52:-\tchr2:5-7:-\t0.75\n\
                                   chr1:20-24:+\tchr1:1-4:+\t0.5\n\
                                   chr1:1-4:+\tchr1:1-4:+\t1.0\n\
                                   chr1:1-4:+\tchr2:5-7:-\t0.25\n\
                                   chr1:1-4:+\tchr2:50-52:-\t0\n\
                                   chr1:20-24:+\tchr2:5-7:-\t1\n\
                                   chr1:20-24:+\tchr2:50-52:-\t-0.125\n");
        let sims = load_similarities(&filename, &profiles);
        assert_eq!(sims[0], (0, 1, 0.5));
        assert_eq!(sims[5], (2, 3, 0.75));
    }

    #[test]
    fn test_load_triplets_errors() {
        let dir = tempdir().unwrap();
        let profiles = test_profiles();
        let missing_pair = dir.path().join("missing_pair.dat");
        make_test_file(&missing_pair, "chr1:1-4:+\tchr1:20-24:+\t0.5\n");
        assert!(std::panic::catch_unwind(|| { load_similarities(&missing_pair, &profiles); }).is_err());
        let unknown = dir.path().join("unknown.dat");
        make_test_file(&unknown, "chr9:1-4:+\tchr1:20-24:+\t0.5\n");
        assert!(std::panic::catch_unwind(|| { load_similarities(&unknown, &profiles); }).is_err());
    }

    #[test]
    fn test_load_flattened() {
        let dir = tempdir().unwrap();
        let filename = dir.path().join("flat.dat");
        let profiles = test_profiles();
        make_test_file(&filename, "0.5\n0.25\n0\n1\n-0.125\n0.75\n");
        let sims = load_similarities(&filename, &profiles);
        assert_eq!(sims, vec![(0, 1, 0.5), (0, 2, 0.25), (0, 3, 0.0),
                              (1, 2, 1.0), (1, 3, -0.125), (2, 3, 0.75)]);
        let short = dir.path().join("short.dat");
        make_test_file(&short, "0.5\n0.25\n");
        assert!(std::panic::catch_unwind(|| { load_similarities(&short, &profiles); }).is_err());
        let bad = dir.path().join("bad.dat");
        make_test_file(&bad, "0.5\n0.25\n0\n1\nabc\n0.75\n");
        assert!(std::panic::catch_unwind(|| { load_similarities(&bad, &profiles); }).is_err());
        let nan = dir.path().join("nan.dat");
        make_test_file(&nan, "0.5\n0.25\n0\n1\nnan\n0.75\n");
        assert!(std::panic::catch_unwind(|| { load_similarities(&nan, &profiles); }).is_err());
    }
}
