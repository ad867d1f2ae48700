// This file contains the dynamic time warping measures between profiles: plain and peak-normalised
// DTW costs (and a similarity derived from the latter), the correlation along the peak-normalised warping path, and the noise-padded
// cross-correlation DTW.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of srnaclust. srnaclust is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. srnaclust
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with srnaclust. If not, see <http://www.gnu.org/licenses/>.

use crate::profile::Profile;
use crate::xcorr::normalised_correlation;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Move {
    Diagonal,
    Vertical,
    Horizontal,
}


pub fn dtw(s: &[f64], q: &[f64]) -> f64 {
    // Returns the unnormalised cumulative alignment cost.
    let warping = warping_matrix(s, q);
    warping[s.len() * q.len() - 1]
}


pub fn ndtw(s: &[f64], max_s: f64, q: &[f64], max_q: f64) -> f64 {
    // Same as dtw but the signal with the smaller peak is first scaled up to the larger peak, and
    // the cost is divided by the combined length.
    let (s, q) = peak_normalised(s, max_s, q, max_q);
    dtw(&s, &q) / (s.len() + q.len()) as f64
}


pub fn ndtw_similarity(a: &Profile, b: &Profile) -> f64 {
    // Any warping path weighs n + m local costs, each at most the larger peak, so the ndtw cost
    // divided by that peak lies in [0, 1]. A profile with no reads has no shape to compare.
    let (a, b) = canonical_order(a, b);
    if a.max_height <= 0.0 || b.max_height <= 0.0 { return 0.0; }
    let peak = a.max_height.max(b.max_height);
    let cost = ndtw(&a.values, a.max_height, &b.values, b.max_height) / peak;
    1.0 - cost.clamp(0.0, 1.0)
}


pub fn adtw(a: &Profile, b: &Profile) -> f64 {
    // Aligns the two peak-normalised profiles, backtracks the optimal warping path and returns the
    // normalised correlation of the aligned sample pairs.
    let (a, b) = canonical_order(a, b);
    let (s, q) = peak_normalised(&a.values, a.max_height, &b.values, b.max_height);
    let (n, m) = (s.len(), q.len());
    let warping = warping_matrix(&s, &q);
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    let (mut i, mut j) = (n - 1, m - 1);
    loop {
        sxy += s[i] * q[j];
        sxx += s[i] * s[i];
        syy += q[j] * q[j];
        if i == 0 && j == 0 { break; }
        match traceback_move(&warping, &s, &q, i, j) {
            Move::Diagonal   => { i -= 1; j -= 1; }
            Move::Vertical   => { i -= 1; }
            Move::Horizontal => { j -= 1; }
        }
    }
    normalised_correlation(sxy, sxx, syy)
}


fn canonical_order<'a>(a: &'a Profile, b: &'a Profile) -> (&'a Profile, &'a Profile) {
    // Longer profile first (then the lexicographically larger one), so that swapping the
    // arguments can't change how alignment ties are broken.
    if b.len() > a.len() || (b.len() == a.len() && b.values > a.values) { (b, a) } else { (a, b) }
}


fn peak_correction_factors(max_s: f64, max_q: f64) -> (f64, f64) {
    // The signal with the larger peak keeps a factor of 1. Empty peaks can't be scaled.
    if max_s <= 0.0 || max_q <= 0.0 {
        return (1.0, 1.0);
    }
    if max_s > max_q { (1.0, max_s / max_q) } else { (max_q / max_s, 1.0) }
}


fn peak_normalised(s: &[f64], max_s: f64, q: &[f64], max_q: f64) -> (Vec<f64>, Vec<f64>) {
    let (cf_s, cf_q) = peak_correction_factors(max_s, max_q);
    (s.iter().map(|v| v * cf_s).collect(), q.iter().map(|v| v * cf_q).collect())
}


fn warping_matrix(s: &[f64], q: &[f64]) -> Vec<f64> {
    // Row-major n x m matrix of cumulative costs. The first cell and diagonal moves cost twice the
    // local cost, vertical and horizontal moves cost it once.
    let (n, m) = (s.len(), q.len());
    let mut w = vec![0.0; n * m];
    w[0] = (s[0] - q[0]).abs() * 2.0;
    for i in 1..n {
        w[i * m] = (s[i] - q[0]).abs() + w[(i - 1) * m];
    }
    for j in 1..m {
        w[j] = (s[0] - q[j]).abs() + w[j - 1];
    }
    for i in 1..n {
        for j in 1..m {
            let cost = (s[i] - q[j]).abs();
            let up = w[(i - 1) * m + j] + cost;
            let diagonal = w[(i - 1) * m + j - 1] + cost * 2.0;
            let left = w[i * m + j - 1] + cost;
            w[i * m + j] = up.min(diagonal).min(left);
        }
    }
    w
}


fn traceback_move(w: &[f64], s: &[f64], q: &[f64], i: usize, j: usize) -> Move {
    // Recovers which move produced cell (i, j). Ties prefer the diagonal, then vertical.
    if i == 0 { return Move::Horizontal; }
    if j == 0 { return Move::Vertical; }
    let m = q.len();
    let cost = (s[i] - q[j]).abs();
    let up = w[(i - 1) * m + j] + cost;
    let diagonal = w[(i - 1) * m + j - 1] + cost * 2.0;
    let left = w[i * m + j - 1] + cost;
    if diagonal <= up && diagonal <= left {
        Move::Diagonal
    } else if up <= left {
        Move::Vertical
    } else {
        Move::Horizontal
    }
}


#[derive(Clone, Copy)]
struct Accumulator {
    sq: f64,
    ss: f64,
    qq: f64,
    corr: f64,
}

impl Accumulator {
    fn origin() -> Self {
        Accumulator { sq: 0.0, ss: 0.0, qq: 0.0, corr: 0.0 }
    }

    fn unreachable() -> Self {
        Accumulator { sq: 0.0, ss: 0.0, qq: 0.0, corr: f64::NEG_INFINITY }
    }

    fn reachable(&self) -> bool {
        self.corr > f64::NEG_INFINITY
    }

    fn extend(&self, x: f64, y: f64) -> Self {
        if !self.reachable() { return *self; }
        let sq = self.sq + x * y;
        let ss = self.ss + x * x;
        let qq = self.qq + y * y;
        Accumulator { sq, ss, qq, corr: normalised_correlation(sq, ss, qq) }
    }
}


pub fn xdtw(a: &Profile, b: &Profile) -> f64 {
    // Warps the two profiles inside a Sakoe-Chiba band as wide as their length difference. Each
    // cell keeps the running sums of s*q, s^2 and q^2 for its best path, and the move chosen is
    // the one with the highest running correlation. Stepping one signal without the other pairs
    // it with a sample from the other's noise pool.
    let (s, q) = canonical_order(a, b);
    let (n, m) = (s.len(), q.len());
    let band = n - m;
    let cols = m + 1;
    let mut cells = vec![Accumulator::unreachable(); (n + 1) * cols];
    cells[0] = Accumulator::origin();
    for i in 0..=n {
        for j in 0..=m {
            if i == 0 && j == 0 { continue; }
            if i.abs_diff(j) > band { continue; }
            let diagonal = if i > 0 && j > 0 {
                cells[(i - 1) * cols + j - 1].extend(s.values[i - 1], q.values[j - 1])
            } else {
                Accumulator::unreachable()
            };
            let vertical = if i > 0 {
                cells[(i - 1) * cols + j].extend(s.values[i - 1], noise_sample(q, i - 1))
            } else {
                Accumulator::unreachable()
            };
            let horizontal = if j > 0 {
                cells[i * cols + j - 1].extend(noise_sample(s, j - 1), q.values[j - 1])
            } else {
                Accumulator::unreachable()
            };
            cells[i * cols + j] = best_move(diagonal, vertical, horizontal);
        }
    }
    let terminal = cells[n * cols + m];
    if terminal.reachable() { terminal.corr } else { 0.0 }
}


fn best_move(diagonal: Accumulator, vertical: Accumulator, horizontal: Accumulator) -> Accumulator {
    let (cd, cv, ch) = (diagonal.corr, vertical.corr, horizontal.corr);
    if cd >= cv && cd >= ch {
        diagonal
    } else if cv >= cd && cv >= ch {
        vertical
    } else {
        horizontal
    }
}


fn noise_sample(p: &Profile, index: usize) -> f64 {
    p.noise.get(index).copied().unwrap_or(0.0)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Strand;
    use crate::tests::assert_almost_eq;

    fn profile(values: &[f64]) -> Profile {
        let end = values.len() as u64;
        Profile::new("chr1".to_string(), 1, end, Strand::Forward, values.to_vec())
    }

    #[test]
    fn test_dtw() {
        assert_almost_eq(dtw(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 0.0, 1e-12);
        assert_almost_eq(dtw(&[0.0], &[1.0]), 2.0, 1e-12);
        assert_almost_eq(dtw(&[1.0, 2.0], &[1.0]), 1.0, 1e-12);
        assert_almost_eq(dtw(&[1.0], &[1.0, 2.0]), 1.0, 1e-12);
        assert_almost_eq(dtw(&[0.0, 1.0], &[1.0, 0.0]), 3.0, 1e-12);
    }

    #[test]
    fn test_ndtw() {
        // After peak scaling these are identical.
        assert_almost_eq(ndtw(&[1.0, 2.0], 2.0, &[2.0, 4.0], 4.0), 0.0, 1e-12);
        assert_almost_eq(ndtw(&[2.0, 4.0], 4.0, &[1.0, 2.0], 2.0), 0.0, 1e-12);
        assert_almost_eq(ndtw(&[0.0, 1.0], 1.0, &[1.0, 0.0], 1.0), 0.75, 1e-12);
        assert_almost_eq(ndtw(&[0.0, 0.0], 0.0, &[0.0], 0.0), 0.0, 1e-12);
    }

    #[test]
    fn test_ndtw_similarity() {
        let a = profile(&[1.0, 2.0]);
        let b = profile(&[2.0, 4.0]);
        assert_almost_eq(ndtw_similarity(&a, &a), 1.0, 1e-12);
        assert_almost_eq(ndtw_similarity(&a, &b), 1.0, 1e-12);
        // Cost 3 over 4 samples, peak 1.
        let c = profile(&[0.0, 1.0]);
        let d = profile(&[1.0, 0.0]);
        assert_almost_eq(ndtw_similarity(&c, &d), 0.25, 1e-12);
        assert_almost_eq(ndtw_similarity(&d, &c), 0.25, 1e-12);
        let z = profile(&[0.0, 0.0]);
        assert_almost_eq(ndtw_similarity(&a, &z), 0.0, 1e-12);
        let e = profile(&[5.0, 0.0, 1.0, 3.0]);
        let r = ndtw_similarity(&a, &e);
        assert!(r >= 0.0 && r <= 1.0);
        assert_almost_eq(r, ndtw_similarity(&e, &a), 1e-12);
    }

    #[test]
    fn test_adtw() {
        let a = profile(&[1.0, 4.0, 2.0, 0.0]);
        assert_almost_eq(adtw(&a, &a), 1.0, 1e-12);
        let b = profile(&[2.0, 8.0, 4.0, 0.0]);
        assert_almost_eq(adtw(&a, &b), 1.0, 1e-12);
        let c = profile(&[1.0, 1.0, 4.0, 4.0, 2.0, 0.0]);
        assert_almost_eq(adtw(&a, &c), 1.0, 1e-12);
        let z = profile(&[0.0, 0.0]);
        assert_almost_eq(adtw(&a, &z), 0.0, 1e-12);
        let d = profile(&[5.0, 0.0, 1.0]);
        assert_almost_eq(adtw(&a, &d), adtw(&d, &a), 1e-12);
    }

    #[test]
    fn test_xdtw_self() {
        let a = profile(&[1.0, 5.0, 2.0, 3.0]);
        assert_almost_eq(xdtw(&a, &a), 1.0, 1e-12);
        let single = profile(&[3.0]);
        assert_almost_eq(xdtw(&single, &single), 1.0, 1e-12);
        let zero = profile(&[0.0, 0.0]);
        assert_almost_eq(xdtw(&zero, &zero), 0.0, 1e-12);
    }

    #[test]
    fn test_xdtw_padded() {
        let mut s = profile(&[1.0, 1.0]);
        let mut q = profile(&[1.0]);
        s.noise = vec![-1.0, -1.0];
        q.noise = vec![-1.0, -1.0];
        // Every path to the terminal cell pairs one real sample with noise.
        assert_almost_eq(xdtw(&s, &q), 0.0, 1e-12);
        assert_almost_eq(xdtw(&q, &s), 0.0, 1e-12);

        s.noise = vec![0.0, 0.0];
        q.noise = vec![0.0, 0.0];
        assert_almost_eq(xdtw(&s, &q), 1.0 / 2.0_f64.sqrt(), 1e-12);
    }

    #[test]
    fn test_xdtw_symmetric() {
        let mut a = profile(&[1.0, 3.0, 7.0, 2.0, 1.0]);
        let mut b = profile(&[2.0, 6.0, 1.0]);
        a.noise = vec![-2.0, -3.5, -1.0, -4.0, -2.5];
        b.noise = vec![-1.5, -2.0, -3.0, -2.5, -1.0];
        assert_almost_eq(xdtw(&a, &b), xdtw(&b, &a), 1e-12);
        let r = xdtw(&a, &b);
        assert!(r >= -1.0 && r <= 1.0);
    }
}
