// This file contains the zero-lag normalised cross-correlation between two profiles.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of srnaclust. srnaclust is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. srnaclust
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with srnaclust. If not, see <http://www.gnu.org/licenses/>.

use crate::profile::Profile;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Padding {
    Noise,
    Zero,
}


pub fn nxcorr(a: &Profile, b: &Profile, padding: Padding) -> f64 {
    // The shorter profile is extended to the length of the longer one, either with samples from
    // its own noise pool or with zeros. The result is the lag-0 correlation rxy / sqrt(rxx * ryy).
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let (mut rxy, mut rxx, mut ryy) = (0.0, 0.0, 0.0);
    for (k, &x) in long.values.iter().enumerate() {
        let y = if k < short.len() {
            short.values[k]
        } else {
            match padding {
                Padding::Noise => short.noise.get(k - short.len()).copied().unwrap_or(0.0),
                Padding::Zero  => 0.0,
            }
        };
        rxy += x * y;
        rxx += x * x;
        ryy += y * y;
    }
    normalised_correlation(rxy, rxx, ryy)
}


pub fn normalised_correlation(sxy: f64, sxx: f64, syy: f64) -> f64 {
    // Zero energy in either signal gives a correlation of 0 rather than NaN.
    let denominator = (sxx * syy).sqrt();
    if denominator <= 0.0 || !denominator.is_finite() { return 0.0; }
    sxy / denominator
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
    fn test_nxcorr_equal_lengths() {
        let a = profile(&[1.0, 5.0, 2.0]);
        assert_almost_eq(nxcorr(&a, &a, Padding::Noise), 1.0, 1e-12);
        let b = profile(&[2.0, 10.0, 4.0]);
        assert_almost_eq(nxcorr(&a, &b, Padding::Zero), 1.0, 1e-12);
        let c = profile(&[1.0, 0.0]);
        let d = profile(&[0.0, 1.0]);
        assert_almost_eq(nxcorr(&c, &d, Padding::Noise), 0.0, 1e-12);
    }

    #[test]
    fn test_nxcorr_zero_padding() {
        let a = profile(&[1.0, 1.0]);
        let b = profile(&[1.0]);
        assert_almost_eq(nxcorr(&a, &b, Padding::Zero), 1.0 / 2.0_f64.sqrt(), 1e-12);
        assert_almost_eq(nxcorr(&b, &a, Padding::Zero), 1.0 / 2.0_f64.sqrt(), 1e-12);
    }

    #[test]
    fn test_nxcorr_noise_padding() {
        let a = profile(&[1.0, 1.0, 1.0]);
        let mut b = profile(&[1.0]);
        b.noise = vec![-1.0, -1.0];
        // rxy = 1 - 1 - 1, rxx = 3, ryy = 3
        assert_almost_eq(nxcorr(&a, &b, Padding::Noise), -1.0 / 3.0, 1e-12);
        assert_almost_eq(nxcorr(&b, &a, Padding::Noise), -1.0 / 3.0, 1e-12);
    }

    #[test]
    fn test_nxcorr_zero_signal() {
        let a = profile(&[0.0, 0.0, 0.0]);
        let b = profile(&[1.0, 2.0, 3.0]);
        assert_almost_eq(nxcorr(&a, &b, Padding::Noise), 0.0, 1e-12);
        assert_almost_eq(nxcorr(&a, &a, Padding::Noise), 0.0, 1e-12);
    }

    #[test]
    fn test_normalised_correlation() {
        assert_almost_eq(normalised_correlation(2.0, 4.0, 1.0), 1.0, 1e-12);
        assert_almost_eq(normalised_correlation(1.0, 0.0, 1.0), 0.0, 1e-12);
    }
}
