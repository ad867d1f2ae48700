// This file contains density-peak clustering (Rodriguez and Laio, 2014) with an entropy-based
// choice of the distance cutoff, plus the greedy variant that repeatedly extracts the
// neighbourhood of the densest remaining profile.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of srnaclust. srnaclust is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. srnaclust
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with srnaclust. If not, see <http://www.gnu.org/licenses/>.

use clap::ValueEnum;

use crate::distance_matrix::DistanceMatrix;
use crate::misc::{mean, quantile_from_sorted, variance};
use crate::profile::Profile;

const SIGMA_STEP: f64 = 0.005;
const SIGMA_UPPER_QUANTILE: f64 = 0.1;


#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kernel {
    Hard,      // count of neighbours closer than the cutoff
    Gaussian,  // sum of exp(-(d/dc)^2) over all other profiles
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CenterSelection {
    Quartiles,    // rho above its first quartile and delta above its third quartile
    ScoreBreak,   // natural break in the sorted combined scores
    TopK(usize),  // the k highest combined scores
}


#[derive(Debug, Default)]
pub struct DensityPeakModel {
    pub dc: f64,
    pub rho_q1: f64,
    pub delta_q3: f64,
    pub centers: Vec<usize>,
    pub cluster_count: usize,
}


pub fn dcoptimize(matrix: &DistanceMatrix) -> f64 {
    // Chooses the cutoff by minimising the entropy of the Gaussian density distribution. Sigma is
    // scanned from the smallest positive distance to the 10th percentile distance.
    let mut sorted = matrix.upper_triangle();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let lower = sorted.iter().cloned().find(|&d| d > 0.0);
    let sigma = match lower {
        None => SIGMA_STEP,
        Some(lower) => {
            let upper = quantile_from_sorted(&sorted, SIGMA_UPPER_QUANTILE);
            minimum_entropy_sigma(matrix, lower, upper)
        }
    };
    3.0 / 2.0_f64.sqrt() * sigma
}


fn minimum_entropy_sigma(matrix: &DistanceMatrix, lower: f64, upper: f64) -> f64 {
    if lower > upper { return lower; }
    let steps = ((upper - lower) / SIGMA_STEP + 1e-9).floor() as usize;
    let mut best_sigma = lower;
    let mut best_entropy = f64::INFINITY;
    for k in 0..=steps {
        let sigma = lower + k as f64 * SIGMA_STEP;
        let entropy = density_entropy(&local_density(matrix, sigma, Kernel::Gaussian));
        if entropy < best_entropy {
            best_entropy = entropy;
            best_sigma = sigma;
        }
    }
    best_sigma
}


fn density_entropy(rho: &[f64]) -> f64 {
    let total: f64 = rho.iter().sum();
    if total <= 0.0 { return f64::INFINITY; }
    -rho.iter().map(|r| r / total).filter(|&p| p > 0.0).map(|p| p * p.ln()).sum::<f64>()
}


pub fn local_density(matrix: &DistanceMatrix, dc: f64, kernel: Kernel) -> Vec<f64> {
    (0..matrix.rows()).map(|i| {
        matrix.row(i).iter().enumerate().filter(|&(j, _)| j != i).map(|(_, &d)| {
            match kernel {
                Kernel::Hard => if d < dc { 1.0 } else { 0.0 },
                Kernel::Gaussian => if dc > 0.0 { (-(d / dc).powi(2)).exp() } else { 0.0 },
            }
        }).sum()
    }).collect()
}


pub fn min_distance_to_denser(matrix: &DistanceMatrix, rho: &[f64]) -> Vec<f64> {
    // The densest profiles have no denser neighbour, so they get the largest distance overall.
    let max_distance = matrix.max_distance();
    (0..rho.len()).map(|i| {
        (0..rho.len()).filter(|&j| rho[j] > rho[i]).map(|j| matrix.get(i, j))
                      .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.min(d))))
                      .unwrap_or(max_distance)
    }).collect()
}


fn combined_scores(rho: &[f64], delta: &[f64]) -> Vec<f64> {
    let max_rho = rho.iter().cloned().fold(0.0, f64::max);
    let max_delta = delta.iter().cloned().fold(0.0, f64::max);
    rho.iter().zip(delta).map(|(&r, &d)| {
        let r = if max_rho > 0.0 { r / max_rho } else { 0.0 };
        let d = if max_delta > 0.0 { d / max_delta } else { 0.0 };
        (r * r + d * d).sqrt()
    }).collect()
}


fn quartile(values: &[f64], fraction: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    quantile_from_sorted(&sorted, fraction)
}


pub fn select_centers(rho: &[f64], delta: &[f64], selection: CenterSelection) -> Vec<usize> {
    // Returns center indices in ascending order, so cluster ids follow profile order.
    let mut centers = match selection {
        CenterSelection::Quartiles => {
            let rho_q1 = quartile(rho, 0.25);
            let delta_q3 = quartile(delta, 0.75);
            (0..rho.len()).filter(|&i| rho[i] > rho_q1 && delta[i] > delta_q3).collect()
        }
        CenterSelection::TopK(k) => top_scores(&combined_scores(rho, delta), k),
        CenterSelection::ScoreBreak => {
            let scores = combined_scores(rho, delta);
            let count = score_break_count(&scores);
            top_scores(&scores, count)
        }
    };
    centers.sort_unstable();
    centers
}


fn top_scores(scores: &[f64], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    order.truncate(k);
    order
}


fn score_break_count(scores: &[f64]) -> usize {
    // Lowers a threshold from mean + 3 sd towards mean + 1 sd in half-sd steps and stops at the
    // step where the number of scores above it more than doubles.
    if scores.is_empty() { return 0; }
    let m = mean(scores);
    let sd = variance(scores).sqrt();
    if sd <= 0.0 { return 1; }
    let above = |t: f64| scores.iter().filter(|&&s| s > t).count();
    let mut count = above(m + 3.0 * sd);
    for step in 1..=4 {
        let threshold = m + (3.0 - 0.5 * step as f64) * sd;
        let candidates = above(threshold);
        if count > 0 && candidates > 2 * count { break; }
        count = candidates;
    }
    count.max(1)
}


pub fn assign_clusters(matrix: &DistanceMatrix, rho: &[f64], centers: &[usize],
                       dc: f64) -> (Vec<usize>, Vec<bool>) {
    // Centers get ids 1..=k in index order. The rest are visited in order of decreasing density
    // (ties by index) and join the cluster of their nearest already-visited profile. A profile
    // with no visited profile within dc starts a new cluster as its center.
    let n = rho.len();
    let mut clusters = vec![0; n];
    let mut is_center = vec![false; n];
    let mut next_id = 1;
    for &c in centers {
        clusters[c] = next_id;
        is_center[c] = true;
        next_id += 1;
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| rho[b].total_cmp(&rho[a]).then(a.cmp(&b)));
    for (pos, &i) in order.iter().enumerate() {
        if is_center[i] { continue; }
        let mut nearest: Option<usize> = None;
        for &j in &order[..pos] {
            nearest = match nearest {
                Some(k) if matrix.get(i, k) < matrix.get(i, j) => Some(k),
                Some(k) if matrix.get(i, k) == matrix.get(i, j) && k < j => Some(k),
                _ => Some(j),
            };
        }
        match nearest {
            Some(j) if matrix.get(i, j) < dc => clusters[i] = clusters[j],
            _ => {
                clusters[i] = next_id;
                is_center[i] = true;
                next_id += 1;
            }
        }
    }
    (clusters, is_center)
}


pub fn find_halo(matrix: &DistanceMatrix, rho: &[f64], clusters: &[usize], dc: f64) -> Vec<bool> {
    // Each cluster's border density is the highest density among its members that lie within dc
    // of another cluster. Members less dense than that are halo.
    let n = rho.len();
    let cluster_count = clusters.iter().cloned().max().unwrap_or(0);
    let mut border = vec![0.0; cluster_count + 1];
    for i in 0..n {
        let on_border = (0..n).any(|j| clusters[j] != clusters[i] && matrix.get(i, j) < dc);
        if on_border && rho[i] > border[clusters[i]] {
            border[clusters[i]] = rho[i];
        }
    }
    (0..n).map(|i| rho[i] < border[clusters[i]]).collect()
}


pub fn density_peak_cluster(profiles: &mut [Profile], matrix: &DistanceMatrix, cutoff: Option<f64>,
                            kernel: Kernel, selection: CenterSelection) -> DensityPeakModel {
    let dc = cutoff.unwrap_or_else(|| dcoptimize(matrix));
    let rho = local_density(matrix, dc, kernel);
    let delta = min_distance_to_denser(matrix, &rho);
    let centers = select_centers(&rho, &delta, selection);
    let (clusters, is_center) = assign_clusters(matrix, &rho, &centers, dc);
    let halo = find_halo(matrix, &rho, &clusters, dc);
    for (i, p) in profiles.iter_mut().enumerate() {
        p.cluster = clusters[i];
        p.center = is_center[i];
        p.halo = halo[i];
    }
    DensityPeakModel {
        rho_q1: quartile(&rho, 0.25),
        delta_q3: quartile(&delta, 0.75),
        cluster_count: clusters.iter().cloned().max().unwrap_or(0),
        dc,
        centers,
    }
}


pub fn greedy_density_peak_cluster(profiles: &mut [Profile], matrix: &DistanceMatrix,
                                   cutoff: Option<f64>, ceiling: f64,
                                   kernel: Kernel) -> (usize, f64) {
    // Repeatedly takes the densest remaining profile and everything within the cutoff of it as a
    // cluster. The cutoff is re-optimised on the remaining profiles each round (unless fixed), and
    // extraction stops once it exceeds the ceiling. Leftover profiles become singletons. Returns
    // the cluster count and the last cutoff used.
    let n = profiles.len();
    let mut clusters = vec![0; n];
    let mut is_center = vec![false; n];
    let mut remaining: Vec<usize> = (0..n).collect();
    let mut next_id = 1;
    let mut last_dc = cutoff.unwrap_or(0.0);
    while remaining.len() >= 2 {
        let sub = matrix.submatrix(&remaining);
        let dc = cutoff.unwrap_or_else(|| dcoptimize(&sub));
        if dc > ceiling { break; }
        last_dc = dc;
        let rho = local_density(&sub, dc, kernel);
        let peak = (0..rho.len()).fold(0, |best, a| if rho[a] > rho[best] { a } else { best });
        if rho[peak] <= 0.0 { break; }
        is_center[remaining[peak]] = true;
        let mut kept = Vec::with_capacity(remaining.len());
        for (a, &i) in remaining.iter().enumerate() {
            if a == peak || sub.get(peak, a) < dc {
                clusters[i] = next_id;
            } else {
                kept.push(i);
            }
        }
        next_id += 1;
        remaining = kept;
    }
    for i in remaining {
        clusters[i] = next_id;
        next_id += 1;
    }
    let rho = local_density(matrix, last_dc, kernel);
    let halo = find_halo(matrix, &rho, &clusters, last_dc);
    for (i, p) in profiles.iter_mut().enumerate() {
        p.cluster = clusters[i];
        p.center = is_center[i];
        p.halo = halo[i];
    }
    (next_id - 1, last_dc)
}
