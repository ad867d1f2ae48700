// This file contains the label propagation schemes: from labelled profiles to unlabelled ones in
// the same tree branch or cluster, to nearest neighbours over the whole distance matrix, and from
// a labelled set of another species.

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
use std::collections::BTreeMap;

use crate::distance_matrix::DistanceMatrix;
use crate::hierarchical::{ChildRef, Hierarchy};
use crate::misc::quit_with_error;
use crate::profile::Profile;

const NEIGHBOURS: usize = 3;


#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    Majority,  // most common label among the labelled members of a branch or cluster
    Knn3,      // consensus of the three nearest neighbours
    Weighted,  // (1 - d) contributions of shared ancestors (trees only)
}


/// A possible label source for one target profile, scored by similarity (1 - distance).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnnotationCandidate {
    pub score: f64,
    pub source: usize,
    pub target: usize,
}


fn snapshot(profiles: &[Profile]) -> Vec<Option<String>> {
    // Labels are always read from a copy taken before any propagation, so the order in which
    // profiles are annotated can't change the outcome.
    profiles.iter().map(|p| p.label.clone()).collect()
}


fn assign(profile: &mut Profile, label: &str, score: f64) -> bool {
    if profile.label.is_some() { return false; }
    profile.label = Some(label.to_string());
    profile.score = score;
    true
}


fn members_by_cluster(profiles: &[Profile]) -> BTreeMap<usize, Vec<usize>> {
    let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, p) in profiles.iter().enumerate() {
        members.entry(p.cluster).or_default().push(i);
    }
    members
}


fn majority_label<'a>(members: &[usize], labels: &'a [Option<String>]) -> Option<(&'a str, f64)> {
    // Most frequent label among the labelled members. Ties go to the label seen first (lowest
    // profile index). The score is the winning label's share of the votes.
    let mut tally: FxHashMap<&str, (usize, usize)> = FxHashMap::default();
    let mut voters = 0;
    for &i in members {
        if let Some(label) = labels[i].as_deref() {
            let entry = tally.entry(label).or_insert((0, i));
            entry.0 += 1;
            entry.1 = entry.1.min(i);
            voters += 1;
        }
    }
    tally.into_iter()
         .max_by(|a, b| a.1.0.cmp(&b.1.0).then(b.1.1.cmp(&a.1.1)))
         .map(|(label, (count, _))| (label, count as f64 / voters as f64))
}


fn candidate_label<'a>(c: &AnnotationCandidate, labels: &'a [Option<String>]) -> Option<&'a str> {
    labels[c.source].as_deref()
}


fn consensus<'a>(candidates: &[AnnotationCandidate],
                 labels: &'a [Option<String>]) -> Option<(&'a str, AnnotationCandidate)> {
    // Candidates are sorted nearest first and may include unlabelled profiles. If two of the
    // first three agree on a label, that label wins with the nearer of the two. Otherwise the
    // nearest labelled candidate decides.
    let top = &candidates[..candidates.len().min(NEIGHBOURS)];
    let agree = |a: usize, b: usize| -> bool {
        b < top.len() && candidate_label(&top[a], labels).is_some()
            && candidate_label(&top[a], labels) == candidate_label(&top[b], labels)
    };
    if agree(0, 1) || agree(0, 2) {
        return candidate_label(&top[0], labels).map(|l| (l, top[0]));
    }
    if agree(1, 2) {
        return candidate_label(&top[1], labels).map(|l| (l, top[1]));
    }
    candidates.iter().find_map(|c| candidate_label(c, labels).map(|l| (l, *c)))
}


fn nearest_candidates(matrix: &DistanceMatrix, target: usize, sources: &[usize]) -> Vec<AnnotationCandidate> {
    // Sorted by ascending distance, ties by index.
    let mut candidates: Vec<AnnotationCandidate> = sources.iter().filter(|&&j| j != target)
        .map(|&j| AnnotationCandidate { score: 1.0 - matrix.get(target, j), source: j, target })
        .collect();
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.source.cmp(&b.source)));
    candidates
}


pub fn annotate_partition(profiles: &mut [Profile], matrix: &DistanceMatrix, scheme: Scheme) -> usize {
    // Propagates labels over a flat clustering. Returns the number of profiles newly labelled.
    match scheme {
        Scheme::Majority => majority_by_cluster(profiles),
        Scheme::Knn3 => {
            let labels = snapshot(profiles);
            let everyone: Vec<usize> = (0..profiles.len()).collect();
            let mut count = 0;
            for i in 0..profiles.len() {
                if labels[i].is_some() { continue; }
                let candidates = nearest_candidates(matrix, i, &everyone);
                if let Some((label, c)) = consensus(&candidates, &labels) {
                    if assign(&mut profiles[c.target], label, c.score) { count += 1; }
                }
            }
            count
        }
        Scheme::Weighted => quit_with_error("the weighted scheme needs a hierarchical tree"),
    }
}


fn majority_by_cluster(profiles: &mut [Profile]) -> usize {
    let labels = snapshot(profiles);
    let mut count = 0;
    for members in members_by_cluster(profiles).values() {
        let Some((label, score)) = majority_label(members, &labels) else { continue; };
        for &i in members {
            if assign(&mut profiles[i], label, score) { count += 1; }
        }
    }
    count
}


pub fn annotate_tree(profiles: &mut [Profile], tree: &Hierarchy, branch_tops: &[usize],
                     matrix: &DistanceMatrix, scheme: Scheme) -> usize {
    // Propagates labels within the branches of a cut tree. The profiles' cluster ids must come
    // from the same cut, so that cluster k is the branch under branch_tops[k - 1].
    match scheme {
        Scheme::Majority => majority_by_cluster(profiles),
        Scheme::Knn3 => {
            let labels = snapshot(profiles);
            let mut count = 0;
            for members in members_by_cluster(profiles).values() {
                let labelled: Vec<usize> = members.iter().cloned()
                    .filter(|&j| labels[j].is_some()).collect();
                for &i in members {
                    if labels[i].is_some() { continue; }
                    let candidates = nearest_candidates(matrix, i, &labelled);
                    if let Some((label, c)) = consensus(&candidates, &labels) {
                        if assign(&mut profiles[c.target], label, c.score) { count += 1; }
                    }
                }
            }
            count
        }
        Scheme::Weighted => weighted_tree(profiles, tree, branch_tops),
    }
}


fn weighted_tree(profiles: &mut [Profile], tree: &Hierarchy, branch_tops: &[usize]) -> usize {
    // For an unlabelled leaf, every labelled leaf of the same branch votes for its label with the
    // sum of (1 - distance) over their lowest common ancestor and all its ancestors up to the
    // branch top. The best total replaces the leaf's label only when it beats the current score.
    let labels = snapshot(profiles);
    let mut count = 0;
    for &top in branch_tops {
        let leaves = tree.leaves_under(ChildRef::Node(top));
        for &u in &leaves {
            if labels[u].is_some() { continue; }
            let u_path = branch_path(tree, u, top);
            let mut totals: FxHashMap<&str, (f64, usize)> = FxHashMap::default();
            for &v in &leaves {
                let Some(label) = labels[v].as_deref() else { continue; };
                let v_path = branch_path(tree, v, top);
                let Some(lca) = v_path.iter().position(|k| u_path.contains(k)) else { continue; };
                let weight: f64 = v_path[lca..].iter().map(|&k| 1.0 - tree.nodes[k].distance).sum();
                let entry = totals.entry(label).or_insert((0.0, v));
                entry.0 += weight;
                entry.1 = entry.1.min(v);
            }
            let best = totals.into_iter()
                .max_by(|a, b| a.1.0.total_cmp(&b.1.0).then(b.1.1.cmp(&a.1.1)));
            if let Some((label, (total, _))) = best {
                if total > profiles[u].score && assign(&mut profiles[u], label, total) {
                    count += 1;
                }
            }
        }
    }
    count
}


fn branch_path(tree: &Hierarchy, leaf: usize, top: usize) -> Vec<usize> {
    // Ancestors of the leaf from its parent up to and including the branch top.
    let mut path = tree.ancestors(leaf);
    if let Some(end) = path.iter().position(|&k| k == top) {
        path.truncate(end + 1);
    }
    path
}


pub fn annotate_cross_species(profiles: &mut [Profile], foreign: &[Profile],
                              cross: &DistanceMatrix, cutoff: f64) -> usize {
    // Labels unlabelled profiles from the nearest labelled profiles of another species, using
    // only foreign profiles within the distance cutoff. Rows of the matrix are this set's
    // profiles and columns the foreign ones.
    if cross.rows() != profiles.len() || cross.cols() != foreign.len() {
        quit_with_error(&format!("a {} x {} cross-species matrix doesn't fit {} x {} profiles",
                                 cross.rows(), cross.cols(), profiles.len(), foreign.len()));
    }
    let foreign_labels: Vec<Option<String>> = foreign.iter().map(|p| p.label.clone()).collect();
    let mut count = 0;
    for i in 0..profiles.len() {
        if profiles[i].label.is_some() { continue; }
        let mut candidates: Vec<AnnotationCandidate> = (0..cross.cols())
            .filter(|&j| foreign_labels[j].is_some() && cross.get(i, j) <= cutoff)
            .map(|j| AnnotationCandidate { score: 1.0 - cross.get(i, j), source: j, target: i })
            .collect();
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.source.cmp(&b.source)));
        if let Some((label, c)) = consensus(&candidates, &foreign_labels) {
            if assign(&mut profiles[c.target], label, c.score) { count += 1; }
        }
    }
    count
}


pub fn fill_placeholders(profiles: &mut [Profile]) -> usize {
    // Any profile still without a label is named after its cluster.
    let mut count = 0;
    for p in profiles.iter_mut() {
        if p.label.is_none() {
            p.label = Some(format!("cluster_{}", p.cluster));
            p.score = 0.0;
            count += 1;
        }
    }
    count
}
