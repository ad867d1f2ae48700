// This file contains agglomerative clustering of profiles into a binary merge tree, plus the
// code for saving that tree in Newick format and cutting it into branches at a distance cutoff.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of srnaclust. srnaclust is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. srnaclust
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with srnaclust. If not, see <http://www.gnu.org/licenses/>.

use clap::ValueEnum;
use std::fs::File;
use std::io;
use std::io::Write;
use std::path::Path;

use crate::distance_matrix::DistanceMatrix;
use crate::evaluate::v_measure;
use crate::profile::{Category, Profile};


#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Linkage {
    Average,   // size-weighted mean of the two merged clusters' distances
    Complete,  // maximum of the two merged clusters' distances
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildRef {
    Leaf(usize),
    Node(usize),
}


#[derive(Clone, Debug)]
pub struct HierarchyNode {
    pub left: ChildRef,
    pub right: ChildRef,
    pub distance: f64,
    pub parent: Option<usize>,
    pub left_leaves: usize,
    pub right_leaves: usize,
}

impl HierarchyNode {
    pub fn leaf_count(&self) -> usize {
        self.left_leaves + self.right_leaves
    }
}


/// The merge tree for N leaves. Nodes are stored in merge order, so every node's children come
/// before it and the root is the last node (N - 2).
#[derive(Clone, Debug)]
pub struct Hierarchy {
    pub nodes: Vec<HierarchyNode>,
    pub leaf_count: usize,
    pub leaf_parents: Vec<Option<usize>>,
}

impl Hierarchy {
    pub fn root(&self) -> Option<usize> {
        self.nodes.len().checked_sub(1)
    }

    pub fn leaves_under(&self, child: ChildRef) -> Vec<usize> {
        let mut leaves = Vec::new();
        let mut stack = vec![child];
        while let Some(c) = stack.pop() {
            match c {
                ChildRef::Leaf(i) => leaves.push(i),
                ChildRef::Node(k) => {
                    stack.push(self.nodes[k].right);
                    stack.push(self.nodes[k].left);
                }
            }
        }
        leaves
    }

    pub fn merge_distances(&self) -> Vec<f64> {
        // Distinct merge distances in ascending order.
        let mut distances: Vec<f64> = self.nodes.iter().map(|n| n.distance).collect();
        distances.sort_by(|a, b| a.total_cmp(b));
        distances.dedup();
        distances
    }

    pub fn to_newick(&self, profiles: &[Profile]) -> String {
        match self.root() {
            Some(root) => format!("{};", self.node_to_newick(root, profiles)),
            None if self.leaf_count == 1 => format!("{};", profiles[0].string_for_newick()),
            None => ";".to_string(),
        }
    }

    fn node_to_newick(&self, node: usize, profiles: &[Profile]) -> String {
        // Both children get the node's own merge distance as their branch length.
        let n = &self.nodes[node];
        format!("({}:{:.6},{}:{:.6})", self.child_to_newick(n.left, profiles), n.distance,
                self.child_to_newick(n.right, profiles), n.distance)
    }

    fn child_to_newick(&self, child: ChildRef, profiles: &[Profile]) -> String {
        match child {
            ChildRef::Leaf(i) => profiles[i].string_for_newick(),
            ChildRef::Node(k) => self.node_to_newick(k, profiles),
        }
    }

    pub fn branch(&self, cutoff: f64) -> (Vec<usize>, Vec<usize>) {
        // Cuts the tree into branches: for each node within the cutoff, climb to the highest
        // ancestor whose merge distance is also within the cutoff. Each such top node is a branch
        // (ids from 1, in node order), then every leaf outside all branches gets its own id in
        // leaf order. Returns the cluster id of every leaf and the top node of every branch.
        let mut clusters = vec![0; self.leaf_count];
        let mut visited = vec![false; self.nodes.len()];
        let mut branch_tops = Vec::new();
        for k in 0..self.nodes.len() {
            if visited[k] || self.nodes[k].distance > cutoff { continue; }
            let mut top = k;
            while let Some(p) = self.nodes[top].parent {
                if self.nodes[p].distance > cutoff { break; }
                top = p;
            }
            branch_tops.push(top);
            let id = branch_tops.len();
            self.mark_subtree(top, &mut visited);
            for leaf in self.leaves_under(ChildRef::Node(top)) {
                clusters[leaf] = id;
            }
        }
        let mut next_id = branch_tops.len() + 1;
        for c in clusters.iter_mut() {
            if *c == 0 {
                *c = next_id;
                next_id += 1;
            }
        }
        (clusters, branch_tops)
    }

    fn mark_subtree(&self, node: usize, visited: &mut [bool]) {
        let mut stack = vec![node];
        while let Some(k) = stack.pop() {
            visited[k] = true;
            for child in [self.nodes[k].left, self.nodes[k].right] {
                if let ChildRef::Node(c) = child { stack.push(c); }
            }
        }
    }

    pub fn ancestors(&self, leaf: usize) -> Vec<usize> {
        // Nodes from the leaf's parent up to the root.
        let mut path = Vec::new();
        let mut current = self.leaf_parents[leaf];
        while let Some(k) = current {
            path.push(k);
            current = self.nodes[k].parent;
        }
        path
    }
}


pub fn hierarchical_cluster(matrix: &DistanceMatrix, linkage: Linkage) -> Hierarchy {
    // Pairwise agglomeration over a working copy of the matrix. Active clusters live in slots
    // 0..active. When slots is and js merge, the merged cluster takes slot js and the last
    // active cluster moves into slot is.
    let n = matrix.rows();
    let mut work = matrix.submatrix(&(0..n).collect::<Vec<usize>>());
    let mut ids: Vec<ChildRef> = (0..n).map(ChildRef::Leaf).collect();
    let mut sizes: Vec<usize> = vec![1; n];
    let mut nodes = Vec::with_capacity(n.saturating_sub(1));
    for active in (2..=n).rev() {
        let (is, js, distance) = closest_pair(&work, active);
        nodes.push(HierarchyNode { left: ids[is], right: ids[js], distance, parent: None,
                                   left_leaves: 0, right_leaves: 0 });
        for k in 0..active {
            if k == is || k == js { continue; }
            let d = match linkage {
                Linkage::Average => (sizes[is] as f64 * work.get(is, k)
                                     + sizes[js] as f64 * work.get(js, k))
                                    / (sizes[is] + sizes[js]) as f64,
                Linkage::Complete => work.get(is, k).max(work.get(js, k)),
            };
            work.set(js, k, d);
            work.set(k, js, d);
        }
        sizes[js] += sizes[is];
        let last = active - 1;
        for k in 0..last {
            let d = work.get(last, k);
            work.set(is, k, d);
            work.set(k, is, d);
        }
        sizes[is] = sizes[last];
        ids[is] = ids[last];
        ids[js] = ChildRef::Node(nodes.len() - 1);
    }
    convert_tree(nodes, n)
}


fn closest_pair(work: &DistanceMatrix, active: usize) -> (usize, usize, f64) {
    // The first strictly smallest distance wins, scanning rows from 1 and columns below the row.
    let (mut is, mut js, mut best) = (1, 0, f64::INFINITY);
    for i in 1..active {
        for j in 0..i {
            let d = work.get(i, j);
            if d < best {
                best = d;
                is = i;
                js = j;
            }
        }
    }
    (is, js, best)
}


pub fn convert_tree(mut nodes: Vec<HierarchyNode>, leaf_count: usize) -> Hierarchy {
    // Fills in parent links and per-side leaf counts. Children always precede their parent.
    let mut leaf_parents = vec![None; leaf_count];
    for k in 0..nodes.len() {
        let mut counts = [0; 2];
        for (side, child) in [nodes[k].left, nodes[k].right].into_iter().enumerate() {
            counts[side] = match child {
                ChildRef::Leaf(i) => { leaf_parents[i] = Some(k); 1 }
                ChildRef::Node(c) => { nodes[c].parent = Some(k); nodes[c].leaf_count() }
            };
        }
        nodes[k].left_leaves = counts[0];
        nodes[k].right_leaves = counts[1];
    }
    Hierarchy { nodes, leaf_count, leaf_parents }
}


pub fn save_newick(tree: &Hierarchy, profiles: &[Profile], filename: &Path) -> io::Result<()> {
    let mut file = File::create(filename)?;
    writeln!(file, "{}", tree.to_newick(profiles))
}


pub fn choose_cutoff(tree: &Hierarchy, profiles: &[Profile]) -> Option<f64> {
    // Picks the merge distance whose branching best matches the known labels (highest
    // V-measure, smallest cutoff on ties). Returns None when no profile has a known label.
    let known: Vec<usize> = (0..profiles.len())
        .filter(|&i| profiles[i].category == Category::Known && profiles[i].is_labelled())
        .collect();
    if known.is_empty() { return None; }
    let mut best: Option<(f64, f64)> = None;
    for cutoff in tree.merge_distances() {
        let (clusters, _) = tree.branch(cutoff);
        let pairs: Vec<(&str, usize)> = known.iter()
            .filter_map(|&i| profiles[i].label.as_deref().map(|l| (l, clusters[i])))
            .collect();
        let score = v_measure(&pairs).v_measure;
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((cutoff, score));
        }
    }
    best.map(|(cutoff, _)| cutoff)
}
