//! Ward (minimum variance) agglomerative clustering.
//!
//! Built with the nearest-neighbour chain, which is exact for Ward because
//! the criterion is reducible. Heights are in coordinate units.

use geo::Coord;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    /// Any original point of each merged cluster.
    pub left: usize,
    pub right: usize,
    pub height: f64,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct Dendrogram {
    points: usize,
    // Ascending by height
    merges: Vec<Merge>,
}

// Condensed upper-triangle index
fn slot(n: usize, i: usize, j: usize) -> usize {
    let (i, j) = if i < j { (i, j) } else { (j, i) };
    n * i - i * (i + 1) / 2 + (j - i - 1)
}

impl Dendrogram {
    pub fn ward(points: &[Coord<f64>]) -> Self {
        let n = points.len();
        if n < 2 {
            return Self {
                points: n,
                merges: Vec::new(),
            };
        }

        // Squared distances, updated in place by Lance-Williams
        let mut d2 = vec![0.0f64; n * (n - 1) / 2];
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = points[i].x - points[j].x;
                let dy = points[i].y - points[j].y;
                d2[slot(n, i, j)] = dx * dx + dy * dy;
            }
        }

        let mut active = vec![true; n];
        let mut size = vec![1usize; n];
        let mut rep: Vec<usize> = (0..n).collect();
        let mut chain: Vec<usize> = Vec::with_capacity(n);
        let mut merges = Vec::with_capacity(n - 1);

        for _ in 0..(n - 1) {
            if chain.is_empty() {
                if let Some(first) = active.iter().position(|a| *a) {
                    chain.push(first);
                }
            }

            let (x, y, dist2) = loop {
                let x = chain[chain.len() - 1];
                let prev = if chain.len() >= 2 {
                    Some(chain[chain.len() - 2])
                } else {
                    None
                };

                // The predecessor wins ties, otherwise the chain could cycle
                let mut best = prev;
                let mut best_d2 = prev.map_or(f64::INFINITY, |p| d2[slot(n, x, p)]);
                for i in 0..n {
                    if i == x || !active[i] {
                        continue;
                    }
                    let d = d2[slot(n, x, i)];
                    if d < best_d2 {
                        best_d2 = d;
                        best = Some(i);
                    }
                }

                let Some(y) = best else {
                    unreachable!("an active cluster always has a neighbour while merges remain")
                };
                if Some(y) == prev {
                    chain.pop();
                    chain.pop();
                    break (x, y, best_d2);
                }
                chain.push(y);
            };

            let (keep, gone) = if x < y { (x, y) } else { (y, x) };
            let (sk, sg) = (size[keep] as f64, size[gone] as f64);

            for i in 0..n {
                if !active[i] || i == keep || i == gone {
                    continue;
                }
                let si = size[i] as f64;
                let updated = ((sk + si) * d2[slot(n, keep, i)] + (sg + si) * d2[slot(n, gone, i)]
                    - si * dist2)
                    / (sk + sg + si);
                d2[slot(n, keep, i)] = updated.max(0.0);
            }

            merges.push(Merge {
                left: rep[keep],
                right: rep[gone],
                height: dist2.max(0.0).sqrt(),
                size: size[keep] + size[gone],
            });

            active[gone] = false;
            size[keep] += size[gone];
            rep[keep] = rep[keep].min(rep[gone]);
        }

        merges.sort_by(|a, b| a.height.total_cmp(&b.height));

        Self { points: n, merges }
    }

    pub fn point_count(&self) -> usize {
        self.points
    }

    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    pub fn max_height(&self) -> f64 {
        self.merges.last().map_or(0.0, |m| m.height)
    }

    /// Smallest non-zero merge height. Any cutoff below it gives the finest
    /// achievable partition.
    pub fn min_positive_height(&self) -> Option<f64> {
        self.merges.iter().map(|m| m.height).find(|h| *h > 0.0)
    }

    /// Flat clusters joined by every merge with height at most `threshold`.
    /// Clusters come out ordered by their smallest member, members ascending.
    pub fn cut(&self, threshold: f64) -> Vec<Vec<usize>> {
        let mut parent: Vec<usize> = (0..self.points).collect();

        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        for merge in self.merges.iter().take_while(|m| m.height <= threshold) {
            let a = find(&mut parent, merge.left);
            let b = find(&mut parent, merge.right);
            if a != b {
                let (lo, hi) = if a < b { (a, b) } else { (b, a) };
                parent[hi] = lo;
            }
        }

        let mut clusters: Vec<Vec<usize>> = Vec::new();
        let mut cluster_of_root: Vec<Option<usize>> = vec![None; self.points];
        for point in 0..self.points {
            let root = find(&mut parent, point);
            match cluster_of_root[root] {
                Some(c) => clusters[c].push(point),
                None => {
                    cluster_of_root[root] = Some(clusters.len());
                    clusters.push(vec![point]);
                }
            }
        }
        clusters
    }

    pub fn largest_cluster(&self, threshold: f64) -> usize {
        self.cut(threshold).iter().map(Vec::len).max().unwrap_or(0)
    }
}
