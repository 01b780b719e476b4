use crate::geometry::planar_distance;
use geo::{Coord, LineString};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackboneEdge {
    /// Indices into the input point set.
    pub a: usize,
    pub b: usize,
    pub weight: f64,
}

/// Minimum spanning tree of the complete Euclidean graph on `points`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackboneTree {
    pub edges: Vec<BackboneEdge>,
}

impl BackboneTree {
    /// Dense Prim. O(n^2) time, O(n) memory; the complete graph is never built.
    pub fn build(points: &[Coord<f64>]) -> Self {
        let n = points.len();
        if n < 2 {
            return Self::default();
        }

        let mut in_tree = vec![false; n];
        let mut best = vec![f64::INFINITY; n];
        let mut via = vec![0usize; n];
        let mut edges = Vec::with_capacity(n - 1);

        in_tree[0] = true;
        for i in 1..n {
            best[i] = planar_distance(points[0], points[i]);
        }

        for _ in 1..n {
            let mut next = None;
            let mut next_weight = f64::INFINITY;
            for i in 0..n {
                if !in_tree[i] && (next.is_none() || best[i] < next_weight) {
                    next = Some(i);
                    next_weight = best[i];
                }
            }
            let Some(next) = next else {
                break;
            };

            in_tree[next] = true;
            edges.push(BackboneEdge {
                a: via[next],
                b: next,
                weight: next_weight,
            });

            for i in 0..n {
                if in_tree[i] {
                    continue;
                }
                let d = planar_distance(points[next], points[i]);
                if d < best[i] {
                    best[i] = d;
                    via[i] = next;
                }
            }
        }

        Self { edges }
    }

    pub fn total_weight(&self) -> f64 {
        self.edges.iter().map(|e| e.weight).sum()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Straight line segments for each tree edge.
    pub fn lines(&self, points: &[Coord<f64>]) -> Vec<LineString<f64>> {
        self.edges
            .iter()
            .map(|e| LineString::new(vec![points[e.a], points[e.b]]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    fn spanning_weight(points: &[Coord<f64>], edges: &[(usize, usize)]) -> f64 {
        edges
            .iter()
            .map(|&(a, b)| planar_distance(points[a], points[b]))
            .sum()
    }

    // Every labelled tree on n vertices, decoded from its Prufer sequence
    fn all_trees(n: usize) -> Vec<Vec<(usize, usize)>> {
        let mut trees = Vec::new();
        let total = n.pow((n - 2) as u32);
        for code in 0..total {
            let mut seq = Vec::with_capacity(n - 2);
            let mut rest = code;
            for _ in 0..(n - 2) {
                seq.push(rest % n);
                rest /= n;
            }

            let mut degree = vec![1usize; n];
            for &s in &seq {
                degree[s] += 1;
            }
            let mut tree = Vec::with_capacity(n - 1);
            for &s in &seq {
                let leaf = (0..n).find(|&i| degree[i] == 1).unwrap();
                tree.push((leaf, s));
                degree[leaf] -= 1;
                degree[s] -= 1;
            }
            let last: Vec<usize> = (0..n).filter(|&i| degree[i] == 1).collect();
            tree.push((last[0], last[1]));
            trees.push(tree);
        }
        trees
    }

    #[test]
    fn test_empty_and_single_point() {
        assert!(BackboneTree::build(&[]).is_empty());
        assert!(BackboneTree::build(&[c(1.0, 1.0)]).is_empty());
    }

    #[test]
    fn test_tree_has_n_minus_one_edges_and_spans() {
        let points: Vec<Coord<f64>> = (0..12)
            .map(|i| c((i * 37 % 11) as f64 * 10.0, (i * 17 % 7) as f64 * 13.0))
            .collect();
        let tree = BackboneTree::build(&points);
        assert_eq!(tree.len(), points.len() - 1);

        let mut reached = vec![false; points.len()];
        reached[0] = true;
        for edge in &tree.edges {
            assert!(reached[edge.a]);
            reached[edge.b] = true;
        }
        assert!(reached.iter().all(|r| *r));
    }

    #[test]
    fn test_minimal_against_every_spanning_tree() {
        let points = [
            c(0.0, 0.0),
            c(4.0, 1.0),
            c(1.0, 5.0),
            c(7.0, 6.0),
            c(3.0, 3.0),
        ];
        let tree = BackboneTree::build(&points);
        let weight = tree.total_weight();

        let trees = all_trees(points.len());
        assert_eq!(trees.len(), 125);
        for other in trees {
            assert!(weight <= spanning_weight(&points, &other) + 1e-9);
        }
    }

    #[test]
    fn test_collinear_points_chain() {
        let points = [c(0.0, 0.0), c(20.0, 0.0), c(10.0, 0.0)];
        let tree = BackboneTree::build(&points);
        assert!((tree.total_weight() - 20.0).abs() < 1e-9);
        assert_eq!(tree.lines(&points).len(), 2);
    }
}
