use crate::geometry::planar_distance;
use crate::hub::Leaf;
use crate::ids::LeafId;
use crate::spatial::PointIndex;
use geo::Coord;
use serde::Serialize;
use tracing::info;

/// Service terminal gathering a handful of neighbouring homes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceTerminal {
    pub id: u32,
    #[serde(skip)]
    pub location: Coord<f64>,
    pub members: Vec<LeafId>,
}

/// Greedy assignment in input order: a leaf joins the closest terminal that
/// still has room and lies within `max_distance`, otherwise opens a new one
/// at its own location.
pub fn assign_terminals(leaves: &[Leaf], capacity: usize, max_distance: f64) -> Vec<ServiceTerminal> {
    let mut terminals: Vec<ServiceTerminal> = Vec::new();
    let mut index: PointIndex<usize> = PointIndex::new();

    for leaf in leaves {
        let open = index
            .nearest_where(leaf.coord, |&t| terminals[t].members.len() < capacity)
            .filter(|(_, d)| *d <= max_distance)
            .map(|(&t, _)| t);

        match open {
            Some(t) => terminals[t].members.push(leaf.id),
            None => {
                let t = terminals.len();
                terminals.push(ServiceTerminal {
                    id: t as u32 + 1,
                    location: leaf.coord,
                    members: vec![leaf.id],
                });
                index.insert(leaf.coord, t);
            }
        }
    }

    let max_reach = terminals
        .iter()
        .map(|t| terminal_reach(t, leaves))
        .fold(0.0, f64::max);
    info!(
        terminals = terminals.len(),
        leaves = leaves.len(),
        max_reach,
        "assigned service terminals"
    );
    terminals
}

/// Longest distance from a terminal to any of its members.
pub fn terminal_reach(terminal: &ServiceTerminal, leaves: &[Leaf]) -> f64 {
    leaves
        .iter()
        .filter(|l| terminal.members.contains(&l.id))
        .map(|l| planar_distance(l.coord, terminal.location))
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(points: &[(f64, f64)]) -> Vec<Leaf> {
        points
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| Leaf::new(LeafId(i), Coord { x, y }))
            .collect()
    }

    #[test]
    fn test_capacity_opens_new_terminal() {
        let homes = leaves(&[(0.0, 0.0); 20]);
        let terminals = assign_terminals(&homes, 9, 1000.0);

        let sizes: Vec<usize> = terminals.iter().map(|t| t.members.len()).collect();
        assert_eq!(sizes, vec![9, 9, 2]);
    }

    #[test]
    fn test_distance_limit() {
        let homes = leaves(&[(0.0, 0.0), (500.0, 0.0), (1500.0, 0.0), (1200.0, 0.0)]);
        let terminals = assign_terminals(&homes, 9, 1000.0);

        assert_eq!(terminals.len(), 2);
        assert_eq!(terminals[0].members, vec![LeafId(0), LeafId(1)]);
        assert_eq!(terminals[1].members, vec![LeafId(2), LeafId(3)]);
        assert!(terminals.iter().all(|t| terminal_reach(t, &homes) <= 1000.0));
    }
}
