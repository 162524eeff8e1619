//! Hop distance between bones in the ancestry graph.
//!
//! Parent links make an undirected graph on the bones. Two bones can be
//! neighbors in space yet far apart in this graph (eg. a hand resting on a
//! thigh); interpolation uses the distance to avoid mixing their weights.

use petgraph::Graph;
use petgraph::algo::dijkstra;
use petgraph::graph::NodeIndex;
use super::BoneIndex;

pub struct FiliationTable {
    num_bones: usize,
    /// `hops[a * num_bones + b]`, `None` when b can't be reached from a.
    hops: Vec<Option<u32>>,
}

impl FiliationTable {
    pub fn new(num_bones: usize, ancestry: &[(BoneIndex, BoneIndex)]) -> FiliationTable {
        let mut graph = Graph::<(), (), petgraph::Undirected>::new_undirected();
        let nodes = (0..num_bones)
            .map(|_| graph.add_node(()))
            .collect::<Vec<NodeIndex>>();
        for &(a, b) in ancestry {
            let (a, b) = (a as usize, b as usize);
            if a < num_bones && b < num_bones {
                graph.add_edge(nodes[a], nodes[b], ());
            } else {
                warn!("ancestry pair ({}, {}) names a bone past {}; ignored", a, b, num_bones);
            }
        }

        let mut hops = vec![None; num_bones * num_bones];
        for a in 0..num_bones {
            let dists = dijkstra(&graph, nodes[a], None, |_| 1u32);
            for (node, d) in dists {
                hops[a * num_bones + node.index()] = Some(d);
            }
        }

        FiliationTable { num_bones, hops }
    }

    pub fn num_bones(&self) -> usize {
        self.num_bones
    }

    pub fn hops(&self, a: BoneIndex, b: BoneIndex) -> Option<u32> {
        let (a, b) = (a as usize, b as usize);
        if a >= self.num_bones || b >= self.num_bones {
            return None;
        }
        self.hops[a * self.num_bones + b]
    }
}

#[test]
fn test() {
    //   0
    //  / \
    // 1   2     4 (separate)
    //     |
    //     3
    let table = FiliationTable::new(5, &[(1, 0), (2, 0), (3, 2)]);
    assert_eq!(table.hops(0, 0), Some(0));
    assert_eq!(table.hops(1, 0), Some(1));
    assert_eq!(table.hops(0, 1), Some(1));
    assert_eq!(table.hops(1, 3), Some(3));
    assert_eq!(table.hops(3, 1), Some(3));
    assert_eq!(table.hops(4, 0), None);
    assert_eq!(table.hops(4, 4), Some(0));
    assert_eq!(table.hops(9, 0), None);
}
