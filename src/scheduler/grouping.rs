//! Constraint-key clustering
//!
//! Tests that share any constraint key must never overlap. Key sets can
//! overlap pairwise without being identical, so membership is resolved with
//! a disjoint-set over the currently ready tests.

use std::collections::{BTreeSet, HashMap};

/// Disjoint-set with path compression and union by rank
#[derive(Debug)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = x;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// A set of tests that transitively share constraint keys
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyCluster<T> {
    pub members: Vec<T>,
    /// Union of the members' keys, sorted
    pub keys: Vec<String>,
}

/// Cluster items by shared keys.
///
/// Clusters come out ordered by their first member, and members keep their
/// input order.
pub fn cluster_by_keys<T: Copy>(items: &[(T, &[String])]) -> Vec<KeyCluster<T>> {
    let mut sets = DisjointSet::new(items.len());
    let mut first_holder: HashMap<&str, usize> = HashMap::new();

    for (position, (_, keys)) in items.iter().enumerate() {
        for key in keys.iter() {
            match first_holder.get(key.as_str()) {
                Some(&holder) => sets.union(holder, position),
                None => {
                    first_holder.insert(key.as_str(), position);
                }
            }
        }
    }

    let mut cluster_of_root: HashMap<usize, usize> = HashMap::new();
    let mut clusters: Vec<(Vec<T>, BTreeSet<String>)> = Vec::new();

    for (position, (item, keys)) in items.iter().enumerate() {
        let root = sets.find(position);
        let slot = *cluster_of_root.entry(root).or_insert_with(|| {
            clusters.push((Vec::new(), BTreeSet::new()));
            clusters.len() - 1
        });
        clusters[slot].0.push(*item);
        clusters[slot].1.extend(keys.iter().cloned());
    }

    clusters
        .into_iter()
        .map(|(members, keys)| KeyCluster {
            members,
            keys: keys.into_iter().collect(),
        })
        .collect()
}

/// Whether any two of the key sets share a key
pub fn any_shared_key(key_sets: &[&[String]]) -> bool {
    let mut seen = BTreeSet::new();
    for keys in key_sets {
        let unique: BTreeSet<&str> = keys.iter().map(String::as_str).collect();
        for key in unique {
            if !seen.insert(key) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_disjoint_set() {
        let mut set = DisjointSet::new(5);
        set.union(0, 1);
        set.union(3, 4);
        set.union(1, 4);
        assert_eq!(set.find(0), set.find(3));
        assert_ne!(set.find(0), set.find(2));
    }

    #[test]
    fn test_transitive_overlap_merges() {
        // a-b share "x", b-c share "y": one cluster even though a and c share nothing
        let a = keys(&["x"]);
        let b = keys(&["x", "y"]);
        let c = keys(&["y"]);
        let d = keys(&["z"]);
        let items = [(0, a.as_slice()), (1, b.as_slice()), (2, c.as_slice()), (3, d.as_slice())];

        let clusters = cluster_by_keys(&items);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].members, vec![0, 1, 2]);
        assert_eq!(clusters[0].keys, keys(&["x", "y"]));
        assert_eq!(clusters[1].members, vec![3]);
    }

    #[test]
    fn test_cluster_order_follows_first_member() {
        let a = keys(&["late"]);
        let b = keys(&["early"]);
        let c = keys(&["late"]);
        let items = [(10, a.as_slice()), (20, b.as_slice()), (30, c.as_slice())];

        let clusters = cluster_by_keys(&items);
        assert_eq!(clusters[0].members, vec![10, 30]);
        assert_eq!(clusters[1].members, vec![20]);
    }

    #[test]
    fn test_any_shared_key() {
        let a = keys(&["db"]);
        let b = keys(&["cache"]);
        let c = keys(&["db", "fs"]);
        assert!(!any_shared_key(&[a.as_slice(), b.as_slice()]));
        assert!(any_shared_key(&[a.as_slice(), b.as_slice(), c.as_slice()]));
        // a key repeated inside one set is not a conflict
        let dup = keys(&["q", "q"]);
        assert!(!any_shared_key(&[dup.as_slice()]));
    }
}
