//! An index-based union-find for the lifetime partition. Parallel arrays
//! rather than pointer chasing; the component runtime has its own
//! pointer-based forest with different concurrency needs.

pub struct Partition {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl Partition {
    pub fn new(n: usize) -> Self {
        Partition {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cursor = x;
        while self.parent[cursor] != root {
            let next = self.parent[cursor];
            self.parent[cursor] = root;
            cursor = next;
        }
        root
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
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

    pub fn same(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    /// Map every element to a dense class index, classes numbered in first-
    /// appearance order.
    pub fn classes(&mut self) -> Vec<usize> {
        let n = self.parent.len();
        let mut class_of_root = vec![usize::MAX; n];
        let mut next = 0;
        (0..n)
            .map(|x| {
                let root = self.find(x);
                if class_of_root[root] == usize::MAX {
                    class_of_root[root] = next;
                    next += 1;
                }
                class_of_root[root]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_find_basics() {
        let mut p = Partition::new(5);
        assert!(!p.same(0, 1));
        p.union(0, 1);
        p.union(3, 4);
        assert!(p.same(0, 1));
        assert!(p.same(4, 3));
        assert!(!p.same(1, 3));
        p.union(1, 4);
        assert!(p.same(0, 3));
    }

    #[test]
    fn dense_classes() {
        let mut p = Partition::new(4);
        p.union(2, 3);
        let classes = p.classes();
        assert_eq!(classes[0], 0);
        assert_eq!(classes[1], 1);
        assert_eq!(classes[2], classes[3]);
    }
}
