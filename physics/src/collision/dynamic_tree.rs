//! Dynamic AABB tree with fattened leaves
//!
//! Leaves store fattened bounds so that small motions do not require a
//! re-insert. Insertion walks down using a perimeter cost heuristic and the
//! path back to the root is rebalanced with tree rotations.

use super::Aabb;

const NULL_NODE: usize = usize::MAX;

#[derive(Debug, Clone)]
struct TreeNode {
    aabb: Aabb,
    parent: usize,
    child1: usize,
    child2: usize,
    /// Leaf = 0, free node = -1
    height: i32,
    /// Body index for leaves
    user: usize,
}

impl TreeNode {
    #[inline]
    fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

/// Incrementally updated bounding volume hierarchy
#[derive(Debug, Clone)]
pub struct DynamicTree {
    nodes: Vec<TreeNode>,
    root: usize,
    free: Vec<usize>,
    leaf_count: usize,
}

impl Default for DynamicTree {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DynamicTree {
    /// Create a tree pre-sized for `capacity` leaves
    pub fn new(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity.saturating_mul(2)),
            root: NULL_NODE,
            free: Vec::new(),
            leaf_count: 0,
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Height of the root, 0 for a single leaf
    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root].height
        }
    }

    /// Fattened bounds stored for a proxy
    pub fn fat_aabb(&self, proxy: usize) -> Aabb {
        self.nodes[proxy].aabb
    }

    fn allocate(&mut self) -> usize {
        let node = TreeNode {
            aabb: Aabb::new(glam::Vec2::ZERO, glam::Vec2::ZERO),
            parent: NULL_NODE,
            child1: NULL_NODE,
            child2: NULL_NODE,
            height: 0,
            user: NULL_NODE,
        };
        if let Some(index) = self.free.pop() {
            self.nodes[index] = node;
            index
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    fn release(&mut self, index: usize) {
        self.nodes[index].height = -1;
        self.free.push(index);
    }

    /// Insert a proxy with already fattened bounds
    pub fn create_proxy(&mut self, fat_aabb: Aabb, user: usize) -> usize {
        let proxy = self.allocate();
        self.nodes[proxy].aabb = fat_aabb;
        self.nodes[proxy].user = user;
        self.insert_leaf(proxy);
        self.leaf_count += 1;
        proxy
    }

    /// Re-insert the proxy if `tight` escaped its fat bounds.
    /// Returns true when the tree changed.
    pub fn move_proxy(&mut self, proxy: usize, tight: Aabb, margin: f32) -> bool {
        if self.nodes[proxy].aabb.contains(&tight) {
            return false;
        }
        self.remove_leaf(proxy);
        self.nodes[proxy].aabb = tight.fattened(margin);
        self.insert_leaf(proxy);
        true
    }

    /// Visit every leaf overlapping `aabb`. The callback returns false to stop.
    pub fn query<F>(&self, aabb: &Aabb, mut callback: F)
    where
        F: FnMut(usize) -> bool,
    {
        if self.root == NULL_NODE {
            return;
        }
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                if !callback(node.user) {
                    return;
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    fn insert_leaf(&mut self, leaf: usize) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf].parent = NULL_NODE;
            return;
        }

        // Find the best sibling
        let leaf_aabb = self.nodes[leaf].aabb;
        let mut index = self.root;
        while !self.nodes[index].is_leaf() {
            let node = &self.nodes[index];
            let (child1, child2) = (node.child1, node.child2);

            let area = node.aabb.perimeter();
            let combined_area = node.aabb.union(&leaf_aabb).perimeter();

            // Cost of creating a new parent for this node and the new leaf
            let cost = 2.0 * combined_area;
            // Minimum cost of pushing the leaf further down the tree
            let inheritance_cost = 2.0 * (combined_area - area);

            let cost1 = self.descend_cost(child1, &leaf_aabb) + inheritance_cost;
            let cost2 = self.descend_cost(child2, &leaf_aabb) + inheritance_cost;

            if cost < cost1 && cost < cost2 {
                break;
            }
            index = if cost1 < cost2 { child1 } else { child2 };
        }

        let sibling = index;
        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.allocate();
        self.nodes[new_parent].parent = old_parent;
        self.nodes[new_parent].aabb = leaf_aabb.union(&self.nodes[sibling].aabb);
        self.nodes[new_parent].height = self.nodes[sibling].height + 1;
        self.nodes[new_parent].child1 = sibling;
        self.nodes[new_parent].child2 = leaf;
        self.nodes[sibling].parent = new_parent;
        self.nodes[leaf].parent = new_parent;

        if old_parent == NULL_NODE {
            self.root = new_parent;
        } else if self.nodes[old_parent].child1 == sibling {
            self.nodes[old_parent].child1 = new_parent;
        } else {
            self.nodes[old_parent].child2 = new_parent;
        }

        self.refit_from(self.nodes[leaf].parent);
    }

    fn descend_cost(&self, child: usize, leaf_aabb: &Aabb) -> f32 {
        let node = &self.nodes[child];
        let merged = leaf_aabb.union(&node.aabb).perimeter();
        if node.is_leaf() {
            merged
        } else {
            merged - node.aabb.perimeter()
        }
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf].parent;
        let grand_parent = self.nodes[parent].parent;
        let sibling = if self.nodes[parent].child1 == leaf {
            self.nodes[parent].child2
        } else {
            self.nodes[parent].child1
        };

        if grand_parent == NULL_NODE {
            self.root = sibling;
            self.nodes[sibling].parent = NULL_NODE;
            self.release(parent);
        } else {
            if self.nodes[grand_parent].child1 == parent {
                self.nodes[grand_parent].child1 = sibling;
            } else {
                self.nodes[grand_parent].child2 = sibling;
            }
            self.nodes[sibling].parent = grand_parent;
            self.release(parent);
            self.refit_from(grand_parent);
        }
    }

    /// Walk to the root rebalancing and refitting
    fn refit_from(&mut self, start: usize) {
        let mut index = start;
        while index != NULL_NODE {
            index = self.balance(index);
            let child1 = self.nodes[index].child1;
            let child2 = self.nodes[index].child2;
            self.nodes[index].height = 1 + self.nodes[child1].height.max(self.nodes[child2].height);
            self.nodes[index].aabb = self.nodes[child1].aabb.union(&self.nodes[child2].aabb);
            index = self.nodes[index].parent;
        }
    }

    /// Rotate `a` if its subtrees differ in height by more than one.
    /// Returns the index of the subtree root after rotation.
    fn balance(&mut self, a: usize) -> usize {
        if self.nodes[a].is_leaf() || self.nodes[a].height < 2 {
            return a;
        }

        let b = self.nodes[a].child1;
        let c = self.nodes[a].child2;
        let balance = self.nodes[c].height - self.nodes[b].height;

        if balance > 1 {
            // Rotate C up
            let f = self.nodes[c].child1;
            let g = self.nodes[c].child2;

            self.nodes[c].child1 = a;
            self.nodes[c].parent = self.nodes[a].parent;
            self.nodes[a].parent = c;
            self.replace_child(self.nodes[c].parent, a, c);

            if self.nodes[f].height > self.nodes[g].height {
                self.nodes[c].child2 = f;
                self.nodes[a].child2 = g;
                self.nodes[g].parent = a;
            } else {
                self.nodes[c].child2 = g;
                self.nodes[a].child2 = f;
                self.nodes[f].parent = a;
            }
            self.refit_node(a);
            self.refit_node(c);
            return c;
        }

        if balance < -1 {
            // Rotate B up
            let d = self.nodes[b].child1;
            let e = self.nodes[b].child2;

            self.nodes[b].child1 = a;
            self.nodes[b].parent = self.nodes[a].parent;
            self.nodes[a].parent = b;
            self.replace_child(self.nodes[b].parent, a, b);

            if self.nodes[d].height > self.nodes[e].height {
                self.nodes[b].child2 = d;
                self.nodes[a].child1 = e;
                self.nodes[e].parent = a;
            } else {
                self.nodes[b].child2 = e;
                self.nodes[a].child1 = d;
                self.nodes[d].parent = a;
            }
            self.refit_node(a);
            self.refit_node(b);
            return b;
        }

        a
    }

    fn replace_child(&mut self, parent: usize, old: usize, new: usize) {
        if parent == NULL_NODE {
            self.root = new;
        } else if self.nodes[parent].child1 == old {
            self.nodes[parent].child1 = new;
        } else {
            self.nodes[parent].child2 = new;
        }
    }

    fn refit_node(&mut self, index: usize) {
        let child1 = self.nodes[index].child1;
        let child2 = self.nodes[index].child2;
        self.nodes[index].aabb = self.nodes[child1].aabb.union(&self.nodes[child2].aabb);
        self.nodes[index].height = 1 + self.nodes[child1].height.max(self.nodes[child2].height);
    }

    /// Structural self-check used by tests
    #[cfg(test)]
    fn validate(&self) {
        if self.root == NULL_NODE {
            return;
        }
        assert_eq!(self.nodes[self.root].parent, NULL_NODE);
        let mut stack = vec![self.root];
        let mut leaves = 0;
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.is_leaf() {
                leaves += 1;
                assert_eq!(node.height, 0);
                continue;
            }
            let (c1, c2) = (&self.nodes[node.child1], &self.nodes[node.child2]);
            assert_eq!(c1.parent, index);
            assert_eq!(c2.parent, index);
            assert_eq!(node.height, 1 + c1.height.max(c2.height));
            assert!(node.aabb.contains(&c1.aabb) && node.aabb.contains(&c2.aabb));
            stack.push(node.child1);
            stack.push(node.child2);
        }
        assert_eq!(leaves, self.leaf_count);
    }
}
