use crate::tree::Tree;
use crate::types::NodeId;

/// Default ceiling on the traversal stack depth.
///
/// Any legitimate scene is far shallower than this; hitting the ceiling
/// means the tree was built outside its intended contract.
pub const DEFAULT_DEPTH_LIMIT: usize = 128;

/// Order in which a walk emits nodes relative to their children.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// A node is emitted before any of its descendants.
    Preorder,
    /// A node is emitted after all of its descendants.
    Postorder,
}

#[derive(Clone, Copy, Debug)]
struct Frame {
    node: NodeId,
    next_child: usize,
}

/// A resumable, stack-based cursor over one [`Tree`].
///
/// The cursor starts *before* the first item; each [`advance`] moves it
/// to the next node in the chosen [`Mode`] and returns whether one was
/// found. The most recently emitted node stays available through
/// [`current`] until the next advance, and [`prune_branch`] can discard
/// whatever remains unvisited below it.
///
/// The shared borrow of the tree keeps the walk single-use and rules out
/// structural mutation while it is live: collect the ids first if the
/// visit needs to edit payloads.
///
/// [`advance`]: TraversalState::advance
/// [`current`]: TraversalState::current
/// [`prune_branch`]: TraversalState::prune_branch
pub struct TraversalState<'a, T> {
    tree: &'a Tree<T>,
    mode: Mode,
    stack: Vec<Frame>,
    item: Option<NodeId>,
    item_depth: usize,
    depth_limit: usize,
}

impl<'a, T> TraversalState<'a, T> {
    pub fn new(tree: &'a Tree<T>, root: NodeId, mode: Mode) -> Self {
        Self {
            tree,
            mode,
            stack: vec![Frame {
                node: root,
                next_child: 0,
            }],
            item: None,
            item_depth: 0,
            depth_limit: DEFAULT_DEPTH_LIMIT,
        }
    }

    /// Replaces the default stack ceiling.
    ///
    /// The limit is a safety bound, not a tuning knob: exceeding it is a
    /// contract violation and panics rather than truncating the walk.
    pub fn with_depth_limit(mut self, limit: usize) -> Self {
        assert!(limit > 0, "depth limit must allow at least the root frame");
        self.depth_limit = limit;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The node most recently emitted by [`advance`], if any.
    ///
    /// [`advance`]: TraversalState::advance
    pub fn current(&self) -> Option<NodeId> {
        self.item
    }

    /// Borrowed payload of the current node.
    pub fn item(&self) -> Option<&'a T> {
        self.item.and_then(|id| self.tree.get(id))
    }

    /// Moves to the next node in this walk's mode.
    ///
    /// Returns `false` once the walk is exhausted, and keeps returning
    /// `false` on every later call.
    pub fn advance(&mut self) -> bool {
        match self.mode {
            Mode::Preorder => self.advance_preorder(),
            Mode::Postorder => self.advance_postorder(),
        }
    }

    /// Emits a node the first time it is reached, then descends into its
    /// children left to right.
    fn advance_preorder(&mut self) -> bool {
        loop {
            let depth = self.stack.len();
            let Some(frame) = self.stack.last_mut() else {
                return false;
            };
            let node = frame.node;
            let count = self.tree.child_count(node);

            if frame.next_child == 0 {
                // First touch: this node is the next item.
                self.item = Some(node);
                self.item_depth = depth - 1;
                if count > 0 {
                    frame.next_child = 1;
                    let child = self.tree.children(node)[0];
                    self.push(child);
                } else {
                    self.stack.pop();
                }
                return true;
            }

            if frame.next_child < count {
                // Resume descent into the next unvisited child.
                frame.next_child += 1;
                let child = self.tree.children(node)[frame.next_child - 1];
                self.push(child);
            } else {
                self.stack.pop();
            }
        }
    }

    /// Emits a node once all of its children have been visited, so leaves
    /// come before their parents and the root comes last.
    fn advance_postorder(&mut self) -> bool {
        loop {
            let depth = self.stack.len();
            let Some(frame) = self.stack.last_mut() else {
                return false;
            };
            let node = frame.node;
            let count = self.tree.child_count(node);

            if frame.next_child >= count {
                self.item = Some(node);
                self.item_depth = depth - 1;
                self.stack.pop();
                return true;
            }

            frame.next_child += 1;
            let child = self.tree.children(node)[frame.next_child - 1];
            self.push(child);
        }
    }

    /// Discards everything unvisited at and below the current item's
    /// depth, so the walk resumes from the ancestor frame above it.
    ///
    /// This is the only way to skip the rest of a subtree mid-walk. It
    /// only has an effect in preorder: by the time postorder emits a
    /// node, that node's subtree has already been consumed.
    pub fn prune_branch(&mut self) {
        if self.item.is_some() && self.item_depth < self.stack.len() {
            self.stack.truncate(self.item_depth);
        }
    }

    fn push(&mut self, node: NodeId) {
        assert!(
            self.stack.len() < self.depth_limit,
            "traversal stack overflow: tree deeper than {} frames",
            self.depth_limit
        );
        self.stack.push(Frame {
            node,
            next_child: 0,
        });
    }
}

impl<T> Iterator for TraversalState<'_, T> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.advance() { self.item } else { None }
    }
}
