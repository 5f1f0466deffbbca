/// Identifier for a node in a [`crate::tree::Tree`].
///
/// This is an index into the tree's slot arena, and is only meaningful
/// within the lifetime of a given `Tree` instance. Destroying a node
/// returns its index to a free list, so an id held across a `destroy`
/// may later refer to a different node.
pub type NodeId = usize;
