use crate::error::PffError;
use serde::{Deserialize, Serialize};
use std::io::BufReader;

/// One record in the descriptors index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexValue {
    /**Descriptor identifier. Stored as 64 bits on disk but every valid value fits in 32 bits */
    pub identifier: u64,
    /**Identifier of the parent descriptor. The root folder descriptor points to itself */
    pub parent_identifier: u32,
    /**Opaque handle into the offsets index for the item data */
    pub data_identifier: u64,
    /**Opaque handle into the offsets index for the local descriptors tree */
    pub local_descriptors_identifier: u64,
}

/// Position of a node in the descriptors index: a page, or one record on a leaf page.
/// How the fields are interpreted is up to the index implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexNode {
    /**Offset of the page holding the node */
    pub offset: u64,
    /**Index of the record on a leaf page. `None` for the page itself */
    pub entry: Option<u16>,
}

/**
 * Lazy view of the descriptors index consumed by the item tree builder.
 *
 * Implementations may perform I/O through `fs` and cache what they read.
 * The reference handed out by `node_value` only lives until the next call
 * that can touch the cache, which the `&mut self` receivers enforce: copy
 * the scalar fields before calling anything else.
 */
pub trait DescriptorsIndex<T: std::io::Seek + std::io::Read> {
    /// Root node of the index tree
    fn root_node(&self) -> IndexNode;

    /// Deleted nodes are skipped by the builder. Only index sources that track
    /// recovered entries report deletion
    fn is_deleted(&mut self, fs: &mut BufReader<T>, node: &IndexNode) -> Result<bool, PffError>;

    /// Leaf nodes carry an `IndexValue`
    fn is_leaf(&mut self, fs: &mut BufReader<T>, node: &IndexNode) -> Result<bool, PffError>;

    fn sub_node_count(&mut self, fs: &mut BufReader<T>, node: &IndexNode)
    -> Result<usize, PffError>;

    fn sub_node(
        &mut self,
        fs: &mut BufReader<T>,
        node: &IndexNode,
        index: usize,
    ) -> Result<IndexNode, PffError>;

    /// Record carried by a leaf node
    fn node_value(&mut self, fs: &mut BufReader<T>, node: &IndexNode)
    -> Result<&IndexValue, PffError>;

    /// Point lookup used for parent read-ahead
    fn leaf_node_by_identifier(
        &mut self,
        fs: &mut BufReader<T>,
        identifier: u32,
    ) -> Result<Option<IndexNode>, PffError>;
}
