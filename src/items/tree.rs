use super::descriptor::ItemDescriptor;
use super::node::{InsertStatus, ItemTreeNode};
use super::orphans::OrphanList;
use crate::descriptors::{DescriptorsIndex, IndexNode};
use crate::error::PffError;
use log::{debug, error, warn};
use std::io::BufReader;

/// Recursion bound shared by index traversal, parent read-ahead, and in-memory lookup
pub(crate) const MAX_RECURSION_DEPTH: usize = 1000;

/// Eagerly materialized hierarchy of the descriptors stored in a PFF file.
/// A synthetic zero descriptor owns the tree; the self-parented root folder
/// descriptor becomes its only expected child.
///
/// Building is single threaded. Concurrent readers of a finished tree need
/// external synchronization
#[derive(Debug, PartialEq, Default)]
pub struct ItemTree {
    root: Option<ItemTreeNode>,
    root_folder_identifier: Option<u32>,
}

impl ItemTree {
    pub fn new() -> ItemTree {
        ItemTree {
            root: None,
            root_folder_identifier: None,
        }
    }

    /// Synthetic root node. `None` until a build succeeds
    pub fn root(&self) -> Option<&ItemTreeNode> {
        self.root.as_ref()
    }

    /// Identifier of the self-parented root folder descriptor, if one was found
    pub fn root_folder_identifier(&self) -> Option<u32> {
        self.root_folder_identifier
    }

    /// Direct child of the synthetic root holding the root folder descriptor
    pub fn root_folder(&self) -> Option<&ItemTreeNode> {
        let identifier = self.root_folder_identifier?;
        self.root.as_ref()?.find_direct_child(identifier)
    }

    /**
     * Materialize the item tree by walking the descriptors index depth first.
     *
     * Descriptors whose parent cannot be materialized, even after read-ahead,
     * are appended to `orphans`. Returns the identifier of the root folder
     * descriptor when one exists.
     *
     * On failure the partial tree is torn down. Orphans recorded before the
     * failure stay in the list; the owner clears it for clean state
     */
    pub fn build<T, D>(
        &mut self,
        fs: &mut BufReader<T>,
        index: &mut D,
        orphans: &mut OrphanList,
    ) -> Result<Option<u32>, PffError>
    where
        T: std::io::Seek + std::io::Read,
        D: DescriptorsIndex<T>,
    {
        if self.root.is_some() {
            return Err(PffError::AlreadySet("item tree root node"));
        }
        self.root = Some(ItemTreeNode::new(ItemDescriptor::new(0, 0, 0, false)));
        self.root_folder_identifier = None;

        let index_root = index.root_node();
        if let Err(err) = self.build_node(fs, index, orphans, &index_root, 0) {
            self.root = None;
            self.root_folder_identifier = None;
            return Err(err);
        }

        Ok(self.root_folder_identifier)
    }

    /// Find the tree node carrying `identifier`. Only nodes reachable from the
    /// synthetic root are found, never orphans
    pub fn node_by_identifier(&self, identifier: u32) -> Result<Option<&ItemTreeNode>, PffError> {
        match &self.root {
            Some(root) => root.find(identifier),
            None => Err(PffError::InvalidArgument("item tree root node")),
        }
    }

    /// Depth first walk over one descriptors index node
    fn build_node<T, D>(
        &mut self,
        fs: &mut BufReader<T>,
        index: &mut D,
        orphans: &mut OrphanList,
        node: &IndexNode,
        depth: usize,
    ) -> Result<(), PffError>
    where
        T: std::io::Seek + std::io::Read,
        D: DescriptorsIndex<T>,
    {
        if depth > MAX_RECURSION_DEPTH {
            return Err(PffError::OutOfBounds("descriptors index recursion depth"));
        }

        // Check if the index node can be read. A corrupt interior subtree is
        // skipped so the rest of the mailbox survives
        let count = match index.sub_node_count(fs, node) {
            Ok(result) => result,
            Err(err) => {
                warn!("[pff] Could not get sub node count from descriptors index: {err:?}. Skipping subtree");
                return Ok(());
            }
        };

        if index.is_deleted(fs, node)? {
            return Ok(());
        }

        if index.is_leaf(fs, node)? {
            return self.build_leaf_node(fs, index, orphans, node, depth);
        }

        for sub_node_index in 0..count {
            let sub_node = index.sub_node(fs, node, sub_node_index)?;
            self.build_node(fs, index, orphans, &sub_node, depth + 1)?;
        }

        Ok(())
    }

    /// Wire one descriptor record into the tree
    fn build_leaf_node<T, D>(
        &mut self,
        fs: &mut BufReader<T>,
        index: &mut D,
        orphans: &mut OrphanList,
        node: &IndexNode,
        depth: usize,
    ) -> Result<(), PffError>
    where
        T: std::io::Seek + std::io::Read,
        D: DescriptorsIndex<T>,
    {
        let value = index.node_value(fs, node)?;
        if value.identifier > u64::from(u32::MAX) {
            error!(
                "[pff] Descriptor identifier {} exceeds maximum",
                value.identifier
            );
            return Err(PffError::OutOfBounds("descriptor identifier exceeds maximum"));
        }

        // The value can be cached out by the next index call. Keep what is needed
        let identifier = value.identifier as u32;
        let parent_identifier = value.parent_identifier;
        let descriptor = ItemDescriptor::new(
            identifier,
            value.data_identifier,
            value.local_descriptors_identifier,
            false,
        );

        // The root folder index descriptor points to itself as its parent
        if identifier == parent_identifier {
            if let Some(existing) = self.root_folder_identifier {
                if existing != identifier {
                    error!(
                        "[pff] Root folder already set. Got second root folder descriptor {identifier}"
                    );
                    return Err(PffError::AlreadySet("root folder item tree node"));
                }
                // Same root folder rediscovered after read-ahead. Falls through
                // to a duplicate insert and is dropped
            }
            let root = match self.root.as_mut() {
                Some(result) => result,
                None => return Err(PffError::Missing("item tree root node")),
            };
            if root.insert_subtree(ItemTreeNode::new(descriptor)) == InsertStatus::Inserted {
                self.root_folder_identifier = Some(identifier);
            }
            return Ok(());
        }

        let root = match self.root.as_ref() {
            Some(result) => result,
            None => return Err(PffError::Missing("item tree root node")),
        };
        let mut parent_found = root.find_at(parent_identifier, 0)?.is_some();
        if !parent_found {
            debug!("[pff] Reading ahead for descriptor {identifier} parent {parent_identifier}");
            if let Some(parent_index_node) = index.leaf_node_by_identifier(fs, parent_identifier)? {
                self.build_node(fs, index, orphans, &parent_index_node, depth + 1)?;

                let root = match self.root.as_ref() {
                    Some(result) => result,
                    None => return Err(PffError::Missing("item tree root node")),
                };
                parent_found = root.find_at(parent_identifier, 0)?.is_some();
            }
        }

        if !parent_found {
            debug!("[pff] Parent node {parent_identifier} missing - found orphan node {identifier}");
            orphans.append(ItemTreeNode::new(descriptor));
            return Ok(());
        }

        let root = match self.root.as_mut() {
            Some(result) => result,
            None => return Err(PffError::Missing("item tree root node")),
        };
        match root.find_at_mut(parent_identifier, 0)? {
            Some(parent) => {
                // A descriptor discovered twice stays under the parent found first
                let _status = parent.insert_child(descriptor);
                Ok(())
            }
            None => Err(PffError::Missing("parent item tree node")),
        }
    }
}
