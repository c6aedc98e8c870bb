/*!
Parse the item hierarchy of Personal Folder File (PFF) containers. PFF is the
on-disk family behind Outlook data files: OST, PST, and PAB.

The descriptors index persisted in the file is a flat B-tree of
`(identifier, parent identifier)` records with no ordering guarantee. This
crate walks that index and rebuilds the logical folder/message tree,
faulting parents in out of discovery order, tolerating corrupt or deleted
index subtrees, and collecting descriptors with unreachable parents into an
orphan list.

`PffReader` covers the common path: open a file, then call `item_tree`.
Custom index sources (for example recovery scans or test fixtures) implement
the `DescriptorsIndex` trait and feed `ItemTree::build` directly.
*/

mod btree;
mod descriptors;
mod error;
mod header;
mod helper;
mod items;
mod reader;

pub use crate::btree::DescriptorBtree;
pub use crate::descriptors::{DescriptorsIndex, IndexNode, IndexValue};
pub use crate::error::PffError;
pub use crate::header::{AllocationType, ContentType, EncryptionType, FormatType, PffHeader};
pub use crate::helper::PffReader;
pub use crate::items::descriptor::ItemDescriptor;
pub use crate::items::node::{InsertStatus, ItemTreeNode};
pub use crate::items::orphans::OrphanList;
pub use crate::items::tree::ItemTree;
