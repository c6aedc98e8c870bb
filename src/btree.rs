use crate::descriptors::{DescriptorsIndex, IndexNode, IndexValue};
use crate::error::PffError;
use crate::header::FormatType;
use crate::items::tree::MAX_RECURSION_DEPTH;
use crate::reader::read_bytes;
use log::error;
use nom::bytes::complete::take;
use nom::error::ErrorKind;
use nom::number::complete::{le_u8, le_u16, le_u32, le_u64};
use std::collections::HashMap;
use std::io::BufReader;

/**Trailer tag marking pages of the descriptors index. The offsets index uses 0x80 */
const DESCRIPTORS_INDEX_PAGE: u8 = 0x81;
/**On-disk size of one leaf page record */
const LEAF_ENTRY_SIZE: usize = 32;
/**On-disk size of one branch page entry */
const BRANCH_ENTRY_SIZE: usize = 24;

#[derive(PartialEq, Debug)]
pub(crate) enum NodeLevel {
    LeafNode,
    BranchNode,
}

/// Parsed descriptors index page. Cached between traversal calls
#[derive(Debug)]
pub(crate) struct IndexPage {
    pub(crate) level: NodeLevel,
    /**Only on `NodeLevel::BranchNode` pages */
    pub(crate) branches: Vec<BranchEntry>,
    /**Only on `NodeLevel::LeafNode` pages */
    pub(crate) values: Vec<IndexValue>,
}

#[derive(PartialEq, Debug)]
pub(crate) struct BranchEntry {
    /**Lowest descriptor identifier reachable under `offset` */
    pub(crate) identifier: u64,
    pub(crate) back_pointer: u64,
    pub(crate) offset: u64,
}

/// Parse one descriptors index B-tree page. The entry area comes first, the
/// trailer sits at the end of the page
pub(crate) fn parse_index_page<'a>(
    data: &'a [u8],
    format: &FormatType,
) -> nom::IResult<&'a [u8], IndexPage> {
    let trailer_size = match format.page_trailer_size() {
        Some(result) => result,
        None => {
            // ANSI32 never gets past the header parser
            return Err(nom::Err::Failure(nom::error::Error::new(
                data,
                ErrorKind::Fail,
            )));
        }
    };
    let entry_area = format.page_size() - trailer_size;

    let (input, table_data) = take(entry_area)(data)?;
    let (input, number_entries) = le_u16(input)?;
    let (input, _max_number_entries) = le_u16(input)?;
    let (input, _entry_size) = le_u8(input)?;
    let (input, node_level) = le_u8(input)?;
    let (input, _padding) = take(10_usize)(input)?;
    let (input, page_tag) = le_u8(input)?;

    // Don't care about the rest of the trailer

    if page_tag != DESCRIPTORS_INDEX_PAGE {
        error!("[pff] Page is not part of the descriptors index. Tag: {page_tag:#x}");
        return Err(nom::Err::Failure(nom::error::Error::new(
            data,
            ErrorKind::Fail,
        )));
    }

    let page = if node_level == 0 {
        let (_, values) = parse_leaf_entries(table_data, &number_entries)?;
        IndexPage {
            level: NodeLevel::LeafNode,
            branches: Vec::new(),
            values,
        }
    } else {
        let (_, branches) = parse_branch_entries(table_data, &number_entries)?;
        IndexPage {
            level: NodeLevel::BranchNode,
            branches,
            values: Vec::new(),
        }
    };

    Ok((input, page))
}

/// Parse branch page entries pointing to lower pages
pub(crate) fn parse_branch_entries<'a>(
    data: &'a [u8],
    entries: &u16,
) -> nom::IResult<&'a [u8], Vec<BranchEntry>> {
    let mut branch_data = data;
    let mut branch_entries = Vec::new();

    while branch_data.len() >= BRANCH_ENTRY_SIZE && branch_entries.len() != *entries as usize {
        let (input, identifier) = le_u64(branch_data)?;
        let (input, back_pointer) = le_u64(input)?;
        let (input, offset) = le_u64(input)?;
        branch_data = input;

        if identifier == 0 && offset == 0 {
            // We are done
            break;
        }

        let branch = BranchEntry {
            identifier,
            back_pointer,
            offset,
        };
        branch_entries.push(branch);
    }

    Ok((branch_data, branch_entries))
}

/// Parse leaf page entries. One entry per descriptor record
pub(crate) fn parse_leaf_entries<'a>(
    data: &'a [u8],
    entries: &u16,
) -> nom::IResult<&'a [u8], Vec<IndexValue>> {
    let mut leaf_data = data;
    let mut values = Vec::new();

    while leaf_data.len() >= LEAF_ENTRY_SIZE && values.len() != *entries as usize {
        let (input, identifier) = le_u64(leaf_data)?;
        let (input, data_identifier) = le_u64(input)?;
        let (input, local_descriptors_identifier) = le_u64(input)?;
        let (input, parent_identifier) = le_u32(input)?;
        let (input, _padding) = le_u32(input)?;
        leaf_data = input;

        let value = IndexValue {
            identifier,
            parent_identifier,
            data_identifier,
            local_descriptors_identifier,
        };
        values.push(value);
    }

    Ok((leaf_data, values))
}

/// Pages kept while a build walks the index. The oldest page is evicted first
#[derive(Debug)]
pub(crate) struct IndexPageCache {
    pages: HashMap<u64, IndexPage>,
    order: Vec<u64>,
    limit: usize,
}

impl IndexPageCache {
    pub(crate) fn new(limit: usize) -> IndexPageCache {
        IndexPageCache {
            pages: HashMap::new(),
            order: Vec::new(),
            limit,
        }
    }

    pub(crate) fn contains(&self, offset: &u64) -> bool {
        self.pages.contains_key(offset)
    }

    pub(crate) fn get(&self, offset: &u64) -> Option<&IndexPage> {
        self.pages.get(offset)
    }

    pub(crate) fn insert(&mut self, offset: u64, page: IndexPage) {
        if self.pages.contains_key(&offset) {
            return;
        }
        if self.pages.len() >= self.limit && !self.order.is_empty() {
            let evicted = self.order.remove(0);
            self.pages.remove(&evicted);
        }
        self.pages.insert(offset, page);
        self.order.push(offset);
    }
}

const DEFAULT_CACHE_PAGES: usize = 16;

/// Lazy descriptors index backed by the on-disk B-tree pages
pub struct DescriptorBtree {
    root_offset: u64,
    format: FormatType,
    cache: IndexPageCache,
}

impl DescriptorBtree {
    /// Descriptors index rooted at the page offset recorded in the file header
    pub fn new(root_offset: u64, format: FormatType) -> DescriptorBtree {
        DescriptorBtree {
            root_offset,
            format,
            cache: IndexPageCache::new(DEFAULT_CACHE_PAGES),
        }
    }

    /// Read and parse the page at `offset`, or return the cached copy
    fn load_page<T: std::io::Seek + std::io::Read>(
        &mut self,
        fs: &mut BufReader<T>,
        offset: u64,
    ) -> Result<&IndexPage, PffError> {
        if !self.cache.contains(&offset) {
            let page_data = read_bytes(&offset, self.format.page_size(), fs)?;
            let page_result = parse_index_page(&page_data, &self.format);
            let (_, page) = match page_result {
                Ok(result) => result,
                Err(err) => {
                    error!(
                        "[pff] Failed to parse descriptors index page at offset {offset}: {err:?}"
                    );
                    return Err(PffError::GetFailed("parse descriptors index page"));
                }
            };
            self.cache.insert(offset, page);
        }

        match self.cache.get(&offset) {
            Some(page) => Ok(page),
            None => Err(PffError::Missing("descriptors index page")),
        }
    }
}

impl<T: std::io::Seek + std::io::Read> DescriptorsIndex<T> for DescriptorBtree {
    fn root_node(&self) -> IndexNode {
        IndexNode {
            offset: self.root_offset,
            entry: None,
        }
    }

    /// The live on-disk tree only stores existing descriptors. Deleted entries
    /// would come from a recovery scan, which is a different index source
    fn is_deleted(&mut self, _fs: &mut BufReader<T>, _node: &IndexNode) -> Result<bool, PffError> {
        Ok(false)
    }

    fn is_leaf(&mut self, _fs: &mut BufReader<T>, node: &IndexNode) -> Result<bool, PffError> {
        Ok(node.entry.is_some())
    }

    fn sub_node_count(
        &mut self,
        fs: &mut BufReader<T>,
        node: &IndexNode,
    ) -> Result<usize, PffError> {
        if node.entry.is_some() {
            return Ok(0);
        }
        let page = self.load_page(fs, node.offset)?;
        let count = match page.level {
            NodeLevel::BranchNode => page.branches.len(),
            NodeLevel::LeafNode => page.values.len(),
        };
        Ok(count)
    }

    fn sub_node(
        &mut self,
        fs: &mut BufReader<T>,
        node: &IndexNode,
        index: usize,
    ) -> Result<IndexNode, PffError> {
        if node.entry.is_some() {
            return Err(PffError::InvalidArgument("leaf entries have no sub nodes"));
        }
        let offset = node.offset;
        let page = self.load_page(fs, offset)?;
        match page.level {
            NodeLevel::BranchNode => match page.branches.get(index) {
                Some(branch) => Ok(IndexNode {
                    offset: branch.offset,
                    entry: None,
                }),
                None => Err(PffError::OutOfBounds("branch entry index")),
            },
            NodeLevel::LeafNode => {
                if index >= page.values.len() {
                    return Err(PffError::OutOfBounds("leaf entry index"));
                }
                Ok(IndexNode {
                    offset,
                    entry: Some(index as u16),
                })
            }
        }
    }

    fn node_value(
        &mut self,
        fs: &mut BufReader<T>,
        node: &IndexNode,
    ) -> Result<&IndexValue, PffError> {
        let entry = match node.entry {
            Some(result) => result,
            None => return Err(PffError::Missing("index node carries no value")),
        };
        let page = self.load_page(fs, node.offset)?;
        match page.values.get(entry as usize) {
            Some(value) => Ok(value),
            None => Err(PffError::OutOfBounds("leaf entry index")),
        }
    }

    /// Descend the B-tree comparing identifiers, without touching sibling pages
    fn leaf_node_by_identifier(
        &mut self,
        fs: &mut BufReader<T>,
        identifier: u32,
    ) -> Result<Option<IndexNode>, PffError> {
        let mut offset = self.root_offset;
        let mut depth = 0;

        loop {
            if depth > MAX_RECURSION_DEPTH {
                return Err(PffError::OutOfBounds("descriptors index lookup depth"));
            }
            let page = self.load_page(fs, offset)?;
            match page.level {
                NodeLevel::BranchNode => {
                    let mut next_offset = None;
                    for branch in &page.branches {
                        if branch.identifier <= u64::from(identifier) {
                            next_offset = Some(branch.offset);
                            continue;
                        }
                        break;
                    }
                    match next_offset {
                        Some(result) => offset = result,
                        None => return Ok(None),
                    }
                }
                NodeLevel::LeafNode => {
                    for (entry_index, value) in page.values.iter().enumerate() {
                        if value.identifier == u64::from(identifier) {
                            return Ok(Some(IndexNode {
                                offset,
                                entry: Some(entry_index as u16),
                            }));
                        }
                    }
                    return Ok(None);
                }
            }
            depth += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DescriptorBtree, IndexPageCache, NodeLevel, parse_branch_entries, parse_index_page,
        parse_leaf_entries,
    };
    use crate::descriptors::{DescriptorsIndex, IndexNode};
    use crate::header::FormatType;
    use std::io::{BufReader, Cursor};

    fn leaf_entry(identifier: u64, parent: u32, data_identifier: u64, local: u64) -> Vec<u8> {
        let mut entry = Vec::new();
        entry.extend_from_slice(&identifier.to_le_bytes());
        entry.extend_from_slice(&data_identifier.to_le_bytes());
        entry.extend_from_slice(&local.to_le_bytes());
        entry.extend_from_slice(&parent.to_le_bytes());
        entry.extend_from_slice(&[0; 4]);
        entry
    }

    fn branch_entry(identifier: u64, back_pointer: u64, offset: u64) -> Vec<u8> {
        let mut entry = Vec::new();
        entry.extend_from_slice(&identifier.to_le_bytes());
        entry.extend_from_slice(&back_pointer.to_le_bytes());
        entry.extend_from_slice(&offset.to_le_bytes());
        entry
    }

    /// Assemble a 512 byte Unicode64 page around the provided entry bytes
    fn page_bytes(entries: &[Vec<u8>], level: u8, entry_size: u8) -> Vec<u8> {
        let mut page = Vec::new();
        for entry in entries {
            page.extend_from_slice(entry);
        }
        page.resize(488, 0);
        let count = entries.len() as u16;
        page.extend_from_slice(&count.to_le_bytes());
        let max_entries = (488 / entry_size as u16).to_le_bytes();
        page.extend_from_slice(&max_entries);
        page.push(entry_size);
        page.push(level);
        page.extend_from_slice(&[0; 10]);
        page.push(0x81);
        page.resize(512, 0);
        page
    }

    /// Two leaf pages under one branch root at offset 0
    fn tree_bytes() -> Vec<u8> {
        let root = page_bytes(
            &[branch_entry(1, 100, 512), branch_entry(5, 101, 1024)],
            1,
            24,
        );
        let first = page_bytes(&[leaf_entry(1, 1, 20, 0), leaf_entry(2, 1, 21, 0)], 0, 32);
        let second = page_bytes(&[leaf_entry(5, 2, 22, 3), leaf_entry(6, 5, 23, 0)], 0, 32);

        let mut data = Vec::new();
        data.extend_from_slice(&root);
        data.extend_from_slice(&first);
        data.extend_from_slice(&second);
        data
    }

    #[test]
    fn test_parse_index_page_leaf() {
        let data = page_bytes(&[leaf_entry(1, 1, 20, 0), leaf_entry(2, 1, 21, 7)], 0, 32);
        let (_, page) = parse_index_page(&data, &FormatType::Unicode64).unwrap();

        assert_eq!(page.level, NodeLevel::LeafNode);
        assert_eq!(page.values.len(), 2);
        assert_eq!(page.values[0].identifier, 1);
        assert_eq!(page.values[0].parent_identifier, 1);
        assert_eq!(page.values[0].data_identifier, 20);
        assert_eq!(page.values[1].identifier, 2);
        assert_eq!(page.values[1].local_descriptors_identifier, 7);
    }

    #[test]
    fn test_parse_index_page_branch() {
        let data = page_bytes(
            &[branch_entry(1, 100, 512), branch_entry(5, 101, 1024)],
            1,
            24,
        );
        let (_, page) = parse_index_page(&data, &FormatType::Unicode64).unwrap();

        assert_eq!(page.level, NodeLevel::BranchNode);
        assert_eq!(page.branches.len(), 2);
        assert_eq!(page.branches[0].identifier, 1);
        assert_eq!(page.branches[0].back_pointer, 100);
        assert_eq!(page.branches[0].offset, 512);
        assert_eq!(page.branches[1].offset, 1024);
    }

    #[test]
    fn test_parse_index_page_rejects_foreign_page() {
        let mut data = page_bytes(&[leaf_entry(1, 1, 0, 0)], 0, 32);
        // Overwrite the trailer tag with the offsets index tag
        data[504] = 0x80;
        assert!(parse_index_page(&data, &FormatType::Unicode64).is_err());
    }

    #[test]
    fn test_parse_branch_entries_stops_at_zero() {
        let mut data = branch_entry(1, 100, 512);
        data.extend_from_slice(&branch_entry(0, 0, 0));
        data.extend_from_slice(&branch_entry(5, 101, 1024));

        let (_, entries) = parse_branch_entries(&data, &3).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_parse_leaf_entries_respects_count() {
        let mut data = leaf_entry(1, 1, 20, 0);
        data.extend_from_slice(&leaf_entry(2, 1, 21, 0));

        let (_, entries) = parse_leaf_entries(&data, &1).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_descriptor_btree_traversal() {
        let mut fs = BufReader::new(Cursor::new(tree_bytes()));
        let mut index = DescriptorBtree::new(0, FormatType::Unicode64);

        let root = DescriptorsIndex::<Cursor<Vec<u8>>>::root_node(&index);
        assert!(!index.is_leaf(&mut fs, &root).unwrap());
        assert_eq!(index.sub_node_count(&mut fs, &root).unwrap(), 2);

        let first_page = index.sub_node(&mut fs, &root, 0).unwrap();
        assert_eq!(index.sub_node_count(&mut fs, &first_page).unwrap(), 2);

        let record = index.sub_node(&mut fs, &first_page, 1).unwrap();
        assert!(index.is_leaf(&mut fs, &record).unwrap());
        assert!(!index.is_deleted(&mut fs, &record).unwrap());

        let value = index.node_value(&mut fs, &record).unwrap();
        assert_eq!(value.identifier, 2);
        assert_eq!(value.parent_identifier, 1);
        assert_eq!(value.data_identifier, 21);
    }

    #[test]
    fn test_leaf_node_by_identifier() {
        let mut fs = BufReader::new(Cursor::new(tree_bytes()));
        let mut index = DescriptorBtree::new(0, FormatType::Unicode64);

        let found = index.leaf_node_by_identifier(&mut fs, 6).unwrap();
        assert_eq!(
            found,
            Some(IndexNode {
                offset: 1024,
                entry: Some(1)
            })
        );

        let value = index.node_value(&mut fs, &found.unwrap()).unwrap();
        assert_eq!(value.identifier, 6);
        assert_eq!(value.parent_identifier, 5);

        assert_eq!(index.leaf_node_by_identifier(&mut fs, 99).unwrap(), None);
        assert_eq!(index.leaf_node_by_identifier(&mut fs, 0).unwrap(), None);
    }

    #[test]
    fn test_index_page_cache_eviction() {
        let mut cache = IndexPageCache::new(2);
        for offset in [0, 512, 1024] {
            let data = page_bytes(&[leaf_entry(1, 1, 0, 0)], 0, 32);
            let (_, page) = parse_index_page(&data, &FormatType::Unicode64).unwrap();
            cache.insert(offset, page);
        }

        assert!(!cache.contains(&0));
        assert!(cache.contains(&512));
        assert!(cache.contains(&1024));
    }
}
