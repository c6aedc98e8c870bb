use crate::btree::DescriptorBtree;
use crate::error::PffError;
use crate::header::{HEADER_SIZE, PffHeader, parse_header};
use crate::items::orphans::OrphanList;
use crate::items::tree::ItemTree;
use crate::reader::{file_reader, read_bytes};
use log::error;
use std::fs::File;
use std::io::BufReader;

/// Reads a PFF file (PST/OST/PAB) and rebuilds its item hierarchy
pub struct PffReader<T: std::io::Seek + std::io::Read> {
    fs: BufReader<T>,
    header: PffHeader,
    index: DescriptorBtree,
}

impl PffReader<File> {
    /// Open the PFF file at the provided path
    pub fn open(path: &str) -> Result<PffReader<File>, PffError> {
        let reader = file_reader(path)?;
        PffReader::new(reader)
    }
}

impl<T: std::io::Seek + std::io::Read> PffReader<T> {
    /// Parse the file header and set up the descriptors index
    pub fn new(reader: T) -> Result<PffReader<T>, PffError> {
        let mut fs = BufReader::new(reader);
        let header_bytes = read_bytes(&0, HEADER_SIZE, &mut fs)?;

        let header_result = parse_header(&header_bytes);
        let (_, header) = match header_result {
            Ok(result) => result,
            Err(err) => {
                error!("[pff] Could not parse header: {err:?}");
                return Err(PffError::InitializationFailed("parse header"));
            }
        };

        let index = DescriptorBtree::new(header.descriptors_index_root, header.format_type);

        Ok(PffReader { fs, header, index })
    }

    pub fn header(&self) -> &PffHeader {
        &self.header
    }

    /// Materialize the item tree from the descriptors index. Descriptors with
    /// no reachable parent end up in the returned orphan list
    pub fn item_tree(&mut self) -> Result<(ItemTree, OrphanList), PffError> {
        let mut tree = ItemTree::new();
        let mut orphans = OrphanList::new();
        tree.build(&mut self.fs, &mut self.index, &mut orphans)?;

        Ok((tree, orphans))
    }
}

#[cfg(test)]
mod tests {
    use super::PffReader;
    use crate::header::{ContentType, FormatType};
    use std::io::Cursor;

    /// Minimal Unicode64 header: signature, PST content, descriptors index root
    fn header_bytes(descriptors_root: u64) -> Vec<u8> {
        let mut header = vec![0u8; 512];
        header[0..4].copy_from_slice(&0x4e44_4221_u32.to_le_bytes());
        header[8..10].copy_from_slice(b"SM");
        header[10..12].copy_from_slice(&21_u16.to_le_bytes());
        header[216..224].copy_from_slice(&1_u64.to_le_bytes());
        header[224..232].copy_from_slice(&descriptors_root.to_le_bytes());
        // Valid allocation maps
        header[248] = 1;
        header
    }

    fn leaf_entry(identifier: u64, parent: u32, data_identifier: u64) -> Vec<u8> {
        let mut entry = Vec::new();
        entry.extend_from_slice(&identifier.to_le_bytes());
        entry.extend_from_slice(&data_identifier.to_le_bytes());
        entry.extend_from_slice(&0_u64.to_le_bytes());
        entry.extend_from_slice(&parent.to_le_bytes());
        entry.extend_from_slice(&[0; 4]);
        entry
    }

    fn leaf_page(entries: &[Vec<u8>]) -> Vec<u8> {
        let mut page = Vec::new();
        for entry in entries {
            page.extend_from_slice(entry);
        }
        page.resize(488, 0);
        let count = entries.len() as u16;
        page.extend_from_slice(&count.to_le_bytes());
        page.extend_from_slice(&15_u16.to_le_bytes());
        page.push(32);
        page.push(0);
        page.extend_from_slice(&[0; 10]);
        page.push(0x81);
        page.resize(512, 0);
        page
    }

    fn test_file() -> Vec<u8> {
        let mut data = header_bytes(1024);
        data.resize(1024, 0);
        data.extend_from_slice(&leaf_page(&[
            leaf_entry(1, 1, 10),
            leaf_entry(2, 1, 11),
            leaf_entry(3, 2, 12),
        ]));
        data
    }

    #[test]
    fn test_pff_reader() {
        let mut reader = PffReader::new(Cursor::new(test_file())).unwrap();
        assert_eq!(reader.header().content_type, ContentType::PersonalStorageTable);
        assert_eq!(reader.header().format_type, FormatType::Unicode64);
        assert_eq!(reader.header().descriptors_index_root, 1024);

        let (tree, orphans) = reader.item_tree().unwrap();
        assert!(orphans.is_empty());
        assert_eq!(tree.root_folder_identifier(), Some(1));

        let folder = tree.root_folder().unwrap();
        assert_eq!(folder.child_count(), 1);
        let message = tree.node_by_identifier(3).unwrap().unwrap();
        assert_eq!(message.descriptor().data_identifier, 12);
    }

    #[test]
    fn test_pff_reader_bad_header() {
        let data = vec![0u8; 600];
        assert!(PffReader::new(Cursor::new(data)).is_err());
    }
}
