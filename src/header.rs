use log::error;
use nom::bytes::complete::take;
use nom::error::ErrorKind;
use nom::number::complete::{le_u8, le_u16, le_u32, le_u64};

/// Bytes of header needed to reach every field this crate reads
pub(crate) const HEADER_SIZE: u64 = 512;

/// On-disk signature, "!BDN"
const PFF_SIGNATURE: u32 = 0x4e44_4221;

#[derive(PartialEq, Debug)]
pub struct PffHeader {
    pub content_type: ContentType,
    pub format_type: FormatType,
    pub file_size: u64,
    pub descriptors_index_back_pointer: u64,
    /**Offset of the root page of the descriptors index B-tree */
    pub descriptors_index_root: u64,
    pub offsets_index_back_pointer: u64,
    /**Offset of the root page of the offsets index B-tree */
    pub offsets_index_root: u64,
    pub allocation_type: AllocationType,
    pub encryption_type: EncryptionType,
}

#[derive(PartialEq, Debug)]
pub enum ContentType {
    PersonalAddressBook,
    PersonalStorageTable,
    OfflineStorageTable,
    Unknown,
}

impl ContentType {
    /// The content tag spells out the container family in ASCII
    fn from_tag(tag: u16) -> ContentType {
        if tag == u16::from_le_bytes(*b"SM") {
            return ContentType::PersonalStorageTable;
        }
        if tag == u16::from_le_bytes(*b"SO") {
            return ContentType::OfflineStorageTable;
        }
        if tag == u16::from_le_bytes(*b"AB") {
            return ContentType::PersonalAddressBook;
        }
        ContentType::Unknown
    }
}

/**Format versions written by 32-bit ANSI clients */
const ANSI_VERSIONS: [u16; 2] = [14, 15];
/**Format versions written by 64-bit Unicode clients */
const UNICODE_VERSIONS: [u16; 2] = [21, 23];
/**64-bit Unicode variant using 4096 byte pages */
const UNICODE_4K_VERSION: u16 = 36;

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum FormatType {
    ANSI32,
    Unicode64,
    Unicode64_4k,
    Unknown,
}

impl FormatType {
    fn from_version(version: u16) -> FormatType {
        if ANSI_VERSIONS.contains(&version) {
            return FormatType::ANSI32;
        }
        if UNICODE_VERSIONS.contains(&version) {
            return FormatType::Unicode64;
        }
        if version == UNICODE_4K_VERSION {
            return FormatType::Unicode64_4k;
        }
        FormatType::Unknown
    }

    /// Index page size for the format
    pub(crate) fn page_size(&self) -> u64 {
        if self == &FormatType::Unicode64_4k {
            return 4096;
        }
        512
    }

    /// Bytes at the end of an index page taken up by the trailer. `None` for
    /// the formats this crate does not read
    pub(crate) fn page_trailer_size(&self) -> Option<u64> {
        match self {
            FormatType::Unicode64 => Some(24),
            FormatType::Unicode64_4k => Some(40),
            FormatType::ANSI32 | FormatType::Unknown => None,
        }
    }
}

#[derive(PartialEq, Debug)]
/// `<https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/d9bcc1fd-c66a-41b3-b6d7-ed09d2a25ced>`
pub enum AllocationType {
    /**Possible corruption */
    InvalidMaps,
    ValidMaps,
    Unknown,
}

impl AllocationType {
    fn from_tag(tag: u8) -> AllocationType {
        // Zero marks maps invalidated by an unsafe shutdown
        if tag == 0 {
            AllocationType::InvalidMaps
        } else if tag <= 2 {
            AllocationType::ValidMaps
        } else {
            AllocationType::Unknown
        }
    }
}

#[derive(PartialEq, Debug)]
pub enum EncryptionType {
    None,
    CompressEncryption,
    HighEncryption,
    Unknown,
}

impl EncryptionType {
    fn from_tag(tag: u8) -> EncryptionType {
        if tag == 0 {
            EncryptionType::None
        } else if tag == 1 {
            EncryptionType::CompressEncryption
        } else if tag == 2 {
            EncryptionType::HighEncryption
        } else {
            EncryptionType::Unknown
        }
    }
}

/// Parse a PFF file header. Only the 64-bit formats are supported
pub(crate) fn parse_header(data: &[u8]) -> nom::IResult<&[u8], PffHeader> {
    let (input, sig) = le_u32(data)?;
    if sig != PFF_SIGNATURE {
        error!("[pff] Invalid header signature: {sig:#x}");
        return Err(nom::Err::Failure(nom::error::Error::new(
            data,
            ErrorKind::Fail,
        )));
    }

    let (input, _crc) = le_u32(input)?;
    let (input, content_tag) = le_u16(input)?;
    let (input, format_version) = le_u16(input)?;

    let format_type = FormatType::from_version(format_version);
    if format_type == FormatType::ANSI32 {
        error!("[pff] Got ANSI32 FormatType. This type is currently unsupported");
        return Err(nom::Err::Failure(nom::error::Error::new(
            data,
            ErrorKind::Fail,
        )));
    }
    if format_type == FormatType::Unknown {
        error!("[pff] Unknown format version: {format_version}");
        return Err(nom::Err::Failure(nom::error::Error::new(
            data,
            ErrorKind::Fail,
        )));
    }

    // Client version, platform markers, and index allocation counters
    let (input, _client_info) = take(32_usize)(input)?;
    // Array of 32 node identifiers tracking the next free slot per item type
    let (input, _node_id_counts) = take(128_usize)(input)?;
    // Unknown area plus the four bytes leading the header root
    let (input, _root_preamble) = take(12_usize)(input)?;

    let (input, file_size) = le_u64(input)?;
    // Last allocation table offset and free space totals
    let (input, _allocation_info) = take(24_usize)(input)?;
    let (input, descriptors_index_back_pointer) = le_u64(input)?;
    let (input, descriptors_index_root) = le_u64(input)?;
    let (input, offsets_index_back_pointer) = le_u64(input)?;
    let (input, offsets_index_root) = le_u64(input)?;

    let (input, allocation_tag) = le_u8(input)?;
    // Padding, the ANSI32-only free maps, and the sentinel byte
    let (input, _free_maps) = take(40_usize)(input)?;
    let (input, encryption_tag) = le_u8(input)?;

    let header = PffHeader {
        content_type: ContentType::from_tag(content_tag),
        format_type,
        file_size,
        descriptors_index_back_pointer,
        descriptors_index_root,
        offsets_index_back_pointer,
        offsets_index_root,
        allocation_type: AllocationType::from_tag(allocation_tag),
        encryption_type: EncryptionType::from_tag(encryption_tag),
    };

    Ok((input, header))
}
