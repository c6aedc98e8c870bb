use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// In-memory projection of one descriptors index record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    pub descriptor_identifier: u32,
    /**Opaque handle into the offsets index for the item data */
    pub data_identifier: u64,
    /**Opaque handle into the offsets index for the local descriptors tree */
    pub local_descriptors_identifier: u64,
    /**Set when the descriptor was sourced from a recovery scan instead of the live index */
    pub recovered: bool,
}

impl ItemDescriptor {
    pub fn new(
        descriptor_identifier: u32,
        data_identifier: u64,
        local_descriptors_identifier: u64,
        recovered: bool,
    ) -> ItemDescriptor {
        ItemDescriptor {
            descriptor_identifier,
            data_identifier,
            local_descriptors_identifier,
            recovered,
        }
    }

    /// Total order used for sibling lists: order of the descriptor identifier
    pub fn compare(&self, other: &ItemDescriptor) -> Ordering {
        self.descriptor_identifier.cmp(&other.descriptor_identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::ItemDescriptor;
    use std::cmp::Ordering;

    #[test]
    fn test_new() {
        let descriptor = ItemDescriptor::new(42, 8, 9, false);
        assert_eq!(descriptor.descriptor_identifier, 42);
        assert_eq!(descriptor.data_identifier, 8);
        assert_eq!(descriptor.local_descriptors_identifier, 9);
        assert!(!descriptor.recovered);
    }

    #[test]
    fn test_compare() {
        let first = ItemDescriptor::new(1, 0, 0, false);
        let second = ItemDescriptor::new(2, 0, 0, false);

        assert_eq!(first.compare(&second), Ordering::Less);
        assert_eq!(second.compare(&first), Ordering::Greater);

        // Carried payloads do not participate in the order
        let twin = ItemDescriptor::new(1, 99, 99, true);
        assert_eq!(first.compare(&twin), Ordering::Equal);
    }
}
