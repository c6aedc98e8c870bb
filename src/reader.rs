use crate::error::PffError;
use log::error;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

/// Create a `File` handle that can be used to read a PFF file
pub(crate) fn file_reader(path: &str) -> Result<File, PffError> {
    let read_result = File::open(path);
    match read_result {
        Ok(result) => Ok(result),
        Err(err) => {
            error!("[pff] Failed to open file {path}: {err:?}");
            Err(PffError::GetFailed("open file"))
        }
    }
}

/**
 * Read file bytes based on offset and size
 * `offset` - Offset to start reading
 * `size` - Number of bytes to read
 *
 * returns bytes read as Vec<u8>
 */
pub(crate) fn read_bytes<T: std::io::Seek + std::io::Read>(
    offset: &u64,
    size: u64,
    fs: &mut BufReader<T>,
) -> Result<Vec<u8>, PffError> {
    if let Err(err) = fs.seek(SeekFrom::Start(*offset)) {
        error!("[pff] Could not seek to offset {offset}: {err:?}");
        return Err(PffError::GetFailed("seek to offset"));
    }

    let mut buffer = vec![0u8; size as usize];
    if let Err(err) = fs.read_exact(&mut buffer) {
        error!("[pff] Could not read {size} bytes at offset {offset}: {err:?}");
        return Err(PffError::GetFailed("read bytes"));
    }

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::read_bytes;
    use crate::error::PffError;
    use std::io::{BufReader, Cursor};

    #[test]
    fn test_read_bytes() {
        let data: Vec<u8> = (0..32).collect();
        let mut fs = BufReader::new(Cursor::new(data));

        let results = read_bytes(&4, 8, &mut fs).unwrap();
        assert_eq!(results, vec![4, 5, 6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn test_read_bytes_past_end() {
        let data: Vec<u8> = (0..8).collect();
        let mut fs = BufReader::new(Cursor::new(data));

        let results = read_bytes(&4, 8, &mut fs);
        assert_eq!(results, Err(PffError::GetFailed("read bytes")));
    }
}
