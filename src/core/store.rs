//! Flat header log: back-to-back 80-byte records, block N at `[80N, 80N+80)`

use std::path::Path;
use tracing::debug;

use super::header::BlockHeader;
use super::HEADER_SIZE;
use crate::error::{Error, Result};

/// In-memory view over a header log.
///
/// The last record is a reserved slot and is never served, so a log of
/// `k` records exposes `k - 1` blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderStore {
    data: Vec<u8>,
}

impl HeaderStore {
    /// Wrap an existing buffer; its length must be a multiple of 80
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() % HEADER_SIZE != 0 {
            return Err(Error::malformed_input(format!(
                "Header log length {} is not a multiple of {}",
                data.len(),
                HEADER_SIZE
            )));
        }
        Ok(Self { data })
    }

    /// Load a header log from disk
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let store = Self::from_bytes(data)?;
        debug!(
            path = %path.display(),
            records = store.record_count(),
            "Loaded header log"
        );
        Ok(store)
    }

    /// Write the log back to disk
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.data)?;
        Ok(())
    }

    /// Number of 80-byte records, reserved slot included
    pub fn record_count(&self) -> u64 {
        (self.data.len() / HEADER_SIZE) as u64
    }

    /// Number of usable blocks
    pub fn nblocks(&self) -> u64 {
        self.record_count().saturating_sub(1)
    }

    /// Whether the log has no usable blocks
    pub fn is_empty(&self) -> bool {
        self.nblocks() == 0
    }

    /// The whole log
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Raw 80 bytes of a usable block
    pub fn raw(&self, index: u64) -> Option<&[u8]> {
        if index >= self.nblocks() {
            return None;
        }
        let start = usize::try_from(index).ok()? * HEADER_SIZE;
        self.data.get(start..start + HEADER_SIZE)
    }

    /// Decoded header of a usable block
    pub fn get(&self, index: u64) -> Option<BlockHeader> {
        let raw = self.raw(index)?;
        BlockHeader::from_bytes(index, raw).ok()
    }

    /// Decoded header, with out-of-range indices reported as errors
    pub fn read_header(&self, index: i64) -> Result<BlockHeader> {
        u64::try_from(index)
            .ok()
            .and_then(|i| self.get(i))
            .ok_or_else(|| Error::out_of_range(index, self.nblocks()))
    }

    /// Append one encoded header
    pub fn append(&mut self, header: &BlockHeader) {
        self.data.extend_from_slice(&header.to_bytes());
    }

    /// Append one raw record
    pub fn append_raw(&mut self, record: &[u8]) -> Result<()> {
        if record.len() != HEADER_SIZE {
            return Err(Error::malformed_input(format!(
                "Header record must be {} bytes, got {}",
                HEADER_SIZE,
                record.len()
            )));
        }
        self.data.extend_from_slice(record);
        Ok(())
    }

    /// Iterate over every usable block
    pub fn iter(&self) -> impl Iterator<Item = BlockHeader> + '_ {
        (0..self.nblocks()).filter_map(move |i| self.get(i))
    }
}

/// Read block `index` from any header log buffer
pub fn read_header(index: i64, source: &[u8]) -> Result<BlockHeader> {
    if source.len() % HEADER_SIZE != 0 {
        return Err(Error::malformed_input(format!(
            "Header log length {} is not a multiple of {}",
            source.len(),
            HEADER_SIZE
        )));
    }
    let record_count = (source.len() / HEADER_SIZE) as u64;
    let nblocks = record_count.saturating_sub(1);

    let start = u64::try_from(index)
        .ok()
        .filter(|&i| i < nblocks)
        .and_then(|i| usize::try_from(i).ok())
        .map(|i| i * HEADER_SIZE)
        .ok_or_else(|| Error::out_of_range(index, nblocks))?;

    BlockHeader::from_bytes(index as u64, &source[start..start + HEADER_SIZE])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::NamedTempFile;

    fn synthetic_log(records: u8) -> Vec<u8> {
        (0..records)
            .flat_map(|i| std::iter::repeat(i).take(HEADER_SIZE))
            .collect()
    }

    #[test]
    fn test_nblocks_excludes_reserved_slot() {
        let store = HeaderStore::from_bytes(synthetic_log(4)).unwrap();
        assert_eq!(store.record_count(), 4);
        assert_eq!(store.nblocks(), 3);

        let empty = HeaderStore::from_bytes(Vec::new()).unwrap();
        assert_eq!(empty.nblocks(), 0);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_misaligned_log_rejected() {
        let err = HeaderStore::from_bytes(vec![0u8; 161]).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));

        assert!(matches!(
            read_header(0, &[0u8; 161]),
            Err(Error::MalformedInput(_))
        ));
        assert!(matches!(
            read_header(0, &[0u8; 79]),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_out_of_range() {
        let store = HeaderStore::from_bytes(synthetic_log(4)).unwrap();

        let err = store.read_header(-1).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { index: -1, nblocks: 3 }));
        assert!(err.is_recoverable());

        assert!(matches!(
            store.read_header(3),
            Err(Error::OutOfRange { index: 3, nblocks: 3 })
        ));
        assert!(store.get(3).is_none());
        assert!(read_header(3, store.as_bytes()).is_err());
        assert!(read_header(i64::MIN, store.as_bytes()).is_err());
    }

    #[test]
    fn test_slicing() {
        let log = synthetic_log(4);
        let store = HeaderStore::from_bytes(log.clone()).unwrap();

        for i in 0..3u64 {
            let header = store.read_header(i as i64).unwrap();
            assert_eq!(header.block_number, i);
            let start = i as usize * HEADER_SIZE;
            assert_eq!(header.to_bytes().as_slice(), &log[start..start + HEADER_SIZE]);
            assert_eq!(read_header(i as i64, &log).unwrap(), header);
        }
        assert_eq!(store.iter().count(), 3);
    }

    #[test]
    fn test_append_and_reload() {
        let mut store = HeaderStore::default();
        store.append_raw(&[7u8; HEADER_SIZE]).unwrap();
        store.append_raw(&[9u8; HEADER_SIZE]).unwrap();
        assert!(store.append_raw(&[0u8; 10]).is_err());

        let header = store.read_header(0).unwrap();
        store.append(&header);
        assert_eq!(store.record_count(), 3);

        let file = NamedTempFile::new().unwrap();
        store.save(file.path()).unwrap();
        let reloaded = HeaderStore::open(file.path()).unwrap();
        assert_eq!(reloaded, store);
        assert_eq!(reloaded.raw(1), Some(&[9u8; HEADER_SIZE][..]));
    }

    proptest! {
        #[test]
        fn prop_read_is_idempotent(records in 2u8..8, pick in 0i64..8) {
            let store = HeaderStore::from_bytes(synthetic_log(records)).unwrap();
            let first = store.read_header(pick);
            let second = store.read_header(pick);
            match (first, second) {
                (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
                (Err(_), Err(_)) => prop_assert!(pick >= store.nblocks() as i64),
                _ => prop_assert!(false),
            }
        }
    }
}
