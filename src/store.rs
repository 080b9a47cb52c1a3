use std::sync::Mutex;

use crate::Error;

/// Local secure storage for the serialized device-state record.
///
/// The engine assumes a record is durably written once `save` returns;
/// there is no rollback if a write is interrupted mid-operation.
pub trait StateStore {
    /// Loads the persisted record, or `None` if nothing was ever saved.
    fn load(&self) -> Result<Option<Vec<u8>>, Error>;

    /// Persists the record, replacing any previous value.
    fn save(&self, bytes: &[u8]) -> Result<(), Error>;
}

/// A [`StateStore`] backed by process memory. Useful for tests and for
/// sessions that should not outlive the process.
#[derive(Default)]
pub struct MemoryStore {
    bytes: Mutex<Option<Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<Vec<u8>>, Error> {
        Ok(self
            .bytes
            .lock()
            .map_err(|_| Error::Storage("memory store lock poisoned".to_string()))?
            .clone())
    }

    fn save(&self, bytes: &[u8]) -> Result<(), Error> {
        *self
            .bytes
            .lock()
            .map_err(|_| Error::Storage("memory store lock poisoned".to_string()))? =
            Some(bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.load().unwrap(), None);

        store.save(b"record").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some(b"record".as_slice()));

        store.save(b"newer").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some(b"newer".as_slice()));
    }
}
