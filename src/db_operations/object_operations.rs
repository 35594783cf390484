use super::{index_operations, obj_key, ptr_key, tx_get, tx_put, DbOperations, KEY_OBJ};
use crate::error::{MeshFsError, MeshFsResult};
use crate::record::{FilePointer, Record};

impl DbOperations {
    /// Looks up a record body by identity.
    pub fn get_record_by_uuid(&self, uuid: &str) -> MeshFsResult<Option<Record>> {
        self.get_item(&obj_key(uuid))
    }

    /// Every record body in the registry.
    pub fn all_records(&self) -> MeshFsResult<Vec<Record>> {
        Ok(self
            .scan_items::<Record>(KEY_OBJ)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    /// Persists a mutated record back under the same uuid.
    ///
    /// The old index entries, the new body, the refreshed pointer
    /// projection and the new index entries all commit in one transaction,
    /// so a reader never observes the mutation half-applied.
    pub fn persist_record_update(&self, record: &Record) -> MeshFsResult<()> {
        let full = record.full_path();
        self.db()
            .transaction(|tx| {
                if let Some(old) = tx_get::<Record>(tx, &obj_key(record.uuid))? {
                    for key in index_operations::index_keys(&old) {
                        tx.remove(key.as_bytes())?;
                    }
                }
                tx_put(tx, &obj_key(record.uuid), record)?;
                if let Some(mut pointer) = tx_get::<FilePointer>(tx, &ptr_key(&full))? {
                    pointer.size = record.payload_size();
                    pointer.version = record.version;
                    tx_put(tx, &ptr_key(&full), &pointer)?;
                }
                index_operations::index_record_tx(tx, record)
            })
            .map_err(MeshFsError::from)?;
        self.db().flush()?;
        Ok(())
    }
}
