use async_trait::async_trait;
use doc_qa_core::{DocumentRecord, DocumentRegistry, StoreError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Document registry persisted to a JSON file next to the data. Stands in
/// for the upload service's registry so `process` and `ask` can run as
/// separate invocations. Clones share the same backing file and map.
#[derive(Clone)]
pub struct FileRegistry {
    path: PathBuf,
    documents: Arc<Mutex<HashMap<String, DocumentRecord>>>,
}

impl FileRegistry {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let documents = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(error) => return Err(StoreError::Database(error.to_string())),
        };

        Ok(Self {
            path,
            documents: Arc::new(Mutex::new(documents)),
        })
    }

    fn persist(&self, documents: &HashMap<String, DocumentRecord>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| StoreError::Database(error.to_string()))?;
        }
        let serialized = serde_json::to_string_pretty(documents)?;
        std::fs::write(&self.path, serialized)
            .map_err(|error| StoreError::Database(error.to_string()))
    }
}

#[async_trait]
impl DocumentRegistry for FileRegistry {
    async fn find(&self, id: &str) -> Result<Option<DocumentRecord>, StoreError> {
        let documents = self.documents.lock().expect("registry lock");
        Ok(documents.get(id).cloned())
    }

    async fn create(&self, record: DocumentRecord) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().expect("registry lock");
        documents.insert(record.id.clone(), record);
        self.persist(&documents)
    }

    async fn mark_vectorized(&self, id: &str) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().expect("registry lock");
        match documents.get_mut(id) {
            Some(record) => record.vectorized = true,
            None => {
                return Err(StoreError::Database(format!(
                    "document {id} missing from registry"
                )))
            }
        }
        self.persist(&documents)
    }
}
