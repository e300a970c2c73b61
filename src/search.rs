use crate::{Result, StateStore, StoreDocument};
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchFilter {
    pub keyword: Option<String>,
    pub category: Option<String>,
    pub region: Option<String>,
    pub page: usize,
    pub page_size: usize,
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self {
            keyword: None,
            category: None,
            region: None,
            page: 0,
            page_size: 20,
        }
    }
}

impl SearchFilter {
    pub fn matches(&self, doc: &StoreDocument) -> bool {
        let keyword_ok = self.keyword.as_ref().map_or(true, |kw| {
            let kw = kw.to_lowercase();
            doc.name.to_lowercase().contains(&kw) || doc.description.to_lowercase().contains(&kw)
        });
        let category_ok = self.category.as_ref().map_or(true, |c| c.eq_ignore_ascii_case(&doc.category));
        let region_ok = self.region.as_ref().map_or(true, |r| r.eq_ignore_ascii_case(&doc.region));

        keyword_ok && category_ok && region_ok
    }

    /// Cache key for the result page this filter selects, under `prefix`.
    pub fn cache_key(&self, prefix: &str) -> String {
        format!(
            "{}kw={}|cat={}|region={}|page={}|size={}",
            prefix,
            self.keyword.as_deref().unwrap_or(""),
            self.category.as_deref().unwrap_or(""),
            self.region.as_deref().unwrap_or(""),
            self.page,
            self.page_size
        )
    }
}

/// Search engine holding one document per store id.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Upsert a snapshot. Returns false when a newer version is already indexed.
    async fn upsert(&self, document: &StoreDocument, version: u64) -> Result<bool>;

    /// Remove a document. Returns false when a newer version is already indexed.
    async fn delete(&self, store_id: i64, version: u64) -> Result<bool>;

    async fn get(&self, store_id: i64) -> Result<Option<StoreDocument>>;

    async fn query(&self, filter: &SearchFilter) -> Result<Vec<StoreDocument>>;
}

#[derive(Debug, Clone, Default)]
struct IndexedDocument {
    /// None until the first snapshot or delete for the id arrives.
    version: Option<u64>,
    /// None is a tombstone left by a delete.
    document: Option<StoreDocument>,
}

/// In-memory index. Keeps tombstones so a late, older snapshot cannot resurrect a delete.
#[derive(Clone, Default)]
pub struct InMemorySearchIndex {
    documents: StateStore<i64, IndexedDocument>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version_of(&self, store_id: i64) -> Option<u64> {
        self.documents.get(&store_id).and_then(|d| d.version)
    }

    fn apply(&self, store_id: i64, version: u64, document: Option<StoreDocument>) -> bool {
        self.documents.update(store_id, |current| {
            if current.version.map_or(false, |seen| version <= seen) {
                return false;
            }
            current.version = Some(version);
            current.document = document;
            true
        })
    }
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn upsert(&self, document: &StoreDocument, version: u64) -> Result<bool> {
        Ok(self.apply(document.store_id, version, Some(document.clone())))
    }

    async fn delete(&self, store_id: i64, version: u64) -> Result<bool> {
        Ok(self.apply(store_id, version, None))
    }

    async fn get(&self, store_id: i64) -> Result<Option<StoreDocument>> {
        Ok(self.documents.get(&store_id).and_then(|d| d.document))
    }

    async fn query(&self, filter: &SearchFilter) -> Result<Vec<StoreDocument>> {
        let mut hits: Vec<StoreDocument> = self
            .documents
            .values()
            .into_iter()
            .filter_map(|d| d.document)
            .filter(|doc| filter.matches(doc))
            .collect();
        hits.sort_by_key(|doc| doc.store_id);

        Ok(hits
            .into_iter()
            .skip(filter.page.saturating_mul(filter.page_size))
            .take(filter.page_size)
            .collect())
    }
}
