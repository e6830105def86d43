//! Folder replication cache
//!
//! Maps a folder path below an import root to a remote folder, creating
//! missing folders parent-first. Each distinct path is resolved at most once:
//! concurrent callers for a path that is still being created wait on the
//! first caller's result instead of issuing their own create.

use crate::error::HubError;
use crate::hub::{Folder, FolderParent, RepositoryService};
use futures::future::BoxFuture;
use futures::FutureExt;
use moka::future::Cache;
use std::sync::Arc;

/// Where records land: a repository root or a folder inside it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderPlacement {
    /// Repository id
    pub repository_id: String,
    /// Folder, or `None` for the repository root
    pub folder: Option<Folder>,
}

impl FolderPlacement {
    /// Repository root
    #[inline]
    #[must_use]
    pub fn root(repository_id: impl Into<String>) -> Self {
        Self {
            repository_id: repository_id.into(),
            folder: None,
        }
    }

    /// Inside an existing folder
    #[inline]
    #[must_use]
    pub fn in_folder(folder: Folder) -> Self {
        Self {
            repository_id: folder.repository_id.clone(),
            folder: Some(folder),
        }
    }

    /// Folder id, `None` at the root
    #[inline]
    #[must_use]
    pub fn folder_id(&self) -> Option<&str> {
        self.folder.as_ref().map(|f| f.id.as_str())
    }

    /// As a parent for listing/creating subfolders
    #[must_use]
    pub fn as_parent(&self) -> FolderParent {
        match &self.folder {
            Some(folder) => FolderParent::Folder(folder.clone()),
            None => FolderParent::Repository(self.repository_id.clone()),
        }
    }
}

fn cache_key(base: &FolderPlacement, path: &[String]) -> String {
    format!(
        "{}:{}/{}",
        base.repository_id,
        base.folder_id().unwrap_or_default(),
        path.join("/")
    )
}

/// Memoized, create-on-miss folder lookup
#[derive(Clone)]
pub struct FolderCache {
    hub: Arc<dyn RepositoryService>,
    inner: Cache<String, Folder>,
}

impl FolderCache {
    /// Empty cache over `hub`
    #[must_use]
    pub fn new(hub: Arc<dyn RepositoryService>) -> Self {
        Self {
            hub,
            inner: Cache::new(10_000),
        }
    }

    /// Seed the cache with every existing folder of a repository
    ///
    /// Each folder's path is rebuilt through its parent chain. A folder whose
    /// chain cannot be walked is left out; it will be looked up on demand.
    ///
    /// # Errors
    /// `HubError` if the folder listing itself fails.
    pub async fn prime(&self, repository_id: &str) -> Result<usize, HubError> {
        let base = FolderPlacement::root(repository_id);
        let folders = self.hub.list_folders(repository_id).await?;
        let mut seeded = 0;

        for folder in folders {
            match self.path_of(&folder).await {
                Ok(path) => {
                    self.inner.insert(cache_key(&base, &path), folder).await;
                    seeded += 1;
                }
                Err(e) => {
                    tracing::warn!("Skipping folder {} while priming cache: {}", folder.name, e);
                }
            }
        }

        tracing::debug!("Primed folder cache for {} with {} folders", repository_id, seeded);
        Ok(seeded)
    }

    async fn path_of(&self, folder: &Folder) -> Result<Vec<String>, HubError> {
        let mut path = vec![folder.name.clone()];
        let mut current = folder.clone();
        while let Some(parent) = self.hub.folder_parent(&current).await? {
            path.push(parent.name.clone());
            current = parent;
        }
        path.reverse();
        Ok(path)
    }

    /// Folder for `path` below `base`, creating what is missing
    ///
    /// # Errors
    /// The hub error that stopped the lookup or creation. All callers waiting
    /// on the same path see the same error.
    pub fn resolve<'a>(
        &'a self,
        base: &'a FolderPlacement,
        path: &'a [String],
    ) -> BoxFuture<'a, Result<FolderPlacement, Arc<HubError>>> {
        async move {
            let Some((name, parent_path)) = path.split_last() else {
                return Ok(base.clone());
            };

            let folder = self
                .inner
                .try_get_with(cache_key(base, path), async {
                    let parent = self
                        .resolve(base, parent_path)
                        .await
                        .map_err(|e| (*e).clone())?;
                    self.find_or_create(&parent.as_parent(), name).await
                })
                .await?;

            Ok(FolderPlacement::in_folder(folder))
        }
        .boxed()
    }

    /// Like [`resolve`](Self::resolve), falling back to `base` on failure
    pub async fn resolve_or_root(&self, base: &FolderPlacement, path: &[String]) -> FolderPlacement {
        match self.resolve(base, path).await {
            Ok(placement) => placement,
            Err(e) => {
                tracing::warn!(
                    "Could not place folder '{}': {}; using import root",
                    path.join("/"),
                    e
                );
                base.clone()
            }
        }
    }

    async fn find_or_create(&self, parent: &FolderParent, name: &str) -> Result<Folder, HubError> {
        let existing = self.hub.list_subfolders(parent).await?;
        if let Some(folder) = existing.into_iter().find(|f| f.name == name) {
            return Ok(folder);
        }

        let folder = self.hub.create_folder(parent, name).await?;
        tracing::info!("Created folder {} ({})", folder.name, folder.id);
        Ok(folder)
    }

    /// Number of cached paths
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl std::fmt::Debug for FolderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderCache")
            .field("entries", &self.inner.entry_count())
            .finish_non_exhaustive()
    }
}
