use std::path::Path;

use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::Result;

use super::{decode, Collectable};

#[derive(Clone, Debug)]
pub struct SledDb {
    inner: ::sled::Db,
}

impl SledDb {
    /// Opens (or creates) the database stored at the given directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let inner = ::sled::Config::default().path(path).open()?;
        Ok(Self { inner })
    }

    /// Opens a database that lives only as long as the returned handle.
    pub fn temporary() -> Result<Self> {
        let inner = ::sled::Config::default().temporary(true).open()?;
        Ok(Self { inner })
    }

    /// Opens a named tree. Trees are created on first access.
    pub fn tree(&self, name: impl AsRef<[u8]>) -> Result<::sled::Tree> {
        Ok(self.inner.open_tree(name)?)
    }

    /// Gets a collection of entries of the same type from the collection
    /// defined for the type.
    pub fn get_collection<T: DeserializeOwned + Collectable>(&self) -> Result<Vec<T>> {
        let tree = self.tree(T::get_collection_name())?;
        let mut out = Vec::new();
        for entry in tree.iter() {
            let (_, value_bytes) = entry?;
            out.push(decode(&value_bytes)?);
        }
        Ok(out)
    }

    /// Gets an item from the collection defined for the item type.
    pub fn get<T: DeserializeOwned + Collectable>(&self, id: Uuid) -> Result<Option<T>> {
        let tree = self.tree(T::get_collection_name())?;
        match tree.get(&id.as_bytes()[..])? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Resolves once all pending writes are on disk.
    pub async fn flush(&self) -> Result<()> {
        self.inner.flush_async().await?;
        Ok(())
    }
}
