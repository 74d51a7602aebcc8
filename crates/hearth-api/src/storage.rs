use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Result, bail};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

/// Public object storage for avatars and note images.
///
/// Objects live at `{dir}/{key}` where a key is a relative path such as
/// `notes/{note_id}/{image_id}.jpg`. The directory is served read-only under
/// `/storage`, so `public_url` is just the base URL plus the key.
pub struct Storage {
    dir: PathBuf,
    public_base: String,
}

/// One file found by `list`.
#[derive(Debug)]
pub struct StoredObject {
    pub key: String,
    pub modified: SystemTime,
}

impl Storage {
    pub async fn new(dir: PathBuf, public_base: &str) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Object storage directory: {}", dir.display());
        Ok(Self {
            dir,
            public_base: public_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a key to a path, refusing anything that could escape `dir`.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key.split('/').all(|seg| {
                !seg.is_empty()
                    && seg != "."
                    && seg != ".."
                    && seg.bytes().all(|b| b.is_ascii_alphanumeric() || b"._-".contains(&b))
            });
        if !valid {
            bail!("Invalid storage key '{}'", key);
        }
        Ok(self.dir.join(key))
    }

    /// Write an object, replacing any existing one with the same key.
    ///
    /// Data goes to a temporary sibling first and is renamed into place, so
    /// readers never see a half-written file.
    pub async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
        let mut file = fs::File::create(&tmp).await?;
        let written = async {
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        if let Err(e) = written {
            fs::remove_file(&tmp).await.ok();
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            fs::remove_file(&tmp).await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    #[cfg(test)]
    pub async fn read(&self, key: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.path_for(key)?).await?)
    }

    /// Delete an object. Missing objects are not an error.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Object {} already gone", key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort delete of several objects, logging failures.
    pub async fn delete_all(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.delete(key).await {
                warn!("Failed to delete object {}: {}", key, e);
            }
        }
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/storage/{}", self.public_base, key)
    }

    /// Every file under the storage directory, with keys using `/` separators.
    pub async fn list(&self) -> Result<Vec<StoredObject>> {
        let mut objects = Vec::new();
        let mut pending = vec![self.dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let meta = entry.metadata().await?;
                let path = entry.path();
                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(rel) = path.strip_prefix(&self.dir) else {
                    continue;
                };
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                objects.push(StoredObject {
                    key,
                    modified: meta.modified()?,
                });
            }
        }

        Ok(objects)
    }
}
