use std::path::{Path, PathBuf};

pub trait StorageManager: Send + Sync {
    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()>;
    /// Write several artifacts so that either all of them land or none do.
    ///
    /// On failure the previous contents of every target are left in place.
    fn write_together(&self, items: &[(&str, &[u8])]) -> std::io::Result<()>;
    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>>;
    fn exists(&self, ident: &str) -> bool;
}

#[derive(Clone, Debug)]
pub struct BackendLocal {
    pub base_dir: PathBuf,
}

/// A temp file waiting to replace `target`.
struct Staged {
    temp: PathBuf,
    target: PathBuf,
    backup: PathBuf,
}

impl BackendLocal {
    pub fn new(storage_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;
        Ok(BackendLocal { base_dir: path })
    }

    pub fn path(&self, ident: &str) -> PathBuf {
        self.base_dir.join(ident)
    }

    fn temp_path(&self, ident: &str) -> PathBuf {
        self.base_dir
            .join(format!(".{}-{ident}", rusty_ulid::generate_ulid_string()))
    }

    /// Write every item into its own temp file.
    fn stage(&self, items: &[(&str, &[u8])]) -> std::io::Result<Vec<Staged>> {
        let mut staged: Vec<Staged> = Vec::with_capacity(items.len());

        for (ident, data) in items {
            let temp = self.temp_path(ident);
            if let Err(err) = std::fs::write(&temp, data) {
                let _ = std::fs::remove_file(&temp);
                for item in &staged {
                    let _ = std::fs::remove_file(&item.temp);
                }
                return Err(err);
            }
            staged.push(Staged {
                temp,
                target: self.path(ident),
                backup: self.temp_path(&format!("{ident}.bak")),
            });
        }

        Ok(staged)
    }

    /// Move staged files over their targets.
    ///
    /// Existing targets are moved aside first and only deleted once every
    /// staged file is in place; any failed rename puts them back.
    fn commit(
        &self,
        staged: &[Staged],
        mut rename: impl FnMut(&Path, &Path) -> std::io::Result<()>,
    ) -> std::io::Result<()> {
        let mut moved_aside: Vec<&Staged> = Vec::new();
        let mut swapped: Vec<&Staged> = Vec::new();

        let result = (|| -> std::io::Result<()> {
            for item in staged {
                if std::fs::symlink_metadata(&item.target).is_ok() {
                    rename(&item.target, &item.backup)?;
                    moved_aside.push(item);
                }
            }
            for item in staged {
                rename(&item.temp, &item.target)?;
                swapped.push(item);
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                for item in moved_aside {
                    remove_any(&item.backup);
                }
                Ok(())
            }
            Err(err) => {
                log::error!("failed to move artifacts into place: {err}");
                for item in swapped {
                    let _ = std::fs::remove_file(&item.target);
                }
                for item in moved_aside {
                    if let Err(err) = std::fs::rename(&item.backup, &item.target) {
                        log::error!(
                            "cannot restore {} from {}: {err}",
                            item.target.display(),
                            item.backup.display()
                        );
                    }
                }
                for item in staged {
                    let _ = std::fs::remove_file(&item.temp);
                }
                Err(err)
            }
        }
    }
}

fn remove_any(path: &Path) {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    if let Err(err) = result {
        log::warn!("cannot remove {}: {err}", path.display());
    }
}

impl StorageManager for BackendLocal {
    fn exists(&self, ident: &str) -> bool {
        std::fs::metadata(self.path(ident)).is_ok()
    }

    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.path(ident))
    }

    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()> {
        self.write_together(&[(ident, data)])
    }

    fn write_together(&self, items: &[(&str, &[u8])]) -> std::io::Result<()> {
        let staged = self.stage(items)?;
        self.commit(&staged, |from, to| std::fs::rename(from, to))
    }
}
