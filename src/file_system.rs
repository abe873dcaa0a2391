use cfg_if::cfg_if;
use futures::future::BoxFuture;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// File System abstraction used for [`crate::Resolver`].
pub trait FileSystem: Send + Sync {
    /// See [std::fs::read]
    ///
    /// # Errors
    ///
    /// See [std::fs::read]
    fn read<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<Vec<u8>>>;

    /// See [std::fs::read_to_string]
    ///
    /// # Errors
    ///
    /// See [std::fs::read_to_string]
    fn read_to_string<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<String>>;

    /// See [std::fs::metadata]
    ///
    /// # Errors
    ///
    /// See [std::fs::metadata]
    fn metadata<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<FileMetadata>>;

    /// See [std::fs::symlink_metadata]
    ///
    /// # Errors
    ///
    /// See [std::fs::symlink_metadata]
    fn symlink_metadata<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<FileMetadata>>;

    /// See [std::fs::canonicalize]
    ///
    /// # Errors
    ///
    /// See [std::fs::read_link]
    fn canonicalize<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<PathBuf>>;
}

/// Metadata information about a file
#[derive(Debug, Clone, Copy)]
pub struct FileMetadata {
    pub is_file: bool,
    pub is_dir: bool,
    pub is_symlink: bool,
}

impl FileMetadata {
    pub fn new(is_file: bool, is_dir: bool, is_symlink: bool) -> Self {
        Self { is_file, is_dir, is_symlink }
    }
}

impl From<fs::Metadata> for FileMetadata {
    fn from(metadata: fs::Metadata) -> Self {
        Self::new(metadata.is_file(), metadata.is_dir(), metadata.is_symlink())
    }
}

/// Operating System
#[derive(Default)]
pub struct FileSystemOs;

impl FileSystem for FileSystemOs {
    fn read<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<Vec<u8>>> {
        Box::pin(async move { fs::read(path) })
    }

    fn read_to_string<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<String>> {
        Box::pin(async move { fs::read_to_string(path) })
    }

    fn metadata<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<FileMetadata>> {
        Box::pin(async move { fs::metadata(path).map(FileMetadata::from) })
    }

    fn symlink_metadata<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<FileMetadata>> {
        Box::pin(async move { fs::symlink_metadata(path).map(FileMetadata::from) })
    }

    fn canonicalize<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<PathBuf>> {
        let fut = async move {
            cfg_if! {
                if #[cfg(not(target_os = "wasi"))] {
                    dunce::canonicalize(path)
                } else {
                    use std::path::Component;
                    let mut path_buf = path.to_path_buf();
                    loop {
                        let link = fs::read_link(&path_buf)?;
                        path_buf.pop();
                        for component in link.components() {
                            match component {
                                Component::ParentDir => {
                                    path_buf.pop();
                                }
                                Component::Normal(seg) => {
                                    path_buf.push(seg);
                                }
                                Component::RootDir => {
                                    path_buf = PathBuf::from("/");
                                }
                                Component::CurDir | Component::Prefix(_) => {}
                            }
                        }
                        if !fs::symlink_metadata(&path_buf)?.is_symlink() {
                            break;
                        }
                    }
                    Ok(path_buf)
                }
            }
        };

        Box::pin(fut)
    }
}

#[tokio::test]
async fn metadata() {
    let meta = FileMetadata { is_file: true, is_dir: true, is_symlink: true };
    assert_eq!(
        format!("{meta:?}"),
        "FileMetadata { is_file: true, is_dir: true, is_symlink: true }"
    );
    let _ = meta;
}
