//! Package-manifest cache and the ancestor `node_modules` walk that
//! implements the package-manifest resolver collaborator.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;

use crate::{error::ResolveError, file_system::FileSystem, package_json::PackageJson};

/// Holds the filesystem handle plus the two caches that must stay
/// insert-only for the resolver's lifetime: the `package.json` cache
/// (keyed by manifest path) and `idToPkgMap` (resolved file → owning
/// package).
pub struct Cache<Fs> {
    fs: Fs,
    package_json_cache: DashMap<PathBuf, Option<Arc<PackageJson>>>,
    id_to_pkg_map: DashMap<PathBuf, Arc<PackageJson>>,
}

impl<Fs: FileSystem> Cache<Fs> {
    pub fn new(fs: Fs) -> Self {
        Self { fs, package_json_cache: DashMap::new(), id_to_pkg_map: DashMap::new() }
    }

    pub fn file_system(&self) -> &Fs {
        &self.fs
    }

    pub async fn is_file(&self, path: &Path) -> bool {
        self.fs.metadata(path).await.is_ok_and(|m| m.is_file)
    }

    pub async fn is_dir(&self, path: &Path) -> bool {
        self.fs.metadata(path).await.is_ok_and(|m| m.is_dir)
    }

    /// `realpath` when `preserve_symlinks` is false, the path unchanged
    /// otherwise.
    pub async fn realpath(&self, path: &Path, preserve_symlinks: bool) -> PathBuf {
        if preserve_symlinks {
            return path.to_path_buf();
        }
        self.fs.canonicalize(path).await.unwrap_or_else(|_| path.to_path_buf())
    }

    /// `loadPackageData(manifestPath)`: load, parse, and cache the
    /// `package.json` at `manifest_path`. A missing file is `Ok(None)`; a
    /// malformed one is a propagated [`ResolveError::Json`].
    pub async fn load_package_data(
        &self,
        manifest_path: &Path,
    ) -> Result<Option<Arc<PackageJson>>, ResolveError> {
        if let Some(cached) = self.package_json_cache.get(manifest_path) {
            return Ok(cached.clone());
        }
        let result = match self.fs.read_to_string(manifest_path).await {
            Ok(content) => {
                Some(Arc::new(PackageJson::parse(manifest_path.to_path_buf(), &content)?))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => return Err(ResolveError::from(err)),
        };
        self.package_json_cache.insert(manifest_path.to_path_buf(), result.clone());
        Ok(result)
    }

    /// `resolvePackageData(packageId, basedir)`: walk `basedir` and its
    /// ancestors looking for `node_modules/<packageId>/package.json`.
    pub async fn resolve_package_data(
        &self,
        package_id: &str,
        basedir: &Path,
    ) -> Result<Option<Arc<PackageJson>>, ResolveError> {
        let mut dir = Some(basedir.to_path_buf());
        while let Some(current) = dir {
            let candidate = current.join("node_modules").join(package_id).join("package.json");
            if let Some(pkg) = self.load_package_data(&candidate).await? {
                return Ok(Some(pkg));
            }
            dir = current.parent().map(Path::to_path_buf);
        }
        Ok(None)
    }

    /// Walk `start`'s ancestor directories (including its own, if `start` is
    /// itself a directory) for the nearest `package.json`. Used to find the
    /// package that owns a relative import, as opposed to
    /// [`Self::resolve_package_data`] which looks for a *named* dependency
    /// under `node_modules`.
    pub async fn find_nearest_package(
        &self,
        start: &Path,
    ) -> Result<Option<Arc<PackageJson>>, ResolveError> {
        let mut dir = if self.is_dir(start).await {
            Some(start.to_path_buf())
        } else {
            start.parent().map(Path::to_path_buf)
        };
        while let Some(current) = dir {
            let manifest = current.join("package.json");
            if let Some(pkg) = self.load_package_data(&manifest).await? {
                return Ok(Some(pkg));
            }
            dir = current.parent().map(Path::to_path_buf);
        }
        Ok(None)
    }

    /// Record that `resolved` was produced via `pkg`, for later `browser`
    /// field / `sideEffects` lookups from files inside it.
    pub fn record_id_to_pkg(&self, resolved: PathBuf, pkg: Arc<PackageJson>) {
        self.id_to_pkg_map.insert(resolved, pkg);
    }

    #[must_use]
    pub fn lookup_pkg_for_id(&self, resolved: &Path) -> Option<Arc<PackageJson>> {
        self.id_to_pkg_map.get(resolved).map(|entry| Arc::clone(&entry))
    }

    /// Drop every cache entry. Used between independent test runs; within a
    /// live resolver the caches are meant to live for its whole lifetime.
    pub fn clear(&self) {
        self.package_json_cache.clear();
        self.id_to_pkg_map.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tests::memory_fs::MemoryFS;

    #[tokio::test]
    async fn load_package_data_is_memoized() {
        let fs = MemoryFS::new(&[("/p/package.json", r#"{"name":"p"}"#)]);
        let cache = Cache::new(fs);
        let first = cache.load_package_data(Path::new("/p/package.json")).await.unwrap();
        assert!(first.is_some());
        let second = cache.load_package_data(Path::new("/p/package.json")).await.unwrap();
        assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
    }

    #[tokio::test]
    async fn missing_manifest_is_none() {
        let fs = MemoryFS::new(&[]);
        let cache = Cache::new(fs);
        let result = cache.load_package_data(Path::new("/p/package.json")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn resolve_package_data_walks_ancestors() {
        let fs = MemoryFS::new(&[("/p/node_modules/react/package.json", r#"{"name":"react"}"#)]);
        let cache = Cache::new(fs);
        let pkg =
            cache.resolve_package_data("react", Path::new("/p/src/components")).await.unwrap();
        assert_eq!(pkg.unwrap().name.as_deref(), Some("react"));
    }

    #[tokio::test]
    async fn find_nearest_package_walks_up_from_file() {
        let fs = MemoryFS::new(&[("/p/package.json", r#"{"name":"p"}"#)]);
        let cache = Cache::new(fs);
        let pkg = cache.find_nearest_package(Path::new("/p/src/components")).await.unwrap();
        assert_eq!(pkg.unwrap().name.as_deref(), Some("p"));
    }

    #[tokio::test]
    async fn id_to_pkg_map_roundtrip() {
        let fs = MemoryFS::new(&[]);
        let cache = Cache::new(fs);
        let pkg =
            Arc::new(PackageJson::parse(PathBuf::from("/p/package.json"), r#"{"name":"p"}"#).unwrap());
        cache.record_id_to_pkg(PathBuf::from("/p/index.js"), Arc::clone(&pkg));
        assert!(cache.lookup_pkg_for_id(Path::new("/p/index.js")).is_some());
        assert!(cache.lookup_pkg_for_id(Path::new("/p/other.js")).is_none());
    }
}
