//! Dependency-optimizer collaborator consumed by `tryOptimizedResolve`.
//!
//! The resolver never pre-bundles dependencies itself; it only consults an
//! already-running optimizer to rewrite a bare import to a pre-bundled
//! artifact, and to register a newly discovered dependency as one the
//! optimizer needs to pick up on its next pass.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// A single entry in the optimizer's dependency metadata.
#[derive(Debug, Clone)]
pub struct DepInfo {
    /// The bare or deep-import id this entry was registered under.
    pub id: String,
    /// The resolved on-disk source file the optimizer bundled from.
    pub src: PathBuf,
}

/// Snapshot of optimizer state for one side of the module graph (client or
/// ssr).
#[derive(Debug, Clone)]
pub struct OptimizerMetadata {
    /// Hash embedded in the `v=<hash>` query appended to optimized urls.
    pub browser_hash: String,
    pub dep_info_list: Vec<DepInfo>,
}

/// Collaborator consulted by `resolve_id` after plain node resolution fails
/// to find a dependency already known to the optimizer, and used to report
/// dependencies discovered for the first time mid-resolution.
#[async_trait]
pub trait DepsOptimizer: Send + Sync {
    /// Specifier already rewritten to an optimized-dep url (e.g. under
    /// `/node_modules/.vite/deps/`).
    fn is_optimized_dep_url(&self, id: &str) -> bool;

    /// Resolved on-disk path already rewritten to an optimized-dep file.
    fn is_optimized_dep_file(&self, path: &Path) -> bool;

    /// Metadata for the client or ssr side, selected by `ssr`.
    fn metadata(&self, ssr: bool) -> OptimizerMetadata;

    /// Package ids the optimizer was configured to never pre-bundle.
    fn excluded(&self) -> &[String];

    /// Register a dependency discovered mid-resolution; returns the
    /// [`DepInfo`] the optimizer assigned to it.
    async fn register_missing_import(&self, id: &str, resolved: &Path, ssr: bool) -> DepInfo;

    /// The public id under which callers should import `info`.
    fn get_optimized_dep_id(&self, info: &DepInfo) -> String;

    /// Resolves once the optimizer's dependency scan (discovery crawl) has
    /// finished; resolving immediately if no scan is in flight.
    async fn scan_processing(&self);
}

/// `tryOptimizedResolve`.
///
/// Awaits the optimizer's scan, then looks for `id` among its known
/// dependencies: first an exact match, then — for nested nested-dependency
/// ids like `some-lib > nested-lib` — a suffix match whose resolved source
/// path agrees with a node-style resolution of `id` from the importer's
/// directory.
pub async fn try_optimized_resolve(
    optimizer: &dyn DepsOptimizer,
    ssr: bool,
    id: &str,
    resolve_from: impl Fn(&str, Option<&Path>) -> Option<PathBuf>,
    importer: Option<&Path>,
) -> Option<String> {
    optimizer.scan_processing().await;
    let metadata = optimizer.metadata(ssr);

    if let Some(info) = metadata.dep_info_list.iter().find(|info| info.id == id) {
        return Some(optimizer.get_optimized_dep_id(info));
    }

    for info in metadata.dep_info_list.iter().filter(|info| info.id.ends_with(id)) {
        let importer_dir = importer.and_then(Path::parent);
        if let Some(resolved_src) = resolve_from(id, importer_dir) {
            if info.src == resolved_src {
                return Some(optimizer.get_optimized_dep_id(info));
            }
        }
    }

    None
}

#[cfg(test)]
pub mod test_support {
    use super::{DepInfo, DepsOptimizer, OptimizerMetadata};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    /// In-memory optimizer double for unit and integration tests.
    #[derive(Default)]
    pub struct MockOptimizer {
        pub deps: Vec<DepInfo>,
        pub excluded: Vec<String>,
        pub registered: Mutex<Vec<(String, PathBuf)>>,
    }

    #[async_trait]
    impl DepsOptimizer for MockOptimizer {
        fn is_optimized_dep_url(&self, id: &str) -> bool {
            id.contains("/.vite/deps/")
        }

        fn is_optimized_dep_file(&self, path: &Path) -> bool {
            path.to_string_lossy().contains("/.vite/deps/")
        }

        fn metadata(&self, _ssr: bool) -> OptimizerMetadata {
            OptimizerMetadata { browser_hash: "deadbeef".to_string(), dep_info_list: self.deps.clone() }
        }

        fn excluded(&self) -> &[String] {
            &self.excluded
        }

        async fn register_missing_import(&self, id: &str, resolved: &Path, _ssr: bool) -> DepInfo {
            self.registered.lock().unwrap().push((id.to_string(), resolved.to_path_buf()));
            DepInfo { id: id.to_string(), src: resolved.to_path_buf() }
        }

        fn get_optimized_dep_id(&self, info: &DepInfo) -> String {
            format!("/node_modules/.vite/deps/{}.js?v=deadbeef", info.id.replace('/', "_"))
        }

        async fn scan_processing(&self) {}
    }
}

#[cfg(test)]
mod test {
    use super::test_support::MockOptimizer;
    use super::*;

    #[tokio::test]
    async fn exact_match() {
        let optimizer = MockOptimizer {
            deps: vec![DepInfo { id: "lodash".to_string(), src: PathBuf::from("/p/node_modules/lodash/index.js") }],
            ..Default::default()
        };
        let id = try_optimized_resolve(&optimizer, false, "lodash", |_, _| None, None).await;
        assert_eq!(id, Some("/node_modules/.vite/deps/lodash.js?v=deadbeef".to_string()));
    }

    #[tokio::test]
    async fn no_match_returns_none() {
        let optimizer = MockOptimizer::default();
        let id = try_optimized_resolve(&optimizer, false, "lodash", |_, _| None, None).await;
        assert_eq!(id, None);
    }

    #[tokio::test]
    async fn nested_match_via_resolve_from() {
        let optimizer = MockOptimizer {
            deps: vec![DepInfo {
                id: "some-lib > nested-lib".to_string(),
                src: PathBuf::from("/p/node_modules/some-lib/node_modules/nested-lib/index.js"),
            }],
            ..Default::default()
        };
        let id = try_optimized_resolve(
            &optimizer,
            false,
            "nested-lib",
            |_, _| Some(PathBuf::from("/p/node_modules/some-lib/node_modules/nested-lib/index.js")),
            None,
        )
        .await;
        assert_eq!(id, Some("/node_modules/.vite/deps/some-lib > nested-lib.js?v=deadbeef".to_string()));
    }
}
