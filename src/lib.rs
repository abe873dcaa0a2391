//! # Resolver
//!
//! Module specifier resolution for a JavaScript/TypeScript build and
//! dev-server pipeline.
//!
//! A resolution is the process of finding the concrete on-disk file (or
//! external/optimized-dep identifier) referenced by a module specifier
//! appearing in `import "specifier"` inside some importing file.
//!
//! ## Terminology
//!
//! ### Specifier
//!
//! The string after the `from` keyword in an `import` statement, e.g.
//! `'specifier'` in `import 'specifier'` or `import { x } from 'specifier'`.
//! Also used as the argument to a dynamic `import()` expression. Sometimes
//! called "request".
//!
//! ### Importer
//!
//! The absolute path of the file containing the specifier, when known.
//!
//! ## References
//!
//! * The `exports`/`imports` target algorithm is adapted from Node.js'
//!   [ECMAScript Module Resolution Algorithm].
//! * The dispatch precedence and browser-field heuristics are adapted from
//!   the module resolution pipeline of a Vite-style dev server.
//!
//! [ECMAScript Module Resolution Algorithm]: https://nodejs.org/api/esm.html#resolution-algorithm-specification

mod builtins;
mod cache;
mod error;
mod file_system;
mod fs_probe;
mod node_resolve;
mod optimizer;
mod options;
mod package_json;
mod path;
mod resolution;
mod specifier;

#[cfg(test)]
mod tests;

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

pub use crate::{
    builtins::{is_builtin, NODEJS_BUILTINS},
    error::ResolveError,
    file_system::{FileMetadata, FileSystem, FileSystemOs},
    optimizer::{DepInfo, DepsOptimizer, OptimizerMetadata},
    options::ResolveOptions,
    package_json::PackageJson,
    resolution::ResolutionResult,
    specifier::{SpecifierKind, BROWSER_EXTERNAL_ID, COMMONJS_HELPERS_ID, FS_PREFIX},
};

use crate::{
    cache::Cache,
    fs_probe::try_fs_resolve,
    node_resolve::{is_js_type, try_node_resolve},
    optimizer::try_optimized_resolve,
    path::PathUtil,
};

/// Resolver using the host's real filesystem.
pub type Resolver = ResolverGeneric<FileSystemOs>;

/// Generic resolver, parameterized over the [`FileSystem`] implementation so
/// tests can run against an in-memory filesystem.
pub struct ResolverGeneric<Fs> {
    options: ResolveOptions,
    cache: Arc<Cache<Fs>>,
}

impl<Fs> fmt::Debug for ResolverGeneric<Fs> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.options.fmt(f)
    }
}

impl<Fs: Send + Sync + FileSystem + Default> Default for ResolverGeneric<Fs> {
    fn default() -> Self {
        Self::new(ResolveOptions::default())
    }
}

impl<Fs: Send + Sync + FileSystem + Default> ResolverGeneric<Fs> {
    #[must_use]
    pub fn new(options: ResolveOptions) -> Self {
        Self { options, cache: Arc::new(Cache::new(Fs::default())) }
    }
}

impl<Fs: FileSystem + Send + Sync> ResolverGeneric<Fs> {
    #[must_use]
    pub fn new_with_file_system(file_system: Fs, options: ResolveOptions) -> Self {
        Self { options, cache: Arc::new(Cache::new(file_system)) }
    }

    /// Clone this resolver with different options, sharing the same
    /// underlying caches.
    #[must_use]
    pub fn clone_with_options(&self, options: ResolveOptions) -> Self {
        Self { options, cache: Arc::clone(&self.cache) }
    }

    #[must_use]
    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    /// Drop every cache entry accumulated so far.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// `resolveId(specifier, importer, resolveOpts)`.
    ///
    /// `importer` is the absolute path of the file containing `specifier`,
    /// when known.
    ///
    /// # Errors
    ///
    /// See [`ResolveError`]; non-fatal mismatches are reported as
    /// [`ResolutionResult::Skip`] rather than an `Err`.
    pub async fn resolve_id(
        &self,
        specifier: &str,
        importer: Option<&str>,
    ) -> Result<ResolutionResult, ResolveError> {
        let span = tracing::debug_span!("resolve_id", specifier, importer);
        let _enter = span.enter();
        let result = self.resolve_id_impl(specifier, importer).await;
        match &result {
            Ok(r) => tracing::debug!(options = ?self.options, ret = ?r),
            Err(err) => tracing::debug!(options = ?self.options, err = ?err),
        }
        result
    }

    async fn resolve_id_impl(
        &self,
        specifier: &str,
        importer: Option<&str>,
    ) -> Result<ResolutionResult, ResolveError> {
        let options = &self.options;
        let target_web = !options.ssr || options.ssr_target;
        let importer_path = importer.map(Path::new);

        // 1. Browser-external marker passes through unchanged.
        if matches!(
            specifier::classify(specifier, options.as_src),
            SpecifierKind::BrowserExternal
        ) {
            return Ok(ResolutionResult::Id(specifier.to_string()));
        }

        // 2. CommonJS interop proxy: defer to another plugin.
        if matches!(specifier::classify(specifier, options.as_src), SpecifierKind::CommonJsProxy) {
            return Ok(ResolutionResult::Skip);
        }

        let kind = specifier::classify(specifier, options.as_src);

        // 4. Optimized-dep url normalization.
        if options.as_src {
            if let Some(optimizer) = &options.deps_optimizer {
                if optimizer.is_optimized_dep_url(specifier) {
                    let normalized = specifier.strip_prefix(FS_PREFIX).map_or_else(
                        || Path::new(&options.root).normalize_with(specifier.trim_start_matches('/')),
                        |rest| Path::new("/").normalize_with(rest),
                    );
                    return Ok(ResolutionResult::Id(normalized.to_string_lossy().into_owned()));
                }
            }
        }

        // 5. Explicit filesystem escape.
        if options.as_src && matches!(kind, SpecifierKind::FsEscape) {
            let stripped = specifier.strip_prefix(FS_PREFIX).unwrap_or(specifier);
            let fs_path = format!("/{stripped}");
            let resolved = try_fs_resolve(&self.cache, options, &fs_path, true, target_web).await?;
            return Ok(ResolutionResult::Id(resolved.unwrap_or(fs_path)));
        }

        // 6. Root-absolute url.
        if options.as_src && matches!(kind, SpecifierKind::RootUrl) {
            let fs_path = Path::new(&options.root)
                .normalize_with(specifier.trim_start_matches(crate::path::SLASH_START));
            if let Some(resolved) =
                try_fs_resolve(&self.cache, options, &fs_path.to_string_lossy(), true, target_web)
                    .await?
            {
                return Ok(ResolutionResult::Id(resolved));
            }
        }

        // 7. Relative specifier (or preferRelative / HTML-importer shortcut).
        let is_html_importer = importer_path.is_some_and(|p| p.extension().is_some_and(|e| e == "html"));
        let prefer_relative_hit = options.prefer_relative
            && specifier.as_bytes().first().is_some_and(u8::is_ascii_alphanumeric);
        if matches!(kind, SpecifierKind::Relative) || prefer_relative_hit || is_html_importer {
            let basedir = importer_path
                .and_then(Path::parent).map_or_else(|| PathBuf::from(&options.root), Path::to_path_buf);
            let fs_path = basedir.normalize_with(specifier);

            if let Some(optimizer) = &options.deps_optimizer {
                if optimizer.is_optimized_dep_file(&fs_path) {
                    let fs_path_str = fs_path.to_string_lossy().into_owned();
                    if !fs_path_str.contains("v=") {
                        let metadata = optimizer.metadata(options.ssr);
                        return Ok(ResolutionResult::Id(format!(
                            "{fs_path_str}?v={}",
                            metadata.browser_hash
                        )));
                    }
                    return Ok(ResolutionResult::Id(fs_path_str));
                }
            }

            let node_modules_dir = basedir.join(path::NODE_MODULES);
            if let Ok(tail) = fs_path.strip_prefix(&node_modules_dir) {
                let tail = tail.to_string_lossy().into_owned();
                if let Some(result) =
                    try_node_resolve(&self.cache, options, &tail, importer_path, target_web).await?
                {
                    if result.id.starts_with(fs_path.to_string_lossy().as_ref()) {
                        return Ok(ResolutionResult::resolved(result.id)
                            .with_module_side_effects(result.module_side_effects));
                    }
                }
            }

            if target_web {
                if let Some(pkg) = self.cache.find_nearest_package(&fs_path).await? {
                    if let Some(serde_json::Value::Object(map)) = pkg.browser() {
                        let rel = path::to_posix(
                            &fs_path
                                .strip_prefix(pkg.directory())
                                .unwrap_or(&fs_path)
                                .to_string_lossy(),
                        )
                        .into_owned();
                        let rel = format!("./{rel}");
                        if let Some(mapped) = package_json::map_with_browser_field(map, &rel) {
                            if let serde_json::Value::String(s) = mapped {
                                return Ok(ResolutionResult::Id(
                                    pkg.directory().normalize_with(s).to_string_lossy().into_owned(),
                                ));
                            }
                            if matches!(mapped, serde_json::Value::Bool(false)) {
                                return Ok(ResolutionResult::external(BROWSER_EXTERNAL_ID));
                            }
                        }
                    }
                }
            }

            if let Some(resolved) =
                try_fs_resolve(&self.cache, options, &fs_path.to_string_lossy(), true, target_web)
                    .await?
            {
                let module_side_effects = importer_path.and_then(|importer| {
                    self.cache
                        .lookup_pkg_for_id(importer)
                        .map(|pkg| pkg.has_side_effects(Path::new(&resolved)))
                });
                return Ok(ResolutionResult::resolved(resolved)
                    .with_module_side_effects(module_side_effects));
            }
        }

        // 8. Absolute filesystem path.
        if matches!(kind, SpecifierKind::Absolute) {
            if let Some(resolved) =
                try_fs_resolve(&self.cache, options, specifier, true, target_web).await?
            {
                return Ok(ResolutionResult::Id(resolved));
            }
        }

        // 9. External url (has a scheme).
        if matches!(kind, SpecifierKind::ExternalUrl) {
            return Ok(ResolutionResult::external(specifier.to_string()));
        }

        // 10. `data:` url.
        if matches!(kind, SpecifierKind::DataUrl) {
            return Ok(ResolutionResult::Skip);
        }

        // 11. Bare import.
        if matches!(kind, SpecifierKind::Bare) {
            if let Some(predicate) = &options.should_externalize {
                if predicate(specifier) {
                    return Ok(ResolutionResult::external(specifier.to_string()));
                }
            }

            if options.as_src && !options.scan {
                if let Some(optimizer) = &options.deps_optimizer {
                    let resolve_from = |_: &str, _: Option<&Path>| -> Option<PathBuf> { None };
                    if let Some(id) = try_optimized_resolve(
                        optimizer.as_ref(),
                        options.ssr,
                        specifier,
                        resolve_from,
                        importer_path,
                    )
                    .await
                    {
                        return Ok(ResolutionResult::Id(id));
                    }
                }
            }

            if target_web {
                if let Some(importer) = importer_path {
                    if let Some(pkg) = self.cache.find_nearest_package(importer).await? {
                        if let Some(serde_json::Value::Object(map)) = pkg.browser() {
                            if let Some(mapped) = package_json::map_with_browser_field(map, specifier) {
                                match mapped {
                                    serde_json::Value::Bool(false) => {
                                        return Ok(ResolutionResult::external(BROWSER_EXTERNAL_ID))
                                    }
                                    serde_json::Value::String(s) => {
                                        let remapped = pkg.directory().normalize_with(&s);
                                        if let Some(resolved) = try_fs_resolve(
                                            &self.cache,
                                            options,
                                            &remapped.to_string_lossy(),
                                            true,
                                            target_web,
                                        )
                                        .await?
                                        {
                                            return Ok(ResolutionResult::Id(resolved));
                                        }
                                    }
                                    _ => {}
                                }
                            }
                        }
                    }
                }
            }

            if let Some(result) =
                try_node_resolve(&self.cache, options, specifier, importer_path, target_web).await?
            {
                return Ok(self.post_process_node_resolve(specifier, result, importer_path).await);
            }

            if is_builtin(specifier) {
                if options.ssr {
                    if options.ssr_no_external {
                        return Err(ResolveError::SsrBuiltinForbidden(
                            specifier.to_string(),
                            importer.unwrap_or_default().to_string(),
                        ));
                    }
                    return Ok(ResolutionResult::external(specifier.to_string()));
                }
                let sentinel = if options.scan {
                    BROWSER_EXTERNAL_ID.to_string()
                } else {
                    format!("{BROWSER_EXTERNAL_ID}:{specifier}")
                };
                return Ok(ResolutionResult::external(sentinel));
            }
        }

        // 12. Fall through.
        Ok(ResolutionResult::Skip)
    }

    /// §4.7 "Post-processing": externalize / optimizer hand-off / version
    /// injection for a successful `tryNodeResolve` match.
    async fn post_process_node_resolve(
        &self,
        original_specifier: &str,
        result: node_resolve::NodeResolveResult,
        importer: Option<&Path>,
    ) -> ResolutionResult {
        let options = &self.options;
        let resolved = result.id;
        let module_side_effects = result.module_side_effects;

        let node_modules_marker = path::NODE_MODULES.trim_end_matches('/');
        let under_node_modules =
            resolved.split(['/', '\\']).any(|segment| segment == node_modules_marker);

        let Some(optimizer) = &options.deps_optimizer else {
            return ResolutionResult::resolved(resolved).with_module_side_effects(module_side_effects);
        };

        if !under_node_modules || options.scan {
            return ResolutionResult::resolved(resolved).with_module_side_effects(module_side_effects);
        }

        let importer_in_node_modules = importer.is_some_and(|importer| {
            importer.to_string_lossy().split(['/', '\\']).any(|s| s == node_modules_marker)
        });
        let excluded = optimizer.excluded().iter().any(|id| original_specifier.starts_with(id.as_str()));
        let has_special_query = resolved.contains('?') && !resolved.contains("v=");

        if !is_js_type(&resolved) || importer_in_node_modules || excluded || has_special_query {
            if is_js_type(&resolved) && !resolved.contains('?') {
                let metadata = optimizer.metadata(options.ssr);
                return ResolutionResult::resolved(format!("{resolved}?v={}", metadata.browser_hash))
                    .with_module_side_effects(module_side_effects);
            }
            return ResolutionResult::resolved(resolved).with_module_side_effects(module_side_effects);
        }

        let resolved_path = PathBuf::from(&resolved);
        let info = optimizer.register_missing_import(original_specifier, &resolved_path, options.ssr).await;
        ResolutionResult::resolved(optimizer.get_optimized_dep_id(&info))
            .with_module_side_effects(module_side_effects)
    }
}
