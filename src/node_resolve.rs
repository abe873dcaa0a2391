//! Bare-import resolution (`tryNodeResolve`).

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use regex::Regex;

use crate::{
    cache::Cache,
    error::ResolveError,
    file_system::FileSystem,
    options::ResolveOptions,
    package_json::{resolve_deep_import, resolve_package_entry, PackageJson},
    specifier::split_file_and_postfix,
};

/// Outcome of a successful bare-import resolution, before the dispatch
/// orchestrator applies externalization/optimizer post-processing.
pub struct NodeResolveResult {
    pub id: String,
    pub module_side_effects: Option<bool>,
}

fn optimizable_entry_re() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.(?:[cm]?js|jsx|[cm]?ts|tsx)$").unwrap())
}

/// `is_js_type` per §4.7's "Post-processing" paragraph: only js/ts-family
/// files are candidates for dependency pre-bundling.
#[must_use]
pub fn is_js_type(resolved: &str) -> bool {
    optimizable_entry_re().is_match(resolved.split(['?', '#']).next().unwrap_or(resolved))
}

/// Split `nested_path` into `possiblePkgIds`, longest-last: each
/// `/`-separated prefix, after the first segment skipping
/// parts that carry a filename extension, never splitting a `@scope/name`
/// pair apart.
#[must_use]
pub fn possible_package_ids(nested_path: &str) -> Vec<String> {
    let parts: Vec<&str> = nested_path.split('/').collect();
    let mut ids = Vec::new();
    let mut p = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            p = (*part).to_string();
            if !(p.starts_with('@') && parts.len() > 1) {
                ids.push(p.clone());
                if part.contains('.') {
                    break;
                }
            }
            continue;
        }
        if i == 1 && parts[0].starts_with('@') {
            p = format!("{p}/{part}");
            ids.push(p.clone());
            if part.contains('.') {
                break;
            }
            continue;
        }
        if part.contains('.') {
            break;
        }
        p = format!("{p}/{part}");
        ids.push(p.clone());
    }
    ids
}

/// `A > B > C` nested-selection split: `(nestedRoot, nestedPath)`.
#[must_use]
pub fn split_nested_selector(specifier: &str) -> (&str, &str) {
    specifier.rsplit_once('>').map_or(("", specifier.trim()), |(root, leaf)| {
        (root.trim(), leaf.trim())
    })
}

/// `tryNodeResolve`, through package/subpath selection. Post processing
/// (externalize / optimizer hand-off / version injection) is the dispatch
/// orchestrator's job, since it needs optimizer and ssr context.
pub async fn try_node_resolve<Fs: FileSystem>(
    cache: &Cache<Fs>,
    options: &ResolveOptions,
    specifier: &str,
    importer: Option<&Path>,
    target_web: bool,
) -> Result<Option<NodeResolveResult>, ResolveError> {
    let (nested_root, nested_path) = split_nested_selector(specifier);
    let possible_ids = possible_package_ids(nested_path);
    if possible_ids.is_empty() {
        return Ok(None);
    }

    let mut basedir = if possible_ids.iter().any(|id| options.dedupe.iter().any(|d| d == id)) {
        PathBuf::from(&options.root)
    } else if let Some(importer) = importer {
        resolve_importer_basedir(cache, options, importer).await
    } else {
        PathBuf::from(&options.root)
    };

    if !nested_root.is_empty() {
        if let Some(token) = possible_package_ids(nested_root).last() {
            if let Some(pkg) = cache.resolve_package_data(token, &basedir).await? {
                basedir = pkg.directory().to_path_buf();
            }
        }
    }

    let mut matched: Option<(String, Arc<PackageJson>)> = None;
    for pkg_id in possible_ids.iter().rev() {
        if let Some(pkg) = cache.resolve_package_data(pkg_id, &basedir).await? {
            matched = Some((pkg_id.clone(), pkg));
            break;
        }
    }

    let Some((pkg_id, pkg)) = matched else {
        if options.try_esm_only {
            return try_node_resolve_esm_only(cache, options, nested_path, &basedir, target_web).await;
        }
        return Ok(None);
    };

    let resolved = if pkg_id == nested_path {
        resolve_package_entry(cache, &pkg, target_web, options).await.map(|p| p.to_string_lossy().into_owned())
    } else {
        let subpath = format!(".{}", &nested_path[pkg_id.len()..]);
        resolve_deep_import(cache, &subpath, &pkg, target_web, options).await
    };

    match resolved {
        Ok(id) => {
            cache.record_id_to_pkg(PathBuf::from(&id.split(['?', '#']).next().unwrap_or(&id)), Arc::clone(&pkg));
            let module_side_effects =
                pkg.side_effects.as_ref().map(|_| pkg.has_side_effects(Path::new(&id)));
            Ok(Some(NodeResolveResult { id, module_side_effects }))
        }
        Err(err) => {
            if options.try_esm_only {
                return try_node_resolve_esm_only(cache, options, nested_path, &basedir, target_web).await;
            }
            Err(err)
        }
    }
}

/// Picks the basedir for a bare-import resolution from the importer's
/// location, per the importer-must-exist rule: a query/hash-stripped
/// importer that doesn't actually exist on disk (a virtual module id, for
/// instance) falls back to `options.root` rather than anchoring on a
/// directory that was never real.
async fn resolve_importer_basedir<Fs: FileSystem>(
    cache: &Cache<Fs>,
    options: &ResolveOptions,
    importer: &Path,
) -> PathBuf {
    if !importer.is_absolute() {
        return PathBuf::from(&options.root);
    }
    let importer_str = importer.to_string_lossy();
    let (file, _) = split_file_and_postfix(&importer_str);
    let file = PathBuf::from(file);
    if cache.is_file(&file).await || cache.is_dir(&file).await {
        file.parent().map_or_else(|| PathBuf::from(&options.root), Path::to_path_buf)
    } else {
        PathBuf::from(&options.root)
    }
}

async fn try_node_resolve_esm_only<Fs: FileSystem>(
    cache: &Cache<Fs>,
    options: &ResolveOptions,
    nested_path: &str,
    basedir: &Path,
    target_web: bool,
) -> Result<Option<NodeResolveResult>, ResolveError> {
    let esm_options = ResolveOptions {
        is_require: false,
        main_fields: ResolveOptions::default().main_fields,
        extensions: ResolveOptions::default().extensions,
        try_esm_only: false,
        ..options.clone()
    };
    let possible_ids = possible_package_ids(nested_path);
    for pkg_id in possible_ids.iter().rev() {
        if let Some(pkg) = cache.resolve_package_data(pkg_id, basedir).await? {
            let resolved = if *pkg_id == *nested_path {
                resolve_package_entry(cache, &pkg, target_web, &esm_options)
                    .await
                    .map(|p| p.to_string_lossy().into_owned())
            } else {
                let subpath = format!(".{}", &nested_path[pkg_id.len()..]);
                resolve_deep_import(cache, &subpath, &pkg, target_web, &esm_options).await
            };
            if let Ok(id) = resolved {
                let module_side_effects =
                    pkg.side_effects.as_ref().map(|_| pkg.has_side_effects(Path::new(&id)));
                return Ok(Some(NodeResolveResult { id, module_side_effects }));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn possible_ids_scoped() {
        assert_eq!(possible_package_ids("@scope/a/b/c.js"), vec!["@scope/a", "@scope/a/b"]);
    }

    #[test]
    fn possible_ids_plain() {
        assert_eq!(possible_package_ids("a/b/c.js"), vec!["a", "a/b"]);
    }

    #[test]
    fn possible_ids_dotted_segment() {
        assert_eq!(possible_package_ids("a.b/c"), vec!["a.b"]);
    }

    #[test]
    fn nested_selector_split() {
        assert_eq!(split_nested_selector("a > b > c"), ("a > b", "c"));
        assert_eq!(split_nested_selector("lodash"), ("", "lodash"));
    }

    #[test]
    fn js_type_detection() {
        assert!(is_js_type("/p/index.js"));
        assert!(is_js_type("/p/index.mjs?v=abc"));
        assert!(!is_js_type("/p/styles.css"));
    }

    use crate::tests::memory_fs::MemoryFS;

    #[tokio::test]
    async fn importer_basedir_uses_existing_importer_parent() {
        let fs = MemoryFS::new(&[("/p/src/app.js", "")]);
        let cache = Cache::new(fs);
        let options = ResolveOptions::default().with_root("/p");
        let basedir =
            resolve_importer_basedir(&cache, &options, Path::new("/p/src/app.js?raw")).await;
        assert_eq!(basedir, PathBuf::from("/p/src"));
    }

    #[tokio::test]
    async fn importer_basedir_falls_back_to_root_for_virtual_importer() {
        let fs = MemoryFS::new(&[]);
        let cache = Cache::new(fs);
        let options = ResolveOptions::default().with_root("/p");
        let basedir =
            resolve_importer_basedir(&cache, &options, Path::new("/p/virtual:component")).await;
        assert_eq!(basedir, PathBuf::from("/p"));
    }
}
