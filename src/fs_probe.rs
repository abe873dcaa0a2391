//! Filesystem probing (`tryFsResolve`/`tryResolveFile`).

use std::path::{Path, PathBuf};

use crate::{
    cache::Cache,
    file_system::FileSystem,
    options::ResolveOptions,
    package_json::resolve_package_entry,
    specifier::split_file_and_postfix,
};

/// `tryFsResolve(fsPath, options, tryIndex, targetWeb)`.
///
/// Returns the resolved id (an absolute path with `postfix` re-attached), or
/// `None` if nothing on disk satisfies `fs_path` under any of the five probe
/// strategies.
pub async fn try_fs_resolve<Fs: FileSystem>(
    cache: &Cache<Fs>,
    options: &ResolveOptions,
    fs_path: &str,
    try_index: bool,
    target_web: bool,
) -> Result<Option<String>, crate::error::ResolveError> {
    let (file, postfix) = split_file_and_postfix(fs_path);

    // 1. The postfix might actually be part of the filename (issue #4703).
    if !postfix.is_empty() {
        if let Some(path) =
            try_resolve_file(cache, options, Path::new(fs_path), false, target_web).await?
        {
            return Ok(Some(path.to_string_lossy().into_owned()));
        }
    }

    // 2. Try `file` as a plain file, no directory index.
    if let Some(path) =
        try_resolve_file(cache, options, Path::new(file), false, target_web).await?
    {
        return Ok(Some(format!("{}{postfix}", path.display())));
    }

    // 3. Try every configured extension.
    for ext in &options.extensions {
        if !postfix.is_empty() {
            let candidate = format!("{fs_path}{ext}");
            if let Some(path) =
                try_resolve_file(cache, options, Path::new(&candidate), false, target_web).await?
            {
                return Ok(Some(path.to_string_lossy().into_owned()));
            }
        }
        let candidate = format!("{file}{ext}");
        if let Some(path) =
            try_resolve_file(cache, options, Path::new(&candidate), false, target_web).await?
        {
            return Ok(Some(format!("{}{postfix}", path.display())));
        }
    }

    // 4. Retry the literal path, this time allowing directory-index behavior.
    if !postfix.is_empty() {
        if let Some(path) =
            try_resolve_file(cache, options, Path::new(fs_path), try_index, target_web).await?
        {
            return Ok(Some(path.to_string_lossy().into_owned()));
        }
    }

    // 5. Try `file` allowing directory-index behavior.
    if let Some(path) =
        try_resolve_file(cache, options, Path::new(file), try_index, target_web).await?
    {
        return Ok(Some(format!("{}{postfix}", path.display())));
    }

    Ok(None)
}

fn ts_extension_candidates(ext: &str) -> &'static [&'static str] {
    match ext {
        "js" => &["ts", "tsx"],
        "jsx" => &["tsx"],
        "mjs" => &["mts"],
        "cjs" => &["cts"],
        _ => &[],
    }
}

/// `tryResolveFile(file, options, tryIndex, targetWeb)`, the recursive core
/// of the probe: returns an absolute, `realpath`-resolved path (postfix is
/// the caller's responsibility to reattach).
async fn try_resolve_file<Fs: FileSystem>(
    cache: &Cache<Fs>,
    options: &ResolveOptions,
    file: &Path,
    try_index: bool,
    target_web: bool,
) -> Result<Option<PathBuf>, crate::error::ResolveError> {
    if cache.is_file(file).await {
        return Ok(Some(cache.realpath(file, options.preserve_symlinks).await));
    }

    if try_index && cache.is_dir(file).await {
        if !options.skip_package_json {
            let manifest = file.join("package.json");
            if let Some(pkg) = cache.load_package_data(&manifest).await? {
                let entry =
                    Box::pin(resolve_package_entry(cache, &pkg, target_web, options)).await?;
                cache.record_id_to_pkg(entry.clone(), pkg);
                return Ok(Some(entry));
            }
        }
        let index = file.join("index");
        return Box::pin(try_fs_resolve_path(cache, options, &index, target_web)).await;
    }

    if options.is_from_ts_importer {
        if let Some(ext) = file.extension().and_then(|e| e.to_str()) {
            let candidates = ts_extension_candidates(ext);
            if !candidates.is_empty() {
                for candidate_ext in candidates {
                    let candidate = file.with_extension(candidate_ext);
                    if cache.is_file(&candidate).await {
                        return Ok(Some(
                            cache.realpath(&candidate, options.preserve_symlinks).await,
                        ));
                    }
                }
                // Do NOT fall through to the prefix retry.
                return Ok(None);
            }
        }
    }

    if let Some(prefix) = &options.try_prefix {
        let dirname = file.parent().unwrap_or_else(|| Path::new(""));
        let basename = file.file_name().map_or_else(String::new, |s| s.to_string_lossy().into_owned());
        let prefixed = dirname.join(format!("{prefix}{basename}"));
        return Box::pin(try_resolve_file_no_prefix(cache, options, &prefixed, try_index, target_web))
            .await;
    }

    Ok(None)
}

/// Re-probes `path` through the extension/index machinery (used when
/// `file/index` needs the same treatment as a fresh `fsPath`).
async fn try_fs_resolve_path<Fs: FileSystem>(
    cache: &Cache<Fs>,
    options: &ResolveOptions,
    path: &Path,
    target_web: bool,
) -> Result<Option<PathBuf>, crate::error::ResolveError> {
    let path_str = path.to_string_lossy();
    let resolved = try_fs_resolve(cache, options, &path_str, true, target_web).await?;
    Ok(resolved.map(PathBuf::from))
}

/// Like [`try_resolve_file`] but never retries with `tryPrefix` again
/// (the prefix retry itself must not recurse into another prefix retry).
async fn try_resolve_file_no_prefix<Fs: FileSystem>(
    cache: &Cache<Fs>,
    options: &ResolveOptions,
    file: &Path,
    try_index: bool,
    target_web: bool,
) -> Result<Option<PathBuf>, crate::error::ResolveError> {
    if cache.is_file(file).await {
        return Ok(Some(cache.realpath(file, options.preserve_symlinks).await));
    }
    if try_index && cache.is_dir(file).await {
        if !options.skip_package_json {
            let manifest = file.join("package.json");
            if let Some(pkg) = cache.load_package_data(&manifest).await? {
                let entry =
                    Box::pin(resolve_package_entry(cache, &pkg, target_web, options)).await?;
                cache.record_id_to_pkg(entry.clone(), pkg);
                return Ok(Some(entry));
            }
        }
        let index = file.join("index");
        return Box::pin(try_fs_resolve_path(cache, options, &index, target_web)).await;
    }
    Ok(None)
}
