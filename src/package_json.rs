//! `package.json` loading and the pure (filesystem-free) parts of package
//! resolution: the `exports`/`imports` target algorithm and the `browser`
//! field object mapper.

use std::{
    cmp::Ordering,
    path::{Path, PathBuf},
};

use dashmap::DashMap;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::{
    cache::Cache,
    error::ResolveError,
    file_system::FileSystem,
    fs_probe::try_fs_resolve,
    options::ResolveOptions,
    path::{to_posix, PathUtil},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ModuleType {
    #[default]
    CommonJs,
    Module,
}

impl From<Option<&str>> for ModuleType {
    fn from(value: Option<&str>) -> Self {
        match value {
            Some("module") => Self::Module,
            _ => Self::CommonJs,
        }
    }
}

/// The `sideEffects` field (<https://webpack.js.org/guides/tree-shaking>).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffects {
    Bool(bool),
    Array(Vec<String>),
}

impl From<&Value> for SideEffects {
    fn from(value: &Value) -> Self {
        match value {
            Value::Array(items) => Self::Array(
                items.iter().filter_map(|v| v.as_str().map(ToString::to_string)).collect(),
            ),
            Value::Bool(b) => Self::Bool(*b),
            // Anything else (a truthy string, for instance) is treated the
            // way bundlers treat an unrecognized shape: has side effects.
            _ => Self::Bool(true),
        }
    }
}

/// A parsed `package.json`, plus the per-package memoization caches needed
/// for `resolvePackageEntry`/`resolveDeepImport`.
pub struct PackageJson {
    /// Path to `package.json` itself.
    pub path: PathBuf,
    pub name: Option<String>,
    pub r#type: ModuleType,
    pub main: Option<String>,
    pub side_effects: Option<SideEffects>,
    json: Value,

    /// Keyed by `(subpath, targetWeb)`; `subpath` is `"."` for the package
    /// entry point itself. Insert-only for the package's lifetime.
    resolved_cache: DashMap<(String, bool), Result<PathBuf, ResolveError>>,
}

impl std::fmt::Debug for PackageJson {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageJson")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("type", &self.r#type)
            .finish_non_exhaustive()
    }
}

impl PackageJson {
    /// # Errors
    /// Returns [`ResolveError::Json`] when `content` is not valid JSON.
    pub fn parse(path: PathBuf, content: &str) -> Result<Self, ResolveError> {
        let json: Value = serde_json::from_str(content)
            .map_err(|err| ResolveError::Json(path.clone(), err.to_string()))?;

        let name = json.get("name").and_then(Value::as_str).map(ToString::to_string);
        let r#type = ModuleType::from(json.get("type").and_then(Value::as_str));
        let main = json.get("main").and_then(Value::as_str).map(ToString::to_string);
        let side_effects = json.get("sideEffects").map(SideEffects::from);

        Ok(Self { path, name, r#type, main, side_effects, json, resolved_cache: DashMap::new() })
    }

    /// Directory containing this `package.json`.
    ///
    /// # Panics
    /// When `path` doesn't end in a `package.json` filename.
    #[must_use]
    pub fn directory(&self) -> &Path {
        debug_assert!(self.path.file_name().is_some_and(|f| f == "package.json"));
        self.path.parent().unwrap()
    }

    #[must_use]
    pub fn exports(&self) -> Option<&Value> {
        self.json.get("exports")
    }

    #[must_use]
    pub fn browser(&self) -> Option<&Value> {
        self.json.get("browser")
    }

    #[must_use]
    pub fn main_fields<'a>(&'a self, main_fields: &'a [String]) -> impl Iterator<Item = &'a str> {
        main_fields.iter().filter_map(|field| self.json.get(field).and_then(Value::as_str))
    }

    /// `hasSideEffects(file)`: `true` unless `sideEffects` explicitly says
    /// otherwise for `file`, relative to the package directory.
    #[must_use]
    pub fn has_side_effects(&self, file: &Path) -> bool {
        match &self.side_effects {
            None => true,
            Some(SideEffects::Bool(b)) => *b,
            Some(SideEffects::Array(globs)) => {
                let Ok(rel) = file.strip_prefix(self.directory()) else { return true };
                let rel = to_posix(&rel.to_string_lossy()).into_owned();
                globs.iter().any(|pattern| glob_match(pattern, &rel))
            }
        }
    }

    #[must_use]
    pub fn get_resolved_cache(
        &self,
        key: &str,
        target_web: bool,
    ) -> Option<Result<PathBuf, ResolveError>> {
        self.resolved_cache.get(&(key.to_string(), target_web)).map(|entry| entry.clone())
    }

    pub fn set_resolved_cache(
        &self,
        key: &str,
        target_web: bool,
        value: Result<PathBuf, ResolveError>,
    ) {
        self.resolved_cache.insert((key.to_string(), target_web), value);
    }
}

/// A minimal glob: `*` matches any run of non-`/` characters, `**` matches
/// anything. Good enough for the path lists npm packages put in
/// `sideEffects`.
fn glob_match(pattern: &str, path: &str) -> bool {
    if pattern == path {
        return true;
    }
    if let Some(stripped) = pattern.strip_prefix("./") {
        return glob_match(stripped, path);
    }
    if !pattern.contains('*') {
        return false;
    }
    let regex = pattern
        .split("**")
        .map(|segment| regex::escape(segment).replace(r"\*", "[^/]*"))
        .collect::<Vec<_>>()
        .join(".*");
    regex::Regex::new(&format!("^{regex}$")).is_ok_and(|re| re.is_match(path))
}

/// The `exports`/`imports` target resolution algorithm (Node's
/// `PACKAGE_TARGET_RESOLVE` restricted to the subset this resolver needs:
/// targets are always relative, package-internal paths, never a
/// self-reference back through `PACKAGE_RESOLVE`).
pub fn resolve_exports_target(
    package_dir: &Path,
    exports: &Value,
    subpath: &str,
    conditions: &[String],
) -> Result<Option<PathBuf>, ResolveError> {
    match exports {
        Value::String(_) | Value::Array(_) => {
            // A package whose top-level `exports` is a string/array is
            // shorthand for `{ ".": exports }`.
            if subpath == "." {
                return target_resolve(package_dir, exports, None, conditions);
            }
            Ok(None)
        }
        Value::Object(map) => {
            // Shorthand form again, detected by the map having no
            // "."-or-"#"-prefixed keys (a conditions map, not a subpath map).
            if !map.keys().any(|k| k.starts_with('.')) {
                if subpath == "." {
                    return target_resolve(package_dir, exports, None, conditions);
                }
                return Ok(None);
            }
            imports_exports_resolve(subpath, map, package_dir, conditions)
        }
        Value::Null => Ok(None),
        _ => Ok(None),
    }
}

/// `PACKAGE_IMPORTS_EXPORTS_RESOLVE(matchKey, matchObj, packageURL, conditions)`.
fn imports_exports_resolve(
    match_key: &str,
    match_obj: &serde_json::Map<String, Value>,
    package_dir: &Path,
    conditions: &[String],
) -> Result<Option<PathBuf>, ResolveError> {
    if match_key.ends_with('/') {
        return Ok(None);
    }

    if !match_key.contains('*') {
        if let Some(target) = match_obj.get(match_key) {
            return target_resolve(package_dir, target, None, conditions);
        }
    }

    let mut best_key = "";
    let mut best_target = None;
    let mut best_match = "";
    for (expansion_key, target) in match_obj {
        if !(expansion_key.starts_with("./") || expansion_key == ".") {
            continue;
        }
        if let Some((pattern_base, pattern_trailer)) = expansion_key.split_once('*') {
            if match_key.starts_with(pattern_base)
                && !pattern_trailer.contains('*')
                && (pattern_trailer.is_empty()
                    || (match_key.len() >= expansion_key.len()
                        && match_key.ends_with(pattern_trailer)))
                && pattern_key_compare(best_key, expansion_key).is_gt()
            {
                best_target = Some(target);
                best_match = &match_key[pattern_base.len()..match_key.len() - pattern_trailer.len()];
                best_key = expansion_key;
            }
        }
    }

    if let Some(target) = best_target {
        return target_resolve(package_dir, target, Some(best_match), conditions);
    }
    Ok(None)
}

/// `PACKAGE_TARGET_RESOLVE(packageURL, target, patternMatch, conditions)`,
/// restricted to relative (`"./..."`) string targets, condition objects, and
/// arrays — the shapes this resolver's `exports` maps actually use.
fn target_resolve(
    package_dir: &Path,
    target: &Value,
    pattern_match: Option<&str>,
    conditions: &[String],
) -> Result<Option<PathBuf>, ResolveError> {
    match target {
        Value::String(target) => {
            if !target.starts_with("./") {
                return Ok(None);
            }
            let expanded = pattern_match
                .map_or_else(|| target.clone(), |m| target.replace('*', m));
            Ok(Some(package_dir.normalize_with(expanded)))
        }
        Value::Object(map) => {
            for (key, value) in map {
                if key == "default" || conditions.iter().any(|c| c == key) {
                    let resolved = target_resolve(package_dir, value, pattern_match, conditions)?;
                    if resolved.is_some() {
                        return Ok(resolved);
                    }
                }
            }
            Ok(None)
        }
        Value::Array(items) => {
            for item in items {
                if let Some(resolved) = target_resolve(package_dir, item, pattern_match, conditions)? {
                    return Ok(Some(resolved));
                }
            }
            Ok(None)
        }
        Value::Null => Ok(None),
        _ => Ok(None),
    }
}

/// `PATTERN_KEY_COMPARE`: longer, more specific pattern bases sort first.
fn pattern_key_compare(key_a: &str, key_b: &str) -> Ordering {
    if key_a.is_empty() {
        return Ordering::Greater;
    }
    if key_b.is_empty() {
        return Ordering::Less;
    }
    let base_length_a = key_a.find('*').map_or(key_a.len(), |i| i + 1);
    let base_length_b = key_b.find('*').map_or(key_b.len(), |i| i + 1);
    base_length_b.cmp(&base_length_a)
}

/// Browser-field object mapper. `path` must already be normalized to
/// forward slashes.
#[must_use]
pub fn map_with_browser_field(map: &serde_json::Map<String, Value>, path: &str) -> Option<Value> {
    for (key, value) in map {
        let key = to_posix(key);
        if *key == *path
            || key.strip_suffix(".js").is_some_and(|k| k == path)
            || key.strip_suffix("/index.js").is_some_and(|k| k == path)
        {
            return Some(value.clone());
        }
    }
    None
}

fn umd_heuristic_regexes() -> (&'static Regex, &'static Regex, &'static Regex) {
    static EXPORTS: OnceLock<Regex> = OnceLock::new();
    static MODULE: OnceLock<Regex> = OnceLock::new();
    static ASSIGN: OnceLock<Regex> = OnceLock::new();
    (
        EXPORTS.get_or_init(|| Regex::new(r"typeof exports\s*==").unwrap()),
        MODULE.get_or_init(|| Regex::new(r"typeof module\s*==").unwrap()),
        ASSIGN.get_or_init(|| Regex::new(r"module\.exports\s*=").unwrap()),
    )
}

/// Content-sniffs `content` (the candidate `browser` entry file) for the
/// UMD/CJS wrapper pattern, checked before preferring a browser build over
/// the sibling ESM `module` entry.
fn looks_like_umd_or_cjs(content: &str) -> bool {
    let (exports_re, module_re, assign_re) = umd_heuristic_regexes();
    (exports_re.is_match(content) && module_re.is_match(content)) || assign_re.is_match(content)
}

const DEFAULT_ENTRY_CANDIDATES: [&str; 3] = ["index.js", "index.json", "index.node"];

/// `resolvePackageEntry(id, pkg, targetWeb, options)`.
pub async fn resolve_package_entry<Fs: FileSystem>(
    cache: &Cache<Fs>,
    pkg: &PackageJson,
    target_web: bool,
    options: &ResolveOptions,
) -> Result<PathBuf, ResolveError> {
    if let Some(cached) = pkg.get_resolved_cache(".", target_web) {
        return cached;
    }

    let result = resolve_package_entry_uncached(cache, pkg, target_web, options).await;
    pkg.set_resolved_cache(".", target_web, result.clone());
    result
}

async fn resolve_package_entry_uncached<Fs: FileSystem>(
    cache: &Cache<Fs>,
    pkg: &PackageJson,
    target_web: bool,
    options: &ResolveOptions,
) -> Result<PathBuf, ResolveError> {
    let dir = pkg.directory();
    let mut skip_package_json = options.skip_package_json;
    let mut entry: Option<String> = None;

    if let Some(exports) = pkg.exports() {
        let conditions = options.export_conditions(target_web, options.dev);
        entry = resolve_exports_target(dir, exports, ".", &conditions)?
            .map(|path| path.to_string_lossy().into_owned());
    }

    if target_web && entry.as_deref().is_none_or(|e| e.ends_with(".mjs")) {
        let browser_entry = match pkg.browser() {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Object(map)) => {
                map.get(".").and_then(Value::as_str).map(ToString::to_string)
            }
            _ => None,
        };
        if let Some(browser_entry) = browser_entry {
            let module_field_names = ["module".to_string()];
            let module_field = pkg.main_fields(&module_field_names).next();
            let prefer_module = if let Some(module_field) = module_field {
                if module_field != browser_entry && !options.is_require {
                    let content = cache
                        .file_system()
                        .read_to_string(&dir.normalize_with(&browser_entry))
                        .await
                        .unwrap_or_default();
                    looks_like_umd_or_cjs(&content)
                } else {
                    false
                }
            } else {
                false
            };
            if !prefer_module {
                entry = Some(browser_entry);
            }
        }
    }

    if entry.is_none() {
        entry = pkg.main_fields(&options.main_fields).next().map(ToString::to_string);
    }
    if entry.is_none() {
        entry = pkg.main.clone();
    }

    if options.main_fields.first().is_some_and(|f| f == "sass") {
        if let Some(candidate) = &entry {
            let has_known_ext =
                options.extensions.iter().any(|ext| candidate.ends_with(ext.as_str()));
            if !has_known_ext {
                entry = None;
                skip_package_json = true;
            }
        }
    }

    let candidates: Vec<String> = match entry {
        Some(entry) => vec![entry],
        None => DEFAULT_ENTRY_CANDIDATES.iter().map(ToString::to_string).collect(),
    };

    let mut probe_options = options.clone();
    probe_options.skip_package_json = skip_package_json;
    probe_options.try_index = true;

    for candidate in &candidates {
        let mut candidate = candidate.clone();
        if target_web {
            if let Some(Value::Object(map)) = pkg.browser() {
                let rel = to_posix(&candidate).into_owned();
                let rel = if rel.starts_with("./") { rel } else { format!("./{rel}") };
                if let Some(mapped) = map_with_browser_field(map, &rel) {
                    if let Some(s) = mapped.as_str() {
                        candidate = s.to_string();
                    }
                }
            }
        }
        let fs_path = dir.normalize_with(&candidate);
        if let Some(resolved) =
            try_fs_resolve(cache, &probe_options, &fs_path.to_string_lossy(), true, target_web)
                .await?
        {
            return Ok(PathBuf::from(resolved));
        }
    }

    Err(ResolveError::EntryResolutionFailed(
        pkg.name.clone().unwrap_or_else(|| dir.display().to_string()),
        None,
    ))
}

/// `resolveDeepImport("." + subpath, pkg, targetWeb, options)`.
pub async fn resolve_deep_import<Fs: FileSystem>(
    cache: &Cache<Fs>,
    subpath: &str,
    pkg: &PackageJson,
    target_web: bool,
    options: &ResolveOptions,
) -> Result<String, ResolveError> {
    if let Some(cached) = pkg.get_resolved_cache(subpath, target_web) {
        return cached.map(|p| p.to_string_lossy().into_owned());
    }

    let result = resolve_deep_import_uncached(cache, subpath, pkg, target_web, options).await;
    pkg.set_resolved_cache(
        subpath,
        target_web,
        result.clone().map(PathBuf::from),
    );
    result
}

async fn resolve_deep_import_uncached<Fs: FileSystem>(
    cache: &Cache<Fs>,
    subpath: &str,
    pkg: &PackageJson,
    target_web: bool,
    options: &ResolveOptions,
) -> Result<String, ResolveError> {
    use crate::specifier::split_file_and_postfix;

    let (file, postfix) = split_file_and_postfix(subpath);
    let dir = pkg.directory();
    let has_exports = pkg.exports().is_some();

    let mut relative_id = file.to_string();

    if let Some(exports) = pkg.exports() {
        if matches!(exports, Value::Object(_)) {
            let conditions = options.export_conditions(target_web, options.dev);
            match resolve_exports_target(dir, exports, file, &conditions)? {
                Some(path) => relative_id = path.to_string_lossy().into_owned(),
                None => {
                    return Err(ResolveError::SubpathNotExported(
                        file.to_string(),
                        pkg.path.clone(),
                    ))
                }
            }
        } else {
            return Err(ResolveError::SubpathNotExported(file.to_string(), pkg.path.clone()));
        }
    } else if target_web {
        if let Some(Value::Object(map)) = pkg.browser() {
            let rel = to_posix(file).into_owned();
            if let Some(mapped) = map_with_browser_field(map, &rel) {
                match mapped {
                    Value::Bool(false) => {
                        return Ok(format!(
                            "{}{postfix}",
                            crate::specifier::BROWSER_EXTERNAL_ID
                        ))
                    }
                    Value::String(s) => relative_id = s,
                    _ => {}
                }
            }
        }
    }

    let fs_path = if has_exports {
        relative_id.clone()
    } else {
        dir.normalize_with(&relative_id).to_string_lossy().into_owned()
    };
    let fs_path = if Path::new(&relative_id).is_absolute() { relative_id } else { fs_path };

    let mut probe_options = options.clone();
    probe_options.try_index = !has_exports;

    match try_fs_resolve(cache, &probe_options, &fs_path, !has_exports, target_web).await? {
        Some(resolved) => Ok(format!("{resolved}{postfix}")),
        None => Err(ResolveError::SubpathNotExported(file.to_string(), pkg.path.clone())),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_basic_fields() {
        let pkg = PackageJson::parse(
            PathBuf::from("/p/package.json"),
            r#"{"name":"pkg","type":"module","main":"index.js","sideEffects":false}"#,
        )
        .unwrap();
        assert_eq!(pkg.name.as_deref(), Some("pkg"));
        assert_eq!(pkg.r#type, ModuleType::Module);
        assert_eq!(pkg.main.as_deref(), Some("index.js"));
        assert!(!pkg.has_side_effects(Path::new("/p/anything.js")));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let err = PackageJson::parse(PathBuf::from("/p/package.json"), "{not json").unwrap_err();
        assert!(matches!(err, ResolveError::Json(..)));
    }

    #[test]
    fn side_effects_array_glob() {
        let pkg = PackageJson::parse(
            PathBuf::from("/p/package.json"),
            r#"{"sideEffects":["./polyfill.js","*.css"]}"#,
        )
        .unwrap();
        assert!(pkg.has_side_effects(Path::new("/p/polyfill.js")));
        assert!(pkg.has_side_effects(Path::new("/p/theme.css")));
        assert!(!pkg.has_side_effects(Path::new("/p/lib/index.js")));
    }

    #[test]
    fn resolved_cache_memoizes() {
        let pkg =
            PackageJson::parse(PathBuf::from("/p/package.json"), r#"{"name":"pkg"}"#).unwrap();
        assert!(pkg.get_resolved_cache(".", true).is_none());
        pkg.set_resolved_cache(".", true, Ok(PathBuf::from("/p/index.js")));
        assert_eq!(pkg.get_resolved_cache(".", true), Some(Ok(PathBuf::from("/p/index.js"))));
    }

    #[test]
    fn exports_string_shorthand() {
        let exports = json!("./dist/index.js");
        let resolved =
            resolve_exports_target(Path::new("/p"), &exports, ".", &["production".into()])
                .unwrap();
        assert_eq!(resolved, Some(PathBuf::from("/p/dist/index.js")));
    }

    #[test]
    fn exports_conditions_object() {
        let exports = json!({
            ".": {
                "browser": "./dist/browser.js",
                "require": "./dist/cjs.js",
                "default": "./dist/index.js",
            }
        });
        let resolved = resolve_exports_target(
            Path::new("/p"),
            &exports,
            ".",
            &["production".into(), "browser".into()],
        )
        .unwrap();
        assert_eq!(resolved, Some(PathBuf::from("/p/dist/browser.js")));
    }

    #[test]
    fn export_conditions_honors_dev_flag() {
        let dev = ResolveOptions::default();
        assert_eq!(dev.export_conditions(false, dev.dev), vec!["development", "module"]);

        let prod = ResolveOptions { dev: false, ..ResolveOptions::default() };
        assert_eq!(prod.export_conditions(false, prod.dev), vec!["production", "module"]);
    }

    #[test]
    fn exports_subpath_not_exported() {
        let exports = json!({ "./sub": "./lib/sub.js" });
        let resolved =
            resolve_exports_target(Path::new("/p"), &exports, "./other", &[]).unwrap();
        assert_eq!(resolved, None);
    }

    #[test]
    fn exports_deep_import() {
        let exports = json!({ "./sub": "./lib/sub.js" });
        let resolved = resolve_exports_target(Path::new("/p"), &exports, "./sub", &[]).unwrap();
        assert_eq!(resolved, Some(PathBuf::from("/p/lib/sub.js")));
    }

    #[test]
    fn exports_pattern_match() {
        let exports = json!({ "./features/*": "./src/features/*.js" });
        let resolved =
            resolve_exports_target(Path::new("/p"), &exports, "./features/foo", &[]).unwrap();
        assert_eq!(resolved, Some(PathBuf::from("/p/src/features/foo.js")));
    }

    #[test]
    fn browser_field_mapper_suffix_tolerance() {
        let map = json!({ "./lib/index.js": "./lib/browser.js" }).as_object().unwrap().clone();
        assert_eq!(
            map_with_browser_field(&map, "./lib"),
            Some(json!("./lib/browser.js"))
        );
    }

    #[test]
    fn browser_field_mapper_false_is_external() {
        let map = json!({ "fs": false }).as_object().unwrap().clone();
        assert_eq!(map_with_browser_field(&map, "fs"), Some(json!(false)));
    }
}
