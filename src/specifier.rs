//! Classification of the specifier string appearing in `import "specifier"`
//! or `require("specifier")`.

/// Reserved sentinel returned in place of a module that has been
/// externalized for browser compatibility.
pub const BROWSER_EXTERNAL_ID: &str = "__vite-browser-external";

/// Pass-through marker for the commonjs interop plugin's generated helper.
pub const COMMONJS_HELPERS_ID: &str = "commonjsHelpers.js";

/// Prefix that escapes into an explicit, unqualified filesystem path.
pub const FS_PREFIX: &str = "/@fs/";

/// The kind of specifier, computed once at the top of the dispatch
/// orchestrator so the rest of `resolve_id` can `match` on it instead of
/// re-deriving it at every step.
///
/// `OptimizedUrl` and `Builtin` are not produced by [`classify`]: whether a
/// specifier is an optimized-dep url depends on the optimizer's metadata,
/// and whether a bare import is a builtin is only checked after node
/// resolution has failed. Both are handled as explicit steps in
/// `resolve_id` and layered on top of this classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifierKind {
    BrowserExternal,
    CommonJsProxy,
    FsEscape,
    RootUrl,
    Relative,
    Absolute,
    ExternalUrl,
    DataUrl,
    Bare,
    Unresolvable,
}

/// Classify `specifier` into one of the syntactic [`SpecifierKind`]s.
///
/// `as_src` is the same flag the orchestrator passes to its own root-url
/// step: a leading `/` is a root-relative url only while serving source
/// (spec step 6 is `asSrc`-gated). When `as_src` is false (build mode) a
/// leading `/` is just a POSIX absolute path.
#[must_use]
pub fn classify(specifier: &str, as_src: bool) -> SpecifierKind {
    if specifier == BROWSER_EXTERNAL_ID
        || specifier.starts_with(&format!("{BROWSER_EXTERNAL_ID}:"))
    {
        return SpecifierKind::BrowserExternal;
    }
    if specifier.contains("?commonjs") || specifier == COMMONJS_HELPERS_ID {
        return SpecifierKind::CommonJsProxy;
    }
    if specifier.starts_with(FS_PREFIX) {
        return SpecifierKind::FsEscape;
    }
    if specifier.starts_with('/') {
        return if as_src { SpecifierKind::RootUrl } else { SpecifierKind::Absolute };
    }
    if is_relative(specifier) {
        return SpecifierKind::Relative;
    }
    if is_absolute(specifier) {
        return SpecifierKind::Absolute;
    }
    if external_url_scheme(specifier).is_some() {
        return SpecifierKind::ExternalUrl;
    }
    if specifier.starts_with("data:") {
        return SpecifierKind::DataUrl;
    }
    if is_bare_import(specifier) {
        return SpecifierKind::Bare;
    }
    SpecifierKind::Unresolvable
}

/// `./foo`, `../foo`, `.`, `..`
#[must_use]
pub fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// Absolute filesystem path: POSIX `/foo` is handled by the leading-`/` check
/// upstream of this one (routed to `RootUrl` or `Absolute` depending on
/// `as_src`), so here we only need to catch Windows drive-letter and UNC
/// forms.
#[must_use]
pub fn is_absolute(specifier: &str) -> bool {
    let bytes = specifier.as_bytes();
    (bytes.len() >= 3 && bytes[1] == b':' && (bytes[2] == b'\\' || bytes[2] == b'/'))
        || specifier.starts_with("\\\\")
}

/// Returns the scheme (e.g. `"https"`) when `specifier` is a URL with an
/// explicit scheme other than a single Windows drive letter.
#[must_use]
pub fn external_url_scheme(specifier: &str) -> Option<&str> {
    let (scheme, rest) = specifier.split_once("://")?;
    if scheme.is_empty() || scheme.len() == 1 {
        return None;
    }
    if !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.') {
        return None;
    }
    let _ = rest;
    Some(scheme)
}

/// Begins with an ASCII letter, or with `@scope/`.
#[must_use]
pub fn is_bare_import(specifier: &str) -> bool {
    specifier
        .as_bytes()
        .first()
        .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'@')
}

/// Split `file?query#hash` into `(file, postfix)` where `postfix` is empty
/// or begins with `?` or `#` — whichever delimiter appears first.
///
/// `file + postfix == specifier` always holds.
#[must_use]
pub fn split_file_and_postfix(specifier: &str) -> (&str, &str) {
    let query_at = specifier.find('?');
    let hash_at = specifier.find('#');
    let split_at = match (query_at, hash_at) {
        (Some(q), Some(h)) => Some(q.min(h)),
        (Some(q), None) => Some(q),
        (None, Some(h)) => Some(h),
        (None, None) => None,
    };
    split_at.map_or((specifier, ""), |i| (&specifier[..i], &specifier[i..]))
}
