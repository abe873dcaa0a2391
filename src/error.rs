use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while resolving a specifier.
///
/// Most mismatches are not errors: a package that simply doesn't contain a
/// file is reported as `Ok(None)` so the plugin host can fall through to the
/// next resolver. The variants here are the fatal ones: they abort the
/// current import graph rather than letting another plugin have a turn.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// `resolvePackageEntry` exhausted every candidate entry point.
    #[error("Failed to resolve entry for package \"{0}\"{cause}", cause = .1.as_ref().map(|c| format!(": {c}")).unwrap_or_default())]
    EntryResolutionFailed(String, Option<String>),

    /// The `exports` field does not expose the requested subpath.
    #[error("Package subpath \"{0}\" is not exported by {path}", path = .1.display())]
    SubpathNotExported(String, PathBuf),

    /// A Node.js builtin was imported under `ssr.noExternal === true`.
    #[error("Cannot bundle builtin module \"{0}\" imported from \"{1}\" because ssr.noExternal is true")]
    SsrBuiltinForbidden(String, String),

    /// `package.json` exists but failed to parse.
    #[error("Failed to parse {0}: {1}")]
    Json(PathBuf, String),

    /// Underlying filesystem failure that isn't a plain "not found".
    #[error("{0}")]
    Io(String),

    /// The specifier could not be parsed at all (e.g. empty string).
    #[error("Invalid specifier: {0}")]
    InvalidSpecifier(String),
}

impl From<std::io::Error> for ResolveError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
