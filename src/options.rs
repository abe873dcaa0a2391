//! Resolver configuration (`ResolveOptions`).

use std::{fmt, sync::Arc};

use crate::optimizer::DepsOptimizer;

/// Options accepted by [`crate::Resolver::resolve_id`].
///
/// Mirrors a Vite-style resolver plugin's options object: most fields are
/// server-wide configuration set once at construction time, while a handful
/// (`as_src`, `is_require`, `scan`, `ssr`, ...) are really per-call context
/// that callers are expected to vary request-by-request. They live together
/// here, as they do in the systems this crate's algorithm is modeled on,
/// rather than behind a second `ResolveContext` struct.
#[derive(Clone)]
pub struct ResolveOptions {
    /// Project root, used as the fallback search `basedir` and as the forced
    /// basedir for `dedupe` entries.
    pub root: String,

    /// Ordered list of legacy entry field names consulted after
    /// `exports`/`browser`.
    pub main_fields: Vec<String>,

    /// Extra `exports` conditions merged with the built-in
    /// `"production"|"development"` and (unless `is_require`) `"module"`.
    pub conditions: Vec<String>,

    /// Extensions tried, in order, when probing a file.
    pub extensions: Vec<String>,

    /// Package ids that must always resolve against `root`, even when the
    /// importer lives inside a nested `node_modules`.
    pub dedupe: Vec<String>,

    /// When `false`, the final resolved path is passed through `realpath`.
    pub preserve_symlinks: bool,

    /// Whether a specifier reached this call from a browser-targeted module
    /// graph; governs the `browser` field and the `exports` `browser`
    /// condition.
    pub as_src: bool,

    /// Try `<path>/index.<ext>` when `<path>` is a readable directory.
    pub try_index: bool,

    /// Optional prefix synthesized as `dirname/tryPrefix + basename` when the
    /// plain probe misses.
    pub try_prefix: Option<String>,

    /// Skip `package.json`-directed resolution entirely for this probe.
    pub skip_package_json: bool,

    /// Use CommonJS condition semantics (`require` instead of `import`).
    pub is_require: bool,

    /// The importer is a `.ts`/`.tsx`/`.mts` file, enabling the
    /// extensionless TS-file fallback in `tryResolveFile`.
    pub is_from_ts_importer: bool,

    /// Retry bare-import resolution once, ESM-only, on failure.
    pub try_esm_only: bool,

    /// Resolving during dependency-optimizer pre-bundle scanning rather than
    /// normal module graph traversal.
    pub scan: bool,

    /// Resolving for the SSR module graph.
    pub ssr: bool,

    /// `ssrTarget === "webworker"`: together with `ssr`, determines
    /// `targetWeb` (the worker target still gets browser conditions).
    pub ssr_target: bool,

    /// Node.js builtins may not be externalized when SSR bundling is in
    /// effect (`ssr.noExternal === true`). Independent of `ssr_target`: an
    /// SSR request can serve source (`as_src`) while still forbidding
    /// builtin externalization.
    pub ssr_no_external: bool,

    /// Prefer a relative-to-importer resolution over a bare-import one when
    /// both are plausible (used by the CSS/Sass pipeline).
    pub prefer_relative: bool,

    /// Optional dependency optimizer consulted after plain node resolution.
    pub deps_optimizer: Option<Arc<dyn DepsOptimizer>>,

    /// Optional externalization predicate; when it returns `true` for a bare
    /// specifier, `resolve_id` returns an external [`crate::resolution::ResolutionResult`]
    /// instead of resolving it to a file.
    pub should_externalize: Option<Arc<dyn Fn(&str) -> bool + Send + Sync>>,

    /// Selects the `"production"`/`"development"` `exports` condition.
    /// `true` (the default) requests `"development"`.
    pub dev: bool,
}

impl fmt::Debug for ResolveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveOptions")
            .field("root", &self.root)
            .field("main_fields", &self.main_fields)
            .field("conditions", &self.conditions)
            .field("extensions", &self.extensions)
            .field("dedupe", &self.dedupe)
            .field("preserve_symlinks", &self.preserve_symlinks)
            .field("as_src", &self.as_src)
            .field("try_index", &self.try_index)
            .field("try_prefix", &self.try_prefix)
            .field("skip_package_json", &self.skip_package_json)
            .field("is_require", &self.is_require)
            .field("is_from_ts_importer", &self.is_from_ts_importer)
            .field("try_esm_only", &self.try_esm_only)
            .field("scan", &self.scan)
            .field("ssr", &self.ssr)
            .field("ssr_target", &self.ssr_target)
            .field("ssr_no_external", &self.ssr_no_external)
            .field("prefer_relative", &self.prefer_relative)
            .field("deps_optimizer", &self.deps_optimizer.is_some())
            .field("should_externalize", &self.should_externalize.is_some())
            .field("dev", &self.dev)
            .finish()
    }
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            main_fields: vec!["module".to_string(), "jsnext:main".to_string(), "jsnext".to_string()],
            conditions: vec![],
            extensions: vec![
                ".mjs".to_string(),
                ".js".to_string(),
                ".mts".to_string(),
                ".ts".to_string(),
                ".jsx".to_string(),
                ".tsx".to_string(),
                ".json".to_string(),
            ],
            dedupe: vec![],
            preserve_symlinks: false,
            as_src: true,
            try_index: true,
            try_prefix: None,
            skip_package_json: false,
            is_require: false,
            is_from_ts_importer: false,
            try_esm_only: false,
            scan: false,
            ssr: false,
            ssr_target: false,
            ssr_no_external: false,
            prefer_relative: false,
            deps_optimizer: None,
            should_externalize: None,
            dev: true,
        }
    }
}

impl ResolveOptions {
    #[must_use]
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    #[must_use]
    pub fn with_main_fields(mut self, main_fields: Vec<String>) -> Self {
        self.main_fields = main_fields;
        self
    }

    #[must_use]
    pub fn with_conditions(mut self, conditions: Vec<String>) -> Self {
        self.conditions = conditions;
        self
    }

    #[must_use]
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    #[must_use]
    pub fn with_dedupe(mut self, dedupe: Vec<String>) -> Self {
        self.dedupe = dedupe;
        self
    }

    #[must_use]
    pub fn with_preserve_symlinks(mut self, preserve_symlinks: bool) -> Self {
        self.preserve_symlinks = preserve_symlinks;
        self
    }

    #[must_use]
    pub fn with_as_src(mut self, as_src: bool) -> Self {
        self.as_src = as_src;
        self
    }

    #[must_use]
    pub fn with_ssr(mut self, ssr: bool) -> Self {
        self.ssr = ssr;
        self
    }

    #[must_use]
    pub fn with_ssr_no_external(mut self, ssr_no_external: bool) -> Self {
        self.ssr_no_external = ssr_no_external;
        self
    }

    #[must_use]
    pub fn with_dev(mut self, dev: bool) -> Self {
        self.dev = dev;
        self
    }

    #[must_use]
    pub fn with_scan(mut self, scan: bool) -> Self {
        self.scan = scan;
        self
    }

    #[must_use]
    pub fn with_deps_optimizer(mut self, optimizer: Arc<dyn DepsOptimizer>) -> Self {
        self.deps_optimizer = Some(optimizer);
        self
    }

    #[must_use]
    pub fn with_should_externalize(
        mut self,
        predicate: Arc<dyn Fn(&str) -> bool + Send + Sync>,
    ) -> Self {
        self.should_externalize = Some(predicate);
        self
    }

    /// Conditions to pass into the `exports` field algorithm: built-in
    /// `production`/`development`, `module` (unless a `require` call), the
    /// `browser` condition iff `targetWeb`, then user-supplied conditions.
    #[must_use]
    pub fn export_conditions(&self, target_web: bool, is_dev: bool) -> Vec<String> {
        let mut conditions =
            vec![if is_dev { "development".to_string() } else { "production".to_string() }];
        if !self.is_require {
            conditions.push("module".to_string());
        }
        if target_web {
            conditions.push("browser".to_string());
        }
        conditions.extend(self.conditions.iter().cloned());
        conditions
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let options = ResolveOptions::default();
        assert_eq!(options.main_fields, vec!["module", "jsnext:main", "jsnext"]);
        assert_eq!(options.extensions[0], ".mjs");
        assert!(options.try_index);
        assert!(!options.is_require);
    }

    #[test]
    fn export_conditions_require_vs_import() {
        let esm = ResolveOptions::default();
        assert_eq!(esm.export_conditions(false, false), vec!["production", "module"]);

        let cjs = ResolveOptions::default();
        let cjs = ResolveOptions { is_require: true, ..cjs };
        assert_eq!(cjs.export_conditions(false, false), vec!["production"]);

        let web = ResolveOptions::default();
        assert_eq!(web.export_conditions(true, true), vec!["development", "module", "browser"]);
    }

    #[test]
    fn builder() {
        let options = ResolveOptions::default().with_root("/proj").with_ssr(true);
        assert_eq!(options.root, "/proj");
        assert!(options.ssr);
    }
}
