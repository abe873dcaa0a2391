//! Node.js builtin module names, consulted when a bare import falls through
//! node resolution.
//!
//! Kept sorted for `binary_search`.

pub static NODEJS_BUILTINS: &[&str] = &[
    "_http_agent",
    "_http_client",
    "_http_common",
    "_http_incoming",
    "_http_outgoing",
    "_http_server",
    "_stream_duplex",
    "_stream_passthrough",
    "_stream_readable",
    "_stream_transform",
    "_stream_wrap",
    "_stream_writable",
    "_tls_common",
    "_tls_wrap",
    "assert",
    "assert/strict",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "dns/promises",
    "domain",
    "events",
    "fs",
    "fs/promises",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "path/posix",
    "path/win32",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "stream/consumers",
    "stream/promises",
    "stream/web",
    "string_decoder",
    "sys",
    "timers",
    "timers/promises",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "util/types",
    "v8",
    "vm",
    "worker_threads",
    "zlib",
];

/// Returns true when `specifier` (with any `node:` prefix stripped) names a
/// Node.js builtin module.
#[must_use]
pub fn is_builtin(specifier: &str) -> bool {
    let specifier = specifier.strip_prefix("node:").unwrap_or(specifier);
    NODEJS_BUILTINS.binary_search(&specifier).is_ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sorted() {
        let mut sorted = NODEJS_BUILTINS.to_vec();
        sorted.sort_unstable();
        assert_eq!(NODEJS_BUILTINS, sorted.as_slice());
    }

    #[test]
    fn recognizes_builtins() {
        assert!(is_builtin("fs"));
        assert!(is_builtin("node:fs"));
        assert!(is_builtin("fs/promises"));
        assert!(!is_builtin("lodash"));
    }
}
