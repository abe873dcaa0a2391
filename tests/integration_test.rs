//! End-to-end tests against the real filesystem, exercising the public API.

use std::{env, path::PathBuf};

use specifier_resolver::{ResolutionResult, ResolveOptions, Resolver};

fn fixtures_dir() -> PathBuf {
    env::current_dir().unwrap().join("tests/fixtures")
}

fn resolver() -> Resolver {
    Resolver::new(ResolveOptions::default().with_root(fixtures_dir().to_string_lossy()))
}

#[tokio::test]
async fn resolves_relative_specifier() {
    let dir = fixtures_dir();
    let importer = dir.join("src/app.js");
    let result =
        resolver().resolve_id("./util.js", Some(&importer.to_string_lossy())).await.unwrap();
    assert_eq!(result.id(), Some(dir.join("src/util.js").to_string_lossy().as_ref()));
}

#[tokio::test]
async fn resolves_bare_import_via_main_field() {
    let dir = fixtures_dir();
    let importer = dir.join("src/app.js");
    let result = resolver().resolve_id("pkg-main", Some(&importer.to_string_lossy())).await.unwrap();
    assert_eq!(
        result.id(),
        Some(dir.join("node_modules/pkg-main/index.js").to_string_lossy().as_ref())
    );
}

#[tokio::test]
async fn resolves_deep_import_via_exports() {
    let dir = fixtures_dir();
    let importer = dir.join("src/app.js");
    let result =
        resolver().resolve_id("pkg-exports/sub", Some(&importer.to_string_lossy())).await.unwrap();
    assert_eq!(
        result.id(),
        Some(dir.join("node_modules/pkg-exports/lib/sub.js").to_string_lossy().as_ref())
    );
}

#[tokio::test]
async fn resolves_package_entry_via_exports() {
    let dir = fixtures_dir();
    let importer = dir.join("src/app.js");
    let result =
        resolver().resolve_id("pkg-exports", Some(&importer.to_string_lossy())).await.unwrap();
    assert_eq!(
        result.id(),
        Some(dir.join("node_modules/pkg-exports/lib/index.js").to_string_lossy().as_ref())
    );
}

#[tokio::test]
async fn unknown_deep_import_is_a_fatal_subpath_error() {
    let dir = fixtures_dir();
    let importer = dir.join("src/app.js");
    let err =
        resolver().resolve_id("pkg-exports/missing", Some(&importer.to_string_lossy())).await;
    assert!(err.is_err());
}

#[tokio::test]
async fn external_url_specifier_is_external() {
    let result = resolver().resolve_id("https://cdn.example.com/a.js", None).await.unwrap();
    assert_eq!(
        result,
        ResolutionResult::Resolved {
            id: "https://cdn.example.com/a.js".to_string(),
            external: true,
            module_side_effects: None,
        }
    );
}

#[tokio::test]
async fn clear_cache_is_callable() {
    let resolver = resolver();
    resolver.clear_cache();
}

#[tokio::test]
async fn options_accessor_and_debug() {
    let r = resolver();
    assert!(!format!("{:?}", r.options()).is_empty());
    assert!(!format!("{r:?}").is_empty());
}
