use crate::cleanup::{CleanupGuard, SharedCleanupContext};
use crate::http::HttpClient;
use crate::runtime::Runtime;
use anyhow::{Context, Result};
use log::info;
use std::path::{Path, PathBuf};

/// Downloads `url` into `cache_dir/file_name`, reusing a previous download if present.
///
/// The body is streamed into a `.part` file which is renamed into place once
/// complete, so an interrupted download never looks like a cached one.
#[tracing::instrument(skip(runtime, http_client, cleanup_ctx))]
pub async fn fetch_cached<R: Runtime>(
    runtime: &R,
    http_client: &HttpClient,
    url: &str,
    cache_dir: &Path,
    file_name: &str,
    cleanup_ctx: SharedCleanupContext,
) -> Result<PathBuf> {
    let target = cache_dir.join(file_name);
    if runtime.exists(&target) {
        info!("Using cached {}", target.display());
        return Ok(target);
    }

    runtime
        .create_dir_all(cache_dir)
        .with_context(|| format!("Failed to create cache directory {:?}", cache_dir))?;

    let part = cache_dir.join(format!("{}.part", file_name));
    let guard = CleanupGuard::new(cleanup_ctx, part.clone());

    info!("Downloading {}...", url);
    let bytes = http_client
        .download_file(url, || {
            runtime
                .create_file(&part)
                .with_context(|| format!("Failed to create file at {:?}", part))
        })
        .await?;

    runtime
        .rename(&part, &target)
        .with_context(|| format!("Failed to move download into {:?}", target))?;
    guard.success();

    info!("Download complete: {} ({} bytes)", target.display(), bytes);
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use reqwest::Client;

    #[tokio::test]
    async fn test_fetch_cached_reuses_existing_file() {
        // No HTTP server: a cached file must not trigger any request
        let mut runtime = MockRuntime::new();
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/cache/Python-3.11.8.tgz")))
            .returning(|_| true);

        let http_client = HttpClient::new(Client::new());
        let path = fetch_cached(
            &runtime,
            &http_client,
            "http://127.0.0.1:9/unused",
            Path::new("/cache"),
            "Python-3.11.8.tgz",
            cleanup::new_shared(),
        )
        .await
        .unwrap();

        assert_eq!(path, PathBuf::from("/cache/Python-3.11.8.tgz"));
    }

    #[tokio::test]
    async fn test_fetch_cached_downloads_and_renames() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/Python-3.11.8.tgz")
            .with_status(200)
            .with_body("tarball")
            .create_async()
            .await;

        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| false);
        runtime
            .expect_create_dir_all()
            .with(eq(PathBuf::from("/cache")))
            .returning(|_| Ok(()));
        runtime
            .expect_create_file()
            .with(eq(PathBuf::from("/cache/Python-3.11.8.tgz.part")))
            .returning(|_| Ok(Box::new(std::io::sink())));
        runtime
            .expect_rename()
            .with(
                eq(PathBuf::from("/cache/Python-3.11.8.tgz.part")),
                eq(PathBuf::from("/cache/Python-3.11.8.tgz")),
            )
            .returning(|_, _| Ok(()));

        let ctx = cleanup::new_shared();
        let http_client = HttpClient::new(Client::new());
        let path = fetch_cached(
            &runtime,
            &http_client,
            &format!("{}/Python-3.11.8.tgz", server.url()),
            Path::new("/cache"),
            "Python-3.11.8.tgz",
            ctx.clone(),
        )
        .await
        .unwrap();

        mock.assert_async().await;
        assert_eq!(path, PathBuf::from("/cache/Python-3.11.8.tgz"));
        assert!(ctx.lock().unwrap().paths.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_cached_failure_leaves_part_registered() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/Python-3.99.0.tgz")
            .with_status(404)
            .create_async()
            .await;

        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| false);
        runtime.expect_create_dir_all().returning(|_| Ok(()));

        let ctx = cleanup::new_shared();
        let http_client = HttpClient::new(Client::new());
        let result = fetch_cached(
            &runtime,
            &http_client,
            &format!("{}/Python-3.99.0.tgz", server.url()),
            Path::new("/cache"),
            "Python-3.99.0.tgz",
            ctx.clone(),
        )
        .await;

        mock.assert_async().await;
        assert!(result.is_err());
        assert_eq!(
            ctx.lock().unwrap().paths,
            vec![PathBuf::from("/cache/Python-3.99.0.tgz.part")]
        );
    }
}
