//! Type-definition bundle fetch for editor autocomplete.
//!
//! Typings come from the package host; when the scoped `@types` endpoint
//! misses, the unscoped endpoint is tried once. Total failure degrades
//! gracefully: autocomplete goes without typings, the editing session
//! continues.

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

const TYPES_URL: &str = "https://prod-packager-packages.codesandbox.io/v1/typings/@types";
const TYPES_FALLBACK_URL: &str = "https://prod-packager-packages.codesandbox.io/v1/typings";

/// A typings bundle: file path → declaration source.
#[derive(Debug, Deserialize)]
pub struct TypingsBundle {
    pub files: std::collections::HashMap<String, TypingsFile>,
}

#[derive(Debug, Deserialize)]
pub struct TypingsFile {
    pub module: TypingsModule,
}

#[derive(Debug, Deserialize)]
pub struct TypingsModule {
    pub code: String,
}

async fn fetch_from(base: &str, package: &str, version: &str) -> anyhow::Result<TypingsBundle> {
    let client = reqwest::Client::new();
    let url = format!("{}/{}/{}.json", base, package, version);
    let resp = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to request typings from {}", url))?;

    if !resp.status().is_success() {
        anyhow::bail!("Typings host returned {} for {}", resp.status(), url);
    }

    resp.json::<TypingsBundle>()
        .await
        .with_context(|| format!("Failed to decode typings bundle from {}", url))
}

/// Fetch the typings bundle for a dependency. Tries the scoped endpoint,
/// then the unscoped fallback once. `None` means both attempts failed and
/// the editor should degrade without typings.
pub async fn fetch_typings(package: &str, version: &str) -> Option<TypingsBundle> {
    match fetch_from(TYPES_URL, package, version).await {
        Ok(bundle) => return Some(bundle),
        Err(e) => {
            warn!(package, version, error = %e, "primary typings fetch failed, trying fallback");
        }
    }

    match fetch_from(TYPES_FALLBACK_URL, package, version).await {
        Ok(bundle) => Some(bundle),
        Err(e) => {
            warn!(package, version, error = %e, "typings unavailable, autocomplete degrades");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_decodes_host_shape() {
        let json = r#"{
            "files": {
                "/node_modules/@types/react/index.d.ts": {
                    "module": { "code": "export declare const version: string;" }
                }
            }
        }"#;
        let bundle: TypingsBundle = serde_json::from_str(json).unwrap();
        let file = bundle
            .files
            .get("/node_modules/@types/react/index.d.ts")
            .unwrap();
        assert!(file.module.code.contains("version"));
    }

    #[test]
    fn empty_bundle_is_valid() {
        let bundle: TypingsBundle = serde_json::from_str(r#"{"files":{}}"#).unwrap();
        assert!(bundle.files.is_empty());
    }
}
