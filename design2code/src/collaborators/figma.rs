//! Figma REST client
//!
//! Fetches node trees and rendered image links. Responses can be cached on
//! disk to spare the API during repeated local runs.

use async_trait::async_trait;
use design2code_sdk::{CollaboratorError, DesignNode, DesignRef, DesignSource, FetchedDocument};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::FigmaConfig;

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct NodesResponse {
    #[serde(default)]
    nodes: HashMap<String, Option<NodeEntry>>,
}

#[derive(Debug, Deserialize)]
struct NodeEntry {
    document: DesignNode,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    err: Option<String>,
    #[serde(default)]
    images: HashMap<String, Option<String>>,
}

pub struct FigmaClient {
    client: Client,
    api_base: String,
    cache_dir: Option<PathBuf>,
}

impl FigmaClient {
    pub fn new(config: &FigmaConfig) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(transport)?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            cache_dir: config.cache_dir.clone(),
        })
    }

    fn document_cache_path(&self, reference: &DesignRef) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}_{}.json", reference.file_key, reference.node_id)))
    }

    fn image_cache_path(&self, file_key: &str) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}_image_links.json", file_key)))
    }

    async fn get(&self, url: &str, credential: &str) -> Result<Response, CollaboratorError> {
        let response = self
            .client
            .get(url)
            .header("X-Figma-Token", credential)
            .send()
            .await
            .map_err(transport)?;
        check_status(response).await
    }
}

#[async_trait]
impl DesignSource for FigmaClient {
    async fn fetch_document(
        &self,
        reference: &DesignRef,
        credential: &str,
    ) -> Result<FetchedDocument, CollaboratorError> {
        let api_node_id = reference.api_node_id();
        let cache_path = self.document_cache_path(reference);

        let body = match cache_path.as_deref() {
            Some(path) if path.is_file() => {
                tracing::info!("Reading design {} from cache", path.display());
                tokio::fs::read_to_string(path).await?
            }
            _ => {
                let url = format!(
                    "{}/v1/files/{}/nodes?ids={}",
                    self.api_base, reference.file_key, api_node_id
                );
                let body = self.get(&url, credential).await?.text().await.map_err(transport)?;
                if let Some(path) = cache_path.as_deref() {
                    write_cache(path, &body).await;
                }
                body
            }
        };

        let mut response: NodesResponse = serde_json::from_str(&body)
            .map_err(|e| CollaboratorError::InvalidResponse(format!("node response: {}", e)))?;
        let entry = response
            .nodes
            .remove(&api_node_id)
            .flatten()
            .ok_or_else(|| {
                CollaboratorError::InvalidResponse(format!("node {} not found in file", api_node_id))
            })?;

        let title = Some(entry.document.name.clone()).filter(|name| !name.is_empty());
        Ok(FetchedDocument {
            title,
            root: entry.document,
        })
    }

    async fn fetch_asset_links(
        &self,
        file_key: &str,
        ids: &[String],
        credential: &str,
    ) -> Result<HashMap<String, String>, CollaboratorError> {
        let cache_path = self.image_cache_path(file_key);
        let mut cached = match cache_path.as_deref() {
            Some(path) => read_link_cache(path).await,
            None => HashMap::new(),
        };

        let mut links: HashMap<String, String> = ids
            .iter()
            .filter_map(|id| cached.get(id).map(|url| (id.clone(), url.clone())))
            .collect();
        let missing: Vec<&str> = ids
            .iter()
            .filter(|id| !links.contains_key(*id))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            return Ok(links);
        }
        if !links.is_empty() {
            tracing::info!("Image link cache hit {}/{} for {}", links.len(), ids.len(), file_key);
        }

        let url = format!(
            "{}/v1/images/{}?ids={}&format=png&scale=3",
            self.api_base,
            file_key,
            missing.join(",")
        );
        let response: ImagesResponse = self
            .get(&url, credential)
            .await?
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(format!("image response: {}", e)))?;
        if let Some(err) = response.err.filter(|e| !e.is_empty()) {
            return Err(CollaboratorError::InvalidResponse(err));
        }

        let fetched: HashMap<String, String> = response
            .images
            .into_iter()
            .filter_map(|(id, url)| url.map(|url| (id, url)))
            .collect();
        if let Some(path) = cache_path.as_deref() {
            cached.extend(fetched.clone());
            if let Ok(json) = serde_json::to_string_pretty(&cached) {
                write_cache(path, &json).await;
            }
        }
        links.extend(fetched);
        Ok(links)
    }

    async fn download_asset(&self, url: &str) -> Result<Vec<u8>, CollaboratorError> {
        let response = self.client.get(url).send().await.map_err(transport)?;
        let response = check_status(response).await?;
        let bytes = response.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }
}

fn transport(err: reqwest::Error) -> CollaboratorError {
    CollaboratorError::Transport(err.to_string())
}

async fn check_status(response: Response) -> Result<Response, CollaboratorError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RETRY_AFTER);
        tracing::warn!("Figma rate limited, retry after {}s", retry_after.as_secs());
        return Err(CollaboratorError::RateLimited { retry_after });
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(CollaboratorError::Http {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

async fn read_link_cache(path: &Path) -> HashMap<String, String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
        Err(_) => HashMap::new(),
    }
}

/// Best effort: a cache that cannot be written is only logged
async fn write_cache(path: &Path, content: &str) {
    if let Some(dir) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            tracing::warn!("Cannot create cache dir {}: {}", dir.display(), e);
            return;
        }
    }
    if let Err(e) = tokio::fs::write(path, content).await {
        tracing::warn!("Cannot write cache {}: {}", path.display(), e);
    }
}
