use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{PlankwebError, Result};

/// Hosts every deployment needs.
pub const DEFAULT_ALLOWLIST: &[&str] = &[
    "files.rcsb.org",      // PDB downloads
    "alphafold.ebi.ac.uk", // AlphaFold models
    "api.esmatlas.com",    // ESMFold
    "rest.uniprot.org",    // UniProt
    "localhost",
    "127.0.0.1",
];

/// Where materialization reads input bytes from.
#[async_trait]
pub trait InputSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// HTTP client that only talks to allowlisted hosts.
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    allowlist: HashSet<String>,
    allow_local_files: bool,
}

impl FetchClient {
    /// Creates a client with the given host allowlist and request timeout.
    pub fn new<I, S>(allowlist: I, timeout: Duration) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| PlankwebError::Other(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            allowlist: allowlist.into_iter().map(Into::into).collect(),
            allow_local_files: false,
        })
    }

    /// Client with [`DEFAULT_ALLOWLIST`] and a 30 s timeout.
    pub fn with_defaults() -> Result<Self> {
        Self::new(DEFAULT_ALLOWLIST.iter().copied(), Duration::from_secs(30))
    }

    /// Accept `file://` URLs (local deployments and tests).
    pub fn with_local_files(mut self, allowed: bool) -> Self {
        self.allow_local_files = allowed;
        self
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Exact host or subdomain of an allowed host; `file://` only when enabled.
    pub fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        if parsed.scheme() == "file" {
            return self.allow_local_files;
        }
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }
        match parsed.host_str() {
            Some(host) => self
                .allowlist
                .iter()
                .any(|allowed| host == allowed || host.ends_with(&format!(".{}", allowed))),
            None => false,
        }
    }

    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder> {
        self.check(url)?;
        Ok(self.client.get(url))
    }

    pub fn post(&self, url: &str) -> Result<reqwest::RequestBuilder> {
        self.check(url)?;
        Ok(self.client.post(url))
    }

    fn check(&self, url: &str) -> Result<()> {
        if self.is_allowed(url) {
            Ok(())
        } else {
            Err(PlankwebError::SecurityError(format!("host not in allowlist for URL {}", url)))
        }
    }
}

#[async_trait]
impl InputSource for FetchClient {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.check(url)?;
        let parsed = Url::parse(url).map_err(|e| PlankwebError::InvalidInput(format!("bad URL {}: {}", url, e)))?;

        if parsed.scheme() == "file" {
            let path = parsed
                .to_file_path()
                .map_err(|_| PlankwebError::InvalidInput(format!("bad file URL {}", url)))?;
            debug!("Reading local input {:?}", path);
            return Ok(tokio::fs::read(&path).await?);
        }

        debug!("Fetching input {}", url);
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowlist_matches_host_and_subdomain() {
        let client = FetchClient::new(["rcsb.org"], Duration::from_secs(1)).unwrap();
        assert!(client.is_allowed("https://rcsb.org/x"));
        assert!(client.is_allowed("https://files.rcsb.org/download/2SRC.pdb"));
        assert!(!client.is_allowed("https://evilrcsb.org/x"));
        assert!(!client.is_allowed("ftp://rcsb.org/x"));
        assert!(!client.is_allowed("not a url"));
    }

    #[test]
    fn test_file_urls_need_opt_in() {
        let client = FetchClient::with_defaults().unwrap();
        assert!(!client.is_allowed("file:///tmp/x.pdb"));
        assert!(client.with_local_files(true).is_allowed("file:///tmp/x.pdb"));
    }

    #[tokio::test]
    async fn test_fetch_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.fasta");
        std::fs::write(&path, ">x\nMKV\n").unwrap();
        let url = Url::from_file_path(&path).unwrap().to_string();

        let client = FetchClient::with_defaults().unwrap().with_local_files(true);
        let bytes = client.fetch(&url).await.unwrap();
        assert_eq!(bytes, b">x\nMKV\n");
    }

    #[tokio::test]
    async fn test_fetch_rejects_unlisted_host() {
        let client = FetchClient::new(Vec::<String>::new(), Duration::from_secs(1)).unwrap();
        let err = client.fetch("https://example.com/a.pdb").await.unwrap_err();
        assert!(matches!(err, PlankwebError::SecurityError(_)));
    }
}
