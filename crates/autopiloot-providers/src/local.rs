// Filesystem artifact store for local runs and tests. Artifact ids are
// paths relative to the root directory.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::ArtifactStore;

pub struct LocalArtifacts {
    root: PathBuf,
}

impl LocalArtifacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifacts {
    async fn fetch_text(&self, artifact_id: &str) -> anyhow::Result<String> {
        Ok(fs::read_to_string(self.root.join(artifact_id)).await?)
    }

    async fn store_text(&self, name: &str, content: &str) -> anyhow::Result<String> {
        fs::create_dir_all(&self.root).await?;
        fs::write(self.root.join(name), content).await?;
        Ok(name.to_string())
    }
}
