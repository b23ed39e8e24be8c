//! Dataset CLI commands

use anyhow::{Context, Result};
use std::path::Path;

use crate::client::ApiClient;
use crate::output::{format_bytes, print_info, print_success};

/// Download a dataset file to `output`
pub async fn fetch(client: &ApiClient, url: &str, output: &str) -> Result<()> {
    print_info(&format!("Downloading {}", url));
    let bytes = client.download(url).await?;

    let path = Path::new(output);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, &bytes).with_context(|| format!("Failed to write {}", output))?;

    print_success(&format!(
        "Saved {} to {}",
        format_bytes(bytes.len() as u64),
        path.display()
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_writes_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/obesity/train.csv")
            .with_status(200)
            .with_body("Age,Height,Weight\n21,1.62,64\n")
            .create_async()
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("data").join("train.csv");
        let client = ApiClient::new(&server.url()).unwrap();
        fetch(
            &client,
            &format!("{}/obesity/train.csv", server.url()),
            output.to_str().unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(output).unwrap(),
            "Age,Height,Weight\n21,1.62,64\n"
        );
    }
}
