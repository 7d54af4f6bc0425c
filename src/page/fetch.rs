use anyhow::Result;
use reqwest::Client;
use tracing::info;

use super::HtmlPage;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// Downloads checkout pages into [`HtmlPage`]s
#[derive(Clone)]
pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> Result<HtmlPage> {
        info!("Fetching page {}", url);

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Failed to fetch page {}: {}",
                url,
                response.status()
            ));
        }

        // Keep the post-redirect URL, the classifier looks at it
        let final_url = response.url().to_string();
        let html = response.text().await?;

        Ok(HtmlPage::parse(final_url, &html))
    }
}
