//! # Discord Webhook Integration
//!
//! Mirrors the notification surface into a Discord channel: one embed when a
//! promo field turns up with the candidate codes known for the site, and one
//! when a trial run finishes.
//!
//! ## Discord Embed Structure
//!
//! - **Title**: "🏷️ Coupons Available" or "✅ Coupon Applied" / "❌ No Working Coupon"
//! - **Description**: The same summary or result line the log notifier prints
//! - **Color**: Discord blue (`0x0058_65F2`) for findings, green or red for results
//! - **Fields**: Domain and candidate count, or the winning code and savings
//! - **Timestamp**: When the event happened
//!
//! ## Environment Configuration
//!
//! Set `DISCORD_WEBHOOK_URL` to enable it. Without a webhook URL every call
//! is a no-op, so the notifier can always be wired in.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tracing::{error, info, warn};

use crate::models::{
    BestCoupon, CouponNotice, DiscordEmbed, DiscordField, DiscordMessage, result_message,
};
use crate::traits::Notifier;

const BLUE: u32 = 0x0058_65F2;
const GREEN: u32 = 0x0057_F287;
const RED: u32 = 0x00ED_4245;

/// Discord webhook notifier for coupon findings and trial results.
///
/// Cloning is cheap: `reqwest::Client` shares its connection pool.
#[derive(Clone)]
pub struct DiscordNotifier {
    client: Client,
    /// If `None`, notifications are skipped
    webhook_url: Option<String>,
}

impl DiscordNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        if webhook_url.is_none() {
            warn!("DISCORD_WEBHOOK_URL not set - Discord notifications will be disabled");
        }

        Self {
            client: Client::new(),
            webhook_url,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Embed announcing the candidates for a page with a promo field
    pub fn coupons_embed(notice: &CouponNotice) -> DiscordEmbed {
        DiscordEmbed {
            title: "🏷️ Coupons Available".to_string(),
            description: notice.summary(),
            url: format!("https://{}", notice.domain),
            color: BLUE,
            timestamp: notice.found_at.to_rfc3339(),
            fields: vec![
                DiscordField {
                    name: "Site".to_string(),
                    value: notice.domain.clone(),
                    inline: true,
                },
                DiscordField {
                    name: "Candidates".to_string(),
                    value: notice.coupons.len().to_string(),
                    inline: true,
                },
            ],
        }
    }

    /// Embed with the outcome of a full trial run
    pub fn result_embed(domain: &str, best: Option<&BestCoupon>) -> DiscordEmbed {
        let (title, color, fields) = match best {
            Some(best) => (
                "✅ Coupon Applied",
                GREEN,
                vec![
                    DiscordField {
                        name: "Code".to_string(),
                        value: best.code.clone(),
                        inline: true,
                    },
                    DiscordField {
                        name: "Savings".to_string(),
                        value: format!("${:.2}", best.discount),
                        inline: true,
                    },
                ],
            ),
            None => ("❌ No Working Coupon", RED, Vec::new()),
        };

        DiscordEmbed {
            title: title.to_string(),
            description: result_message(best),
            url: format!("https://{domain}"),
            color,
            timestamp: Utc::now().to_rfc3339(),
            fields,
        }
    }

    async fn send(&self, embed: DiscordEmbed) -> Result<()> {
        let Some(webhook_url) = &self.webhook_url else {
            return Ok(());
        };

        let title = embed.title.clone();
        let message = DiscordMessage {
            embeds: vec![embed],
        };

        let response = self.client.post(webhook_url).json(&message).send().await?;

        if response.status().is_success() {
            info!("Discord notification sent: {}", title);
        } else {
            error!("Failed to send Discord notification: {}", response.status());
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn update_badge(&self, _domain: &str, _count: usize) -> Result<()> {
        // Discord has no badge; the count is part of the coupons embed
        Ok(())
    }

    async fn show_coupons(&self, notice: &CouponNotice) -> Result<()> {
        self.send(Self::coupons_embed(notice)).await
    }

    async fn show_result(&self, domain: &str, best: Option<&BestCoupon>) -> Result<()> {
        self.send(Self::result_embed(domain, best)).await
    }
}
