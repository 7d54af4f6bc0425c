use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::models::{BestCoupon, CouponNotice, result_message};
use crate::traits::Notifier;

/// Prints the notification surface to the log
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn update_badge(&self, domain: &str, count: usize) -> Result<()> {
        info!("[{}] badge: {}", domain, count);
        Ok(())
    }

    async fn show_coupons(&self, notice: &CouponNotice) -> Result<()> {
        info!("[{}] {}", notice.domain, notice.summary());
        for coupon in &notice.coupons {
            info!("[{}]   {}", notice.domain, coupon.code);
        }
        Ok(())
    }

    async fn show_result(&self, domain: &str, best: Option<&BestCoupon>) -> Result<()> {
        info!("[{}] {}", domain, result_message(best));
        Ok(())
    }
}

/// Sends every notification to each inner notifier in turn
pub struct Fanout(pub Vec<Box<dyn Notifier>>);

#[async_trait]
impl Notifier for Fanout {
    async fn update_badge(&self, domain: &str, count: usize) -> Result<()> {
        for notifier in &self.0 {
            notifier.update_badge(domain, count).await?;
        }
        Ok(())
    }

    async fn show_coupons(&self, notice: &CouponNotice) -> Result<()> {
        for notifier in &self.0 {
            notifier.show_coupons(notice).await?;
        }
        Ok(())
    }

    async fn show_result(&self, domain: &str, best: Option<&BestCoupon>) -> Result<()> {
        for notifier in &self.0 {
            notifier.show_result(domain, best).await?;
        }
        Ok(())
    }
}
