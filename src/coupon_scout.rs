use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{RwLock, mpsc};
use tracing::{error, info, warn};

use crate::database::PreferenceStore;
use crate::locator::find_promo_field;
use crate::models::{BestCoupon, CandidateCode, CouponNotice, DiscountType};
use crate::traits::{CouponService, Notifier, Page};
use crate::trial::{TrialConfig, TrialEngine};
use crate::validation::{SubmissionError, validate_submission};
use crate::watch::{DomMutation, WatchConfig, WatchScheduler};

/// Ties the page heuristics to the coupon service, the local preferences
/// and the notification surface
pub struct CouponScout {
    service: Arc<dyn CouponService>,
    store: PreferenceStore,
    notifier: Arc<dyn Notifier>,
    cache: RwLock<HashMap<String, Vec<CandidateCode>>>,
    trial_config: TrialConfig,
}

impl CouponScout {
    pub fn new(
        service: Arc<dyn CouponService>,
        store: PreferenceStore,
        notifier: Arc<dyn Notifier>,
        trial_config: TrialConfig,
    ) -> Self {
        Self {
            service,
            store,
            notifier,
            cache: RwLock::new(HashMap::new()),
            trial_config,
        }
    }

    /// Candidates for a domain, served from the cache once fetched.
    ///
    /// Failures are logged and come back as an empty, uncached list.
    pub async fn coupons_for(&self, domain: &str) -> Vec<CandidateCode> {
        if let Some(coupons) = self.cache.read().await.get(domain) {
            return coupons.clone();
        }

        match self.service.fetch_coupons(domain).await {
            Ok(coupons) => {
                self.cache
                    .write()
                    .await
                    .insert(domain.to_string(), coupons.clone());
                coupons
            }
            Err(e) => {
                error!("Error fetching coupons for {}: {}", domain, e);
                Vec::new()
            }
        }
    }

    async fn is_disabled(&self, domain: &str) -> bool {
        match self.store.is_site_disabled(domain).await {
            Ok(disabled) => disabled,
            Err(e) => {
                warn!("Could not read preference for {}: {}", domain, e);
                false
            }
        }
    }

    /// One watch check: returns `true` once coupons were announced for the page
    pub async fn check_for_promo_field(&self, page: &Arc<dyn Page>) -> bool {
        let Some(domain) = page.hostname().await else {
            return false;
        };

        if self.is_disabled(&domain).await {
            info!("Coupon search disabled for {}", domain);
            return false;
        }

        if find_promo_field(page.as_ref()).await.is_none() {
            return false;
        }

        let coupons = self.coupons_for(&domain).await;
        info!("Promo field found on {}, {} candidates", domain, coupons.len());

        if let Err(e) = self.notifier.update_badge(&domain, coupons.len()).await {
            warn!("Could not update badge: {}", e);
        }

        let notice = CouponNotice::new(domain, coupons);
        if let Err(e) = self.notifier.show_coupons(&notice).await {
            warn!("Could not show coupons: {}", e);
        }

        true
    }

    /// Run every candidate against the page and announce the winner
    pub async fn find_coupons_now(&self, page: Arc<dyn Page>) -> Option<BestCoupon> {
        let domain = page.hostname().await.unwrap_or_default();
        let engine = TrialEngine::new(page, self.service.clone(), self.trial_config.clone());
        let best = engine.find_best_coupon().await;

        if let Err(e) = self.notifier.show_result(&domain, best.as_ref()).await {
            warn!("Could not show trial result: {}", e);
        }
        best
    }

    /// Validate and submit a code entered by the user
    pub async fn submit_coupon(
        &self,
        domain: &str,
        code: &str,
        discount: &str,
        kind: DiscountType,
    ) -> Result<(), SubmissionError> {
        let coupon = validate_submission(domain, code, discount, kind)?;
        self.service.submit_coupon(&coupon).await?;

        self.cache.write().await.remove(domain);
        info!("Coupon {} added for {}", coupon.code, domain);
        Ok(())
    }

    pub async fn set_site_disabled(&self, domain: &str, disabled: bool) -> Result<()> {
        self.store.set_site_disabled(domain, disabled).await?;
        info!(
            "Coupon search {} for {}",
            if disabled { "disabled" } else { "enabled" },
            domain
        );
        Ok(())
    }

    /// Domains the user turned coupon search off for
    pub async fn disabled_sites(&self) -> Result<Vec<String>> {
        let preferences = self.store.site_preferences().await?;
        Ok(preferences
            .into_iter()
            .filter_map(|(domain, disabled)| disabled.then_some(domain))
            .collect())
    }

    /// Start a watch that announces coupons once a promo field shows up
    pub fn watch(
        self: &Arc<Self>,
        page: Arc<dyn Page>,
        mutations: mpsc::UnboundedReceiver<DomMutation>,
        config: WatchConfig,
    ) -> WatchScheduler {
        let mut scheduler = WatchScheduler::new(config);
        let scout = Arc::clone(self);
        scheduler.start(mutations, move || {
            let scout = Arc::clone(&scout);
            let page = Arc::clone(&page);
            async move { scout.check_for_promo_field(&page).await }
        });
        scheduler
    }
}
