//! Sequential apply-and-measure trials over candidate codes.
//!
//! Every trial mutates the one piece of shared page state (the promo input
//! and the cart total), so trials run strictly one after another and the
//! engine never keeps element handles without re-checking them.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::locator::{find_apply_button, find_promo_field};
use crate::models::{BestCoupon, CandidateCode, CouponOutcome, TrialResult};
use crate::page::PageError;
use crate::price::read_displayed_total;
use crate::traits::{CouponService, ElementHandle, ElementQuery, Page};

/// Labels of controls that take an applied code off the cart
const RESET_TERMS: &[&str] = &["remove", "delete", "clear"];

#[derive(Debug, Clone)]
pub struct TrialConfig {
    /// Wait after clicking a remove control
    pub reset_settle: Duration,
    /// Wait after clicking apply; the total is usually recomputed server-side
    pub apply_settle: Duration,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            reset_settle: Duration::from_millis(1500),
            apply_settle: Duration::from_millis(2000),
        }
    }
}

impl TrialConfig {
    /// No waits, for pages that react synchronously
    pub fn immediate() -> Self {
        Self {
            reset_settle: Duration::ZERO,
            apply_settle: Duration::ZERO,
        }
    }
}

/// Running state of one `find_best_coupon` call
#[derive(Debug, Clone, PartialEq)]
pub struct TrialSession {
    pub initial_total: f64,
    pub best_code: Option<String>,
    pub best_total: Option<f64>,
    pub last_tested_code: Option<String>,
}

impl TrialSession {
    pub fn new(initial_total: f64) -> Self {
        Self {
            initial_total,
            best_code: None,
            best_total: None,
            last_tested_code: None,
        }
    }

    /// Record an attempted trial; returns whether the code worked.
    ///
    /// Only a strictly lower total replaces the current best.
    pub fn record(&mut self, code: &str, total: Option<f64>) -> bool {
        let Some(total) = total.filter(|t| *t < self.initial_total) else {
            return false;
        };

        if self.best_total.is_none_or(|best| total < best) {
            self.best_code = Some(code.to_string());
            self.best_total = Some(total);
        }
        true
    }

    /// The best code still has to be re-applied when another code was tried after it
    pub fn needs_reapply(&self) -> bool {
        self.best_code.is_some() && self.best_code != self.last_tested_code
    }

    pub fn best(&self) -> Option<BestCoupon> {
        let code = self.best_code.clone()?;
        let total = self.best_total?;
        Some(BestCoupon {
            code,
            discount: self.initial_total - total,
        })
    }
}

/// Promo input and apply control as last seen on the page
#[derive(Debug, Clone, Copy)]
struct Controls {
    input: ElementHandle,
    button: Option<ElementHandle>,
}

pub struct TrialEngine {
    page: Arc<dyn Page>,
    service: Arc<dyn CouponService>,
    config: TrialConfig,
}

impl TrialEngine {
    pub fn new(page: Arc<dyn Page>, service: Arc<dyn CouponService>, config: TrialConfig) -> Self {
        Self {
            page,
            service,
            config,
        }
    }

    /// Apply one code and measure the total before and after.
    ///
    /// Never fails: page errors and a missing promo input or apply control
    /// come back as an unattempted trial.
    pub async fn run_trial(
        &self,
        code: &str,
        input: ElementHandle,
        button: Option<ElementHandle>,
    ) -> TrialResult {
        let mut controls = Controls { input, button };
        self.trial(code, &mut controls).await
    }

    async fn trial(&self, code: &str, controls: &mut Controls) -> TrialResult {
        match self.try_trial(code, controls).await {
            Ok(result) => result,
            Err(e) => {
                error!("Error testing coupon '{}': {}", code, e);
                TrialResult::skipped()
            }
        }
    }

    async fn try_trial(
        &self,
        code: &str,
        controls: &mut Controls,
    ) -> Result<TrialResult, PageError> {
        self.clear_applied_code().await?;

        let baseline = read_displayed_total(self.page.as_ref()).await;

        let Some(button) = self.enter_code(code, controls).await? else {
            return Ok(TrialResult::skipped());
        };
        self.page.click(button).await?;
        sleep(self.config.apply_settle).await;

        let total = read_displayed_total(self.page.as_ref()).await;
        debug!("Trial '{}': {:?} -> {:?}", code, baseline, total);

        if let (Some(before), Some(after)) = (baseline, total)
            && after < before
        {
            self.report_savings(before - after).await;
        }

        Ok(TrialResult::observed(total))
    }

    /// Type `code` into the current promo input and return the apply control
    /// to click, `None` when either cannot be found
    async fn enter_code(
        &self,
        code: &str,
        controls: &mut Controls,
    ) -> Result<Option<ElementHandle>, PageError> {
        let Some(input) = self.current_input(controls.input).await else {
            warn!("Promo field is gone, skipping '{}'", code);
            return Ok(None);
        };
        controls.input = input;

        self.page.set_value(input, code).await?;

        let Some(button) = self.current_button(input, controls.button).await else {
            warn!("Could not find apply control after entering '{}'", code);
            controls.button = None;
            return Ok(None);
        };
        controls.button = Some(button);
        Ok(Some(button))
    }

    async fn report_savings(&self, amount: f64) {
        if let Err(e) = self.service.report_savings(amount).await {
            error!("Error tracking savings: {}", e);
        }
    }

    /// Click the first visible remove control, if any; returns whether one was clicked
    async fn clear_applied_code(&self) -> Result<bool, PageError> {
        for handle in self.page.query(ElementQuery::ResetControls).await {
            let Some(control) = self.page.describe(handle).await else {
                continue;
            };
            let label = control.label();
            if control.visible && RESET_TERMS.iter().any(|term| label.contains(term)) {
                debug!("Clearing applied code with {}", handle);
                self.page.click(handle).await?;
                sleep(self.config.reset_settle).await;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The given input if still attached, otherwise a freshly located one
    async fn current_input(&self, input: ElementHandle) -> Option<ElementHandle> {
        if self.page.is_attached(input).await {
            return Some(input);
        }
        debug!("Promo field is stale, locating it again");
        find_promo_field(self.page.as_ref()).await
    }

    /// The given control if still attached, otherwise a freshly located one
    async fn current_button(
        &self,
        input: ElementHandle,
        button: Option<ElementHandle>,
    ) -> Option<ElementHandle> {
        if let Some(button) = button
            && self.page.is_attached(button).await
        {
            return Some(button);
        }
        debug!("Apply control is stale, locating it again");
        find_apply_button(self.page.as_ref(), input).await
    }

    async fn fetch_candidates(&self, domain: &str) -> Vec<CandidateCode> {
        match self.service.fetch_coupons(domain).await {
            Ok(coupons) => coupons,
            Err(e) => {
                error!("Error fetching coupons for {}: {}", domain, e);
                Vec::new()
            }
        }
    }

    async fn report_outcome(&self, domain: &str, outcome: &CouponOutcome) {
        if let Err(e) = self.service.report_outcome(domain, outcome).await {
            error!("Error updating coupon {}: {}", outcome.id, e);
        }
    }

    /// Try every candidate for the page's domain and leave the best one applied
    pub async fn find_best_coupon(&self) -> Option<BestCoupon> {
        let Some(domain) = self.page.hostname().await else {
            warn!("Page has no hostname, cannot look up coupons");
            return None;
        };
        let candidates = self.fetch_candidates(&domain).await;

        let input = find_promo_field(self.page.as_ref()).await?;
        let button = find_apply_button(self.page.as_ref(), input).await?;
        let mut controls = Controls {
            input,
            button: Some(button),
        };

        let baseline = self.trial("", &mut controls).await;
        let Some(initial_total) = baseline.observed_total else {
            info!("No total visible on {}, cannot measure savings", domain);
            return None;
        };

        info!(
            "Testing {} coupons on {} from ${:.2}",
            candidates.len(),
            domain,
            initial_total
        );

        let mut session = TrialSession::new(initial_total);
        for candidate in &candidates {
            let result = self.trial(&candidate.code, &mut controls).await;
            session.last_tested_code = Some(candidate.code.clone());

            if !result.attempted {
                continue;
            }

            let worked = session.record(&candidate.code, result.observed_total);
            info!(
                "Coupon '{}' {} ({:?})",
                candidate.code,
                if worked { "worked" } else { "did not work" },
                result.observed_total
            );
            let outcome =
                CouponOutcome::from_totals(candidate.id, result.observed_total, initial_total);
            self.report_outcome(&domain, &outcome).await;
        }

        if session.needs_reapply() {
            let code = session.best_code.clone().unwrap_or_default();
            match self.reapply(&code, &mut controls).await {
                Ok(true) => {}
                Ok(false) => {
                    error!("Could not find promo field or apply control to reapply '{}'", code);
                    return None;
                }
                Err(e) => {
                    error!("Error reapplying '{}': {}", code, e);
                    return None;
                }
            }
        }

        let best = session.best();
        match &best {
            Some(best) => info!("Best coupon for {}: {} saves ${:.2}", domain, best.code, best.discount),
            None => info!("None of the {} coupons worked on {}", candidates.len(), domain),
        }
        best
    }

    async fn reapply(&self, code: &str, controls: &mut Controls) -> Result<bool, PageError> {
        self.clear_applied_code().await?;

        let Some(button) = self.enter_code(code, controls).await? else {
            return Ok(false);
        };

        self.page.click(button).await?;
        sleep(self.config.apply_settle).await;
        Ok(true)
    }
}
