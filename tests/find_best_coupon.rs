use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use coupon_scout::models::{CouponOutcome, NewCoupon};
use coupon_scout::page::PageEvent;
use coupon_scout::{
    ApiError, BestCoupon, CandidateCode, CouponService, DiscountType, ElementHandle, HtmlPage,
    Page, TrialConfig, TrialEngine,
};

const BASE_TOTAL: f64 = 50.0;

const CHECKOUT: &str = r#"<html><body>
    <h1>Checkout</h1>
    <div id="summary">Total <span id="total">$50.00</span></div>
    <div id="promo-box">
      <input id="promo" placeholder="Promo code">
      <button id="apply">Apply</button>
    </div>
</body></html>"#;

#[derive(Default)]
struct FakeService {
    coupons: Vec<CandidateCode>,
    unavailable: bool,
    outcomes: Mutex<Vec<CouponOutcome>>,
    savings: Mutex<Vec<f64>>,
}

impl FakeService {
    fn with_codes(codes: &[&str]) -> Arc<Self> {
        let coupons = codes
            .iter()
            .enumerate()
            .map(|(i, code)| CandidateCode {
                id: i as i64 + 1,
                code: (*code).to_string(),
                discount_amount: None,
                discount_type: DiscountType::Dollar,
                ttl: None,
            })
            .collect();
        Arc::new(Self {
            coupons,
            ..Self::default()
        })
    }

    fn reported_ids(&self) -> Vec<i64> {
        self.outcomes.lock().unwrap().iter().map(|o| o.id).collect()
    }
}

#[async_trait]
impl CouponService for FakeService {
    async fn fetch_coupons(&self, _domain: &str) -> Result<Vec<CandidateCode>, ApiError> {
        if self.unavailable {
            return Err(ApiError::UnexpectedStatus {
                status: 503,
                url: "http://coupons.test/api/coupons/shop.example".to_string(),
            });
        }
        Ok(self.coupons.clone())
    }

    async fn submit_coupon(&self, _coupon: &NewCoupon) -> Result<(), ApiError> {
        Ok(())
    }

    async fn report_outcome(&self, _domain: &str, outcome: &CouponOutcome) -> Result<(), ApiError> {
        self.outcomes.lock().unwrap().push(outcome.clone());
        Ok(())
    }

    async fn report_savings(&self, amount_saved: f64) -> Result<(), ApiError> {
        self.savings.lock().unwrap().push(amount_saved);
        Ok(())
    }
}

struct Cart {
    page: Arc<HtmlPage>,
    input: ElementHandle,
    button: ElementHandle,
}

fn handles(page: &mut HtmlPage) -> (ElementHandle, ElementHandle, ElementHandle) {
    let document = page.document_mut();
    (
        document.find_by_id("promo").unwrap(),
        document.find_by_id("apply").unwrap(),
        document.find_by_id("total").unwrap(),
    )
}

fn price(total: f64) -> String {
    format!("${total:.2}")
}

/// A cart whose total is recomputed from the entered code when Apply is clicked
fn cart(html: &str, totals: &[(&'static str, f64)]) -> Cart {
    let mut page = HtmlPage::parse("https://shop.example/checkout", html);
    let (input, button, total) = handles(&mut page);
    let totals: HashMap<&'static str, f64> = totals.iter().copied().collect();

    page.on_click(button, move |document| {
        let code = document.value(input).unwrap_or_default();
        let amount = totals.get(code).copied().unwrap_or(BASE_TOTAL);
        document.set_text(total, &price(amount));
    });

    Cart {
        page: Arc::new(page),
        input,
        button,
    }
}

fn engine(cart: &Cart, service: &Arc<FakeService>) -> TrialEngine {
    TrialEngine::new(cart.page.clone(), service.clone(), TrialConfig::immediate())
}

async fn apply_clicks(cart: &Cart) -> usize {
    let document = cart.page.document().await;
    document
        .clicks()
        .iter()
        .filter(|h| **h == cart.button)
        .count()
}

async fn entered_code(cart: &Cart) -> String {
    cart.page
        .document()
        .await
        .value(cart.input)
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn lowest_total_wins_and_stays_applied() {
    let cart = cart(CHECKOUT, &[("A", 45.0), ("B", 40.0)]);
    let service = FakeService::with_codes(&["A", "B"]);

    let best = engine(&cart, &service).find_best_coupon().await;

    assert_eq!(
        best,
        Some(BestCoupon {
            code: "B".to_string(),
            discount: 10.0
        })
    );
    assert_eq!(entered_code(&cart).await, "B");
    // Baseline plus one click per candidate, nothing to re-apply
    assert_eq!(apply_clicks(&cart).await, 3);
    assert!(cart.page.visible_text().await.contains("$40.00"));

    let outcomes = service.outcomes.lock().unwrap().clone();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.worked));
}

#[tokio::test]
async fn tie_keeps_the_earlier_code_and_reapplies_it() {
    let cart = cart(CHECKOUT, &[("A", 45.0), ("B", 45.0)]);
    let service = FakeService::with_codes(&["A", "B"]);

    let best = engine(&cart, &service).find_best_coupon().await.unwrap();

    assert_eq!(best.code, "A");
    assert_eq!(best.discount, 5.0);
    assert_eq!(entered_code(&cart).await, "A");
    assert_eq!(apply_clicks(&cart).await, 4);
}

#[tokio::test]
async fn earlier_best_is_reapplied_after_a_worse_code() {
    let cart = cart(CHECKOUT, &[("A", 40.0), ("B", 48.0), ("C", 60.0)]);
    let service = FakeService::with_codes(&["A", "B", "C"]);

    let best = engine(&cart, &service).find_best_coupon().await.unwrap();

    assert_eq!(best.code, "A");
    assert_eq!(best.discount, 10.0);
    assert_eq!(entered_code(&cart).await, "A");
    assert!(cart.page.visible_text().await.contains("$40.00"));

    let worked: Vec<bool> = service
        .outcomes
        .lock()
        .unwrap()
        .iter()
        .map(|o| o.worked)
        .collect();
    assert_eq!(worked, vec![true, true, false]);
}

#[tokio::test]
async fn no_working_code_reports_none() {
    let cart = cart(CHECKOUT, &[("A", 50.0)]);
    let service = FakeService::with_codes(&["A", "B"]);

    assert_eq!(engine(&cart, &service).find_best_coupon().await, None);
    assert_eq!(service.reported_ids(), vec![1, 2]);
    assert!(service.savings.lock().unwrap().is_empty());
}

#[tokio::test]
async fn page_without_total_tries_nothing() {
    let html = CHECKOUT.replace("$50.00", "calculated at next step");
    let page = Arc::new(HtmlPage::parse("https://shop.example/checkout", &html));
    let service = FakeService::with_codes(&["A"]);

    let engine = TrialEngine::new(page.clone(), service.clone(), TrialConfig::immediate());

    assert_eq!(engine.find_best_coupon().await, None);
    assert!(service.outcomes.lock().unwrap().is_empty());
    // Only the empty baseline code was ever entered
    assert_eq!(page.document().await.clicks().len(), 1);
}

#[tokio::test]
async fn page_without_apply_control_tries_nothing() {
    let html = CHECKOUT.replace(r#"<button id="apply">Apply</button>"#, "");
    let page = Arc::new(HtmlPage::parse("https://shop.example/checkout", &html));
    let service = FakeService::with_codes(&["A"]);

    let engine = TrialEngine::new(page.clone(), service.clone(), TrialConfig::immediate());

    assert_eq!(engine.find_best_coupon().await, None);
    assert!(service.outcomes.lock().unwrap().is_empty());
    assert!(page.document().await.clicks().is_empty());
}

#[tokio::test]
async fn unreachable_service_means_no_candidates() {
    let cart = cart(CHECKOUT, &[("A", 40.0)]);
    let service = Arc::new(FakeService {
        unavailable: true,
        ..FakeService::default()
    });

    assert_eq!(engine(&cart, &service).find_best_coupon().await, None);
    assert!(service.outcomes.lock().unwrap().is_empty());
    // Only the baseline trial ran
    assert_eq!(apply_clicks(&cart).await, 1);
}

#[tokio::test]
async fn repeated_runs_find_the_same_code() {
    let cart = cart(CHECKOUT, &[("A", 45.0), ("B", 40.0), ("C", 42.0)]);
    let service = FakeService::with_codes(&["A", "B", "C"]);
    let engine = engine(&cart, &service);

    let first = engine.find_best_coupon().await;
    let second = engine.find_best_coupon().await;

    assert_eq!(first, second);
    assert_eq!(first.map(|b| b.code).as_deref(), Some("B"));
    assert_eq!(entered_code(&cart).await, "B");
}

#[tokio::test]
async fn applied_code_is_removed_before_each_trial() {
    let html = CHECKOUT.replace(
        r#"<div id="promo-box">"#,
        r#"<a id="remove" href="/cart/discount/remove">Remove</a><div id="promo-box">"#,
    );
    let mut page = HtmlPage::parse("https://shop.example/checkout", &html);
    let (input, button, total) = handles(&mut page);
    let remove = page.document_mut().find_by_id("remove").unwrap();

    page.on_click(button, move |document| {
        let amount = match document.value(input).unwrap_or_default() {
            "A" => 45.0,
            _ => BASE_TOTAL,
        };
        document.set_text(total, &price(amount));
    });
    page.on_click(remove, move |document| {
        document.set_text(total, &price(BASE_TOTAL));
    });

    let page = Arc::new(page);
    let service = FakeService::with_codes(&["A"]);
    let engine = TrialEngine::new(page.clone(), service.clone(), TrialConfig::immediate());

    let best = engine.find_best_coupon().await.unwrap();

    assert_eq!(best.code, "A");
    assert_eq!(page.document().await.clicks(), &[remove, button, remove, button]);
    assert_eq!(*service.savings.lock().unwrap(), vec![5.0]);
}

#[tokio::test]
async fn stale_apply_control_is_located_again() {
    let mut page = HtmlPage::parse("https://shop.example/checkout", CHECKOUT);
    let (input, button, total) = handles(&mut page);
    let promo_box = page.document_mut().find_by_id("promo-box").unwrap();

    // The host re-renders the control on every keystroke and recomputes the
    // total on change
    page.on(input, PageEvent::Change, move |document| {
        let amount = match document.value(input).unwrap_or_default() {
            "A" => 45.0,
            "B" => 40.0,
            _ => BASE_TOTAL,
        };
        document.set_text(total, &price(amount));
        if let Some(current) = document.find_by_id("apply") {
            document.remove(current);
        }
        document.append_html(promo_box, r#"<button id="apply">Apply</button>"#);
    });

    let page = Arc::new(page);
    let service = FakeService::with_codes(&["A", "B"]);
    let engine = TrialEngine::new(page.clone(), service.clone(), TrialConfig::immediate());

    let best = engine.find_best_coupon().await.unwrap();
    assert_eq!(best.code, "B");
    assert_eq!(service.reported_ids(), vec![1, 2]);

    let document = page.document().await;
    let clicks = document.clicks();
    assert_eq!(clicks.len(), 3);
    assert!(!clicks.contains(&button));
    assert!(document.is_attached(*clicks.last().unwrap()));
}

#[tokio::test]
async fn vanished_apply_control_skips_that_code() {
    let mut page = HtmlPage::parse("https://shop.example/checkout", CHECKOUT);
    let (input, _, total) = handles(&mut page);
    let promo_box = page.document_mut().find_by_id("promo-box").unwrap();

    // Entering "B" makes the apply control disappear until another code is typed
    page.on(input, PageEvent::Change, move |document| {
        if let Some(current) = document.find_by_id("apply") {
            document.remove(current);
        }
        let amount = match document.value(input).unwrap_or_default() {
            "B" => return,
            "A" => 45.0,
            "C" => 40.0,
            _ => BASE_TOTAL,
        };
        document.set_text(total, &price(amount));
        document.append_html(promo_box, r#"<button id="apply">Apply</button>"#);
    });

    let page = Arc::new(page);
    let service = FakeService::with_codes(&["A", "B", "C"]);
    let engine = TrialEngine::new(page.clone(), service.clone(), TrialConfig::immediate());

    let best = engine.find_best_coupon().await.unwrap();

    assert_eq!(best.code, "C");
    assert_eq!(best.discount, 10.0);
    assert_eq!(service.reported_ids(), vec![1, 3]);
}

#[tokio::test]
async fn rerendered_promo_field_is_located_again() {
    let mut page = HtmlPage::parse("https://shop.example/checkout", CHECKOUT);
    let (input, button, total) = handles(&mut page);
    let promo_box = page.document_mut().find_by_id("promo-box").unwrap();

    // Applying a code re-renders the form with a fresh, empty input
    page.on_click(button, move |document| {
        let Some(current) = document.find_by_id("promo") else {
            return;
        };
        let amount = match document.value(current).unwrap_or_default() {
            "A" => 45.0,
            "B" => 40.0,
            _ => BASE_TOTAL,
        };
        document.set_text(total, &price(amount));
        document.remove(current);
        document.append_html(promo_box, r#"<input id="promo" placeholder="Promo code">"#);
    });

    let page = Arc::new(page);
    let service = FakeService::with_codes(&["A", "B"]);
    let engine = TrialEngine::new(page.clone(), service.clone(), TrialConfig::immediate());

    let best = engine.find_best_coupon().await.unwrap();

    assert_eq!(best.code, "B");
    assert_eq!(best.discount, 10.0);
    assert_eq!(service.reported_ids(), vec![1, 2]);

    let document = page.document().await;
    assert!(!document.is_attached(input));
    assert_eq!(document.clicks(), &[button, button, button]);
}

#[tokio::test]
async fn best_code_repeated_last_is_not_reapplied() {
    let mut page = HtmlPage::parse("https://shop.example/checkout", CHECKOUT);
    let (input, button, total) = handles(&mut page);
    let applications = AtomicUsize::new(0);

    // A only discounts the first time it is applied
    page.on_click(button, move |document| {
        let amount = match document.value(input).unwrap_or_default() {
            "A" if applications.fetch_add(1, Ordering::SeqCst) == 0 => 45.0,
            "B" => 48.0,
            _ => BASE_TOTAL,
        };
        document.set_text(total, &price(amount));
    });

    let page = Arc::new(page);
    let service = FakeService::with_codes(&["A", "B", "A"]);
    let engine = TrialEngine::new(page.clone(), service.clone(), TrialConfig::immediate());

    let best = engine.find_best_coupon().await.unwrap();

    assert_eq!(best.code, "A");
    assert_eq!(best.discount, 5.0);

    let worked: Vec<bool> = service
        .outcomes
        .lock()
        .unwrap()
        .iter()
        .map(|o| o.worked)
        .collect();
    assert_eq!(worked, vec![true, true, false]);

    // Baseline plus three candidates; the repeat of A counts as the best
    // being last, so the page keeps the undiscounted total
    assert_eq!(page.document().await.clicks().len(), 4);
    assert!(page.visible_text().await.contains("$50.00"));
}
