//! Apply-control discovery for a known promo input

use tracing::{debug, info};

use crate::traits::{ElementHandle, ElementQuery, ElementSnapshot, Page};

/// Exact labels an apply control carries
pub const APPLY_LABELS: &[&str] = &[
    "apply",
    "add",
    "submit",
    "ok",
    "apply code",
    "apply coupon",
    "add code",
    "add coupon",
    "submit code",
    "redeem",
];

const MAX_HORIZONTAL_GAP: f64 = 100.0;
const MAX_VERTICAL_OFFSET: f64 = 20.0;
const MAX_FALLBACK_DISTANCE: f64 = 150.0;

/// Which rule picked the control, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    Proximity,
    Attribute,
    Distance,
}

fn has_apply_label(candidate: &ElementSnapshot) -> bool {
    APPLY_LABELS.contains(&candidate.label().as_str())
}

/// Sibling, same parent, or same form and laid out right next to the input
fn is_adjacent(input: &ElementSnapshot, candidate: &ElementSnapshot) -> bool {
    if candidate.previous_sibling == Some(input.handle)
        || candidate.next_sibling == Some(input.handle)
    {
        return true;
    }

    if candidate.parent == input.parent {
        return true;
    }

    // Two elements outside any form count as sharing one
    if candidate.form == input.form
        && let (Some(button), Some(field)) = (candidate.rect, input.rect)
    {
        let horizontal = (button.left - field.right()).abs();
        let vertical = (button.top - field.top).abs();
        return horizontal < MAX_HORIZONTAL_GAP && vertical < MAX_VERTICAL_OFFSET;
    }

    false
}

fn has_apply_attribute(candidate: &ElementSnapshot) -> bool {
    let attr = |name: &str| candidate.attr(name).unwrap_or_default().to_lowercase();
    let aria_label = attr("aria-label");
    let data_action = attr("data-action");
    let data_testid = attr("data-testid");

    ["apply", "add", "submit"]
        .iter()
        .any(|term| aria_label.contains(term))
        || ["apply", "add"]
            .iter()
            .any(|term| data_action.contains(term) || data_testid.contains(term))
}

fn nearest(input: &ElementSnapshot, candidates: &[ElementSnapshot]) -> Option<ElementHandle> {
    let field = input.rect?;
    let mut best: Option<(ElementHandle, f64)> = None;

    for candidate in candidates {
        let Some(rect) = candidate.rect else {
            continue;
        };
        let distance = field.corner_distance(&rect);
        if distance > MAX_FALLBACK_DISTANCE {
            continue;
        }
        if best.is_none_or(|(_, closest)| distance < closest) {
            best = Some((candidate.handle, distance));
        }
    }

    best.map(|(handle, _)| handle)
}

/// Pick the apply control for `input` among labelled candidates.
///
/// Proximity beats attributes, attributes beat raw distance; within a tier
/// the first candidate in document order wins.
pub fn select_apply_button(
    input: &ElementSnapshot,
    candidates: &[ElementSnapshot],
) -> Option<(ElementHandle, MatchTier)> {
    let labelled: Vec<ElementSnapshot> = candidates
        .iter()
        .filter(|c| c.handle != input.handle && has_apply_label(c))
        .cloned()
        .collect();

    if let Some(button) = labelled.iter().find(|c| is_adjacent(input, c)) {
        return Some((button.handle, MatchTier::Proximity));
    }

    if let Some(button) = labelled.iter().find(|c| has_apply_attribute(c)) {
        return Some((button.handle, MatchTier::Attribute));
    }

    nearest(input, &labelled).map(|handle| (handle, MatchTier::Distance))
}

pub async fn find_apply_button(page: &dyn Page, input: ElementHandle) -> Option<ElementHandle> {
    let Some(field) = page.describe(input).await else {
        debug!("Promo field {} is gone, no apply control to look for", input);
        return None;
    };

    let mut candidates = Vec::new();
    for handle in page.query(ElementQuery::Clickables).await {
        if let Some(candidate) = page.describe(handle).await {
            candidates.push(candidate);
        }
    }

    match select_apply_button(&field, &candidates) {
        Some((handle, tier)) => {
            info!("Found apply control {} for {} ({:?} match)", handle, input, tier);
            Some(handle)
        }
        None => {
            debug!("No apply control for {}", input);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::HtmlPage;
    use crate::traits::Rect;

    async fn locate(page: &HtmlPage, input_id: &str) -> Option<String> {
        let input = page.document().await.find_by_id(input_id)?;
        let handle = find_apply_button(page, input).await?;
        page.describe(handle)
            .await
            .and_then(|s| s.attr("id").map(str::to_string))
    }

    #[tokio::test]
    async fn proximate_apply_beats_distant_attribute_match() {
        let page = HtmlPage::parse(
            "https://shop.example/cart",
            r#"<html><body>
                <nav><a id="far" href="/rewards" aria-label="Apply rewards">Redeem</a></nav>
                <div class="promo"><input id="code" name="coupon"><button id="near">Apply</button></div>
            </body></html>"#,
        );
        assert_eq!(locate(&page, "code").await.as_deref(), Some("near"));
    }

    #[tokio::test]
    async fn label_match_is_exact() {
        let page = HtmlPage::parse(
            "https://shop.example/cart",
            r#"<html><body><div>
                <input id="code"><button id="many">Apply coupons</button>
            </div></body></html>"#,
        );
        assert_eq!(locate(&page, "code").await, None);
    }

    #[tokio::test]
    async fn input_value_serves_as_label() {
        let page = HtmlPage::parse(
            "https://shop.example/cart",
            r#"<html><body><div>
                <input id="code"><input id="go" type="submit" value=" OK ">
            </div></body></html>"#,
        );
        assert_eq!(locate(&page, "code").await.as_deref(), Some("go"));
    }

    #[tokio::test]
    async fn attribute_tier_used_when_nothing_is_adjacent() {
        let page = HtmlPage::parse(
            "https://shop.example/cart",
            r#"<html><body>
                <form><div><input id="code"></div></form>
                <section><button id="plain">Submit</button></section>
                <section><div role="button" id="tagged" data-testid="promo-apply">Apply</div></section>
            </body></html>"#,
        );
        assert_eq!(locate(&page, "code").await.as_deref(), Some("tagged"));
    }

    #[tokio::test]
    async fn same_form_needs_to_sit_next_to_the_input() {
        let mut page = HtmlPage::parse(
            "https://shop.example/cart",
            r#"<html><body><form>
                <div><input id="code"></div>
                <div><button id="beside">Apply</button></div>
            </form></body></html>"#,
        );
        let document = page.document_mut();
        let input = document.find_by_id("code").unwrap();
        let button = document.find_by_id("beside").unwrap();
        document.set_rect(input, Rect::new(10.0, 100.0, 200.0, 30.0));
        document.set_rect(button, Rect::new(260.0, 110.0, 80.0, 30.0));
        assert_eq!(locate(&page, "code").await.as_deref(), Some("beside"));

        page.document_mut()
            .set_rect(button, Rect::new(260.0, 140.0, 80.0, 30.0));
        // too low for proximity, too far for the distance fallback
        assert_eq!(locate(&page, "code").await, None);
    }

    #[test]
    fn distance_fallback_picks_closest_within_range() {
        let input = ElementSnapshot {
            handle: ElementHandle(1),
            parent: Some(ElementHandle(10)),
            form: Some(ElementHandle(20)),
            rect: Some(Rect::new(0.0, 0.0, 100.0, 20.0)),
            ..ElementSnapshot::default()
        };
        let button = |id: u64, left: f64, top: f64| ElementSnapshot {
            handle: ElementHandle(id),
            text: "Add".to_string(),
            parent: Some(ElementHandle(11)),
            form: Some(ElementHandle(21)),
            rect: Some(Rect::new(left, top, 40.0, 20.0)),
            ..ElementSnapshot::default()
        };

        let candidates = vec![button(2, 0.0, 140.0), button(3, 90.0, 60.0), button(4, 400.0, 0.0)];
        assert_eq!(
            select_apply_button(&input, &candidates),
            Some((ElementHandle(3), MatchTier::Distance))
        );

        let out_of_range = vec![button(4, 400.0, 0.0), button(5, 0.0, 151.0)];
        assert_eq!(select_apply_button(&input, &out_of_range), None);
    }
}
