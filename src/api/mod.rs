//! HTTP client for the remote coupon database.
//!
//! Every call except the identity bootstrap carries an `X-User-ID` header.
//! The id is fetched once from `GET /user-id`, persisted through the
//! [`PreferenceStore`] and reused from then on.

mod error;

pub use error::ApiError;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::database::PreferenceStore;
use crate::models::{
    CandidateCode, CouponList, CouponOutcome, ErrorBody, NewCoupon, SavingsReport, UserIdResponse,
};
use crate::traits::CouponService;

pub const USER_ID_HEADER: &str = "X-User-ID";

pub struct CouponClient {
    client: Client,
    base_url: String,
    store: PreferenceStore,
    user_id: Mutex<Option<String>>,
}

impl CouponClient {
    pub fn new(base_url: impl Into<String>, store: PreferenceStore) -> Result<Self, ApiError> {
        let client = Client::builder().build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
            user_id: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn coupons_endpoint(&self, domain: &str) -> String {
        self.endpoint(&format!("coupons/{}", urlencoding::encode(domain)))
    }

    /// The user id, bootstrapping one on first use
    pub async fn user_id(&self) -> Result<String, ApiError> {
        let mut cached = self.user_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        match self.store.user_id().await {
            Ok(Some(id)) => {
                *cached = Some(id.clone());
                return Ok(id);
            }
            Ok(None) => {}
            Err(e) => warn!("Could not read stored user id: {}", e),
        }

        let id = self
            .request_user_id()
            .await
            .map_err(|e| ApiError::Identity(e.to_string()))?;

        if let Err(e) = self.store.save_user_id(&id).await {
            warn!("Could not persist user id: {}", e);
        }

        info!("Obtained new user id");
        *cached = Some(id.clone());
        Ok(id)
    }

    async fn request_user_id(&self) -> Result<String, ApiError> {
        let url = self.endpoint("user-id");
        let response = Self::check(self.client.get(&url).send().await?, &url).await?;
        let body: UserIdResponse = response.json().await?;
        Ok(body.user_id)
    }

    async fn authed(&self, method: Method, url: &str) -> Result<RequestBuilder, ApiError> {
        let user_id = self.user_id().await?;
        Ok(self
            .client
            .request(method, url)
            .header(USER_ID_HEADER, user_id)
            .header(CONTENT_TYPE, "application/json"))
    }

    /// Map non-2xx responses to errors, preferring the service's own message
    async fn check(response: Response, url: &str) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match response.json::<ErrorBody>().await {
            Ok(body) => Err(ApiError::Rejected(body.error)),
            Err(_) => Err(ApiError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            }),
        }
    }
}

#[async_trait]
impl CouponService for CouponClient {
    async fn fetch_coupons(&self, domain: &str) -> Result<Vec<CandidateCode>, ApiError> {
        let url = self.coupons_endpoint(domain);
        let response = self.authed(Method::GET, &url).await?.send().await?;

        // Unknown domains have no coupons yet
        if response.status() == StatusCode::NOT_FOUND {
            debug!("No coupon record for {}", domain);
            return Ok(Vec::new());
        }

        let list: CouponList = Self::check(response, &url).await?.json().await?;
        info!("Fetched {} coupons for {}", list.coupons.len(), domain);
        Ok(list.coupons)
    }

    async fn submit_coupon(&self, coupon: &NewCoupon) -> Result<(), ApiError> {
        let url = self.endpoint("coupons");
        let response = self
            .authed(Method::POST, &url)
            .await?
            .json(coupon)
            .send()
            .await?;
        Self::check(response, &url).await?;
        info!("Submitted coupon {} for {}", coupon.code, coupon.domain);
        Ok(())
    }

    async fn report_outcome(&self, domain: &str, outcome: &CouponOutcome) -> Result<(), ApiError> {
        let url = self.coupons_endpoint(domain);
        let response = self
            .authed(Method::PUT, &url)
            .await?
            .json(outcome)
            .send()
            .await?;
        Self::check(response, &url).await?;
        debug!("Reported coupon {} worked={}", outcome.id, outcome.worked);
        Ok(())
    }

    async fn report_savings(&self, amount_saved: f64) -> Result<(), ApiError> {
        let url = self.endpoint("analytics/savings");
        let response = self
            .authed(Method::POST, &url)
            .await?
            .json(&SavingsReport { amount_saved })
            .send()
            .await?;
        Self::check(response, &url).await?;
        debug!("Reported ${:.2} saved", amount_saved);
        Ok(())
    }
}
