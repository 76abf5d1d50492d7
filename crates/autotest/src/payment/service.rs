//! HTTP client for the payment gateway.

use super::models::{
    CreateOrderResponse, OrderParams, PaymentEndpoint, PaymentRequest, CHARSET_UTF8,
    SIGN_TYPE_MD5,
};
use crate::config::{self, ConfigManager};
use crate::data::{trade_expire_time, DataGenerator};
use crate::result::{AutomationError, AutomationResult};
use crate::signature::md5_sign;
use chrono::Local;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Per-request timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const PREVIEW_LEN: usize = 500;

fn preview(body: &str) -> String {
    if body.chars().count() > PREVIEW_LEN {
        let cut: String = body.chars().take(PREVIEW_LEN).collect();
        format!("{cut}...")
    } else {
        body.to_string()
    }
}

/// Signed client for `/open/sign/paySign` and `/payment/unifiedorder`
#[derive(Debug)]
pub struct PaymentService {
    base_url: String,
    api_key: String,
    mch_id: Option<String>,
    device_info: Option<String>,
    client: reqwest::Client,
    data: Mutex<DataGenerator>,
}

impl PaymentService {
    /// Service using explicit values where given and the global configuration
    /// otherwise.
    ///
    /// # Errors
    ///
    /// See [`PaymentService::from_config`].
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> AutomationResult<Self> {
        Self::from_config(&config::global::get(), base_url, api_key)
    }

    /// Service reading `api.base_url`, `api.payment.key`,
    /// `api.payment.mch_id` and `api.payment.device_info` from `config`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigKey` when neither an argument nor the configuration
    /// supplies the base URL or key, and `Http` if the client cannot be built.
    pub fn from_config(
        config: &ConfigManager,
        base_url: Option<String>,
        api_key: Option<String>,
    ) -> AutomationResult<Self> {
        let base_url = match base_url.filter(|s| !s.is_empty()) {
            Some(url) => url,
            None => config.require_str("api.base_url").inspect_err(|_| {
                error!("payment base URL is not configured (api.base_url)");
            })?,
        };
        let api_key = match api_key.filter(|s| !s.is_empty()) {
            Some(key) => key,
            None => config.require_str("api.payment.key").inspect_err(|_| {
                error!("payment signing key is not configured (api.payment.key)");
            })?,
        };

        let optional = |key: &str| {
            let value = Some(config.get_str(key, "")).filter(|v| !v.is_empty());
            if value.is_none() {
                warn!(key, "payment setting not configured");
            }
            value
        };
        let mch_id = optional("api.payment.mch_id");
        let device_info = optional("api.payment.device_info");

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            mch_id,
            device_info,
            client,
            data: Mutex::new(DataGenerator::new()),
        })
    }

    /// Replace the random source, e.g. with a seeded one
    #[must_use]
    pub fn with_data_generator(mut self, data: DataGenerator) -> Self {
        self.data = Mutex::new(data);
        self
    }

    /// Base URL without trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Merge generated common fields with `params`; values set in `params`
    /// win.
    pub fn prepare_request(&self, params: &OrderParams) -> PaymentRequest {
        let (nonce, trade_no) = {
            let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
            (data.nonce_str(), data.out_trade_no())
        };

        PaymentRequest {
            mch_id: params.mch_id.clone().or_else(|| self.mch_id.clone()),
            device_info: params.device_info.clone().or_else(|| self.device_info.clone()),
            nonce_str: params.nonce_str.clone().unwrap_or(nonce),
            out_trade_no: Some(params.out_trade_no.clone().unwrap_or(trade_no)),
            trade_expire_time: Some(
                params
                    .trade_expire_time
                    .clone()
                    .unwrap_or_else(|| trade_expire_time(&Local::now())),
            ),
            total_fee: params.total_fee,
            one_data: params.one_data.clone(),
            sub_appid: params.sub_appid.clone(),
            sub_openid: params.sub_openid.clone(),
            pay_type: params.pay_type.clone(),
            attach: params.attach.clone(),
            detail: params.detail.clone(),
            goods_detail: params.goods_detail.clone(),
            notify_url: params.notify_url.clone(),
            return_url: params.return_url.clone(),
            spbill_create_id: params.spbill_create_id.clone(),
            division_flag: params.division_flag.clone(),
            asyn_division_flag: params.asyn_division_flag.clone(),
            charset: params.charset.clone().unwrap_or_else(|| CHARSET_UTF8.to_string()),
            sign_type: params.sign_type.clone().unwrap_or_else(|| SIGN_TYPE_MD5.to_string()),
            app_key: None,
        }
    }

    /// Validate `request` for `endpoint`, convert it to wire form and add
    /// `sign`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for invalid input.
    pub fn signed_body(
        &self,
        request: &PaymentRequest,
        endpoint: PaymentEndpoint,
    ) -> AutomationResult<BTreeMap<String, Value>> {
        request.validate(endpoint).inspect_err(|e| {
            error!(endpoint = endpoint.path(), error = %e, "request parameters rejected");
        })?;
        let mut body = request.to_wire()?;
        let sign = md5_sign(&body, &self.api_key)?;
        debug!(endpoint = endpoint.path(), sign = %sign, "request signed");
        let _ = body.insert("sign".to_string(), Value::String(sign));
        Ok(body)
    }

    async fn post(
        &self,
        endpoint: PaymentEndpoint,
        body: &BTreeMap<String, Value>,
    ) -> AutomationResult<(reqwest::StatusCode, String)> {
        let url = format!("{}{}", self.base_url, endpoint.path());
        debug!(
            url = %url,
            body = %serde_json::to_string(body).unwrap_or_default(),
            "--> POST"
        );

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(url = %url, error = %e, "request failed");
                AutomationError::api_request(format!("request to {} failed: {e}", endpoint.path()))
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            AutomationError::api_request(format!(
                "reading response from {} failed: {e}",
                endpoint.path()
            ))
        })?;
        debug!(status = status.as_u16(), body = %preview(&text), "<-- response");
        Ok((status, text))
    }

    /// Ask the gateway to sign `params`. The response body is the signature.
    ///
    /// # Errors
    ///
    /// - `Validation` for invalid input
    /// - `ApiRequest` for transport failures, non-2xx status (with the
    ///   status) or an empty body
    pub async fn get_payment_sign(&self, params: &OrderParams) -> AutomationResult<String> {
        let endpoint = PaymentEndpoint::PaySign;
        info!(endpoint = endpoint.path(), "requesting payment sign");

        let mut request = self.prepare_request(params);
        request.app_key = Some(self.api_key.clone());
        let body = self.signed_body(&request, endpoint)?;

        let (status, text) = self.post(endpoint, &body).await?;
        if !status.is_success() {
            error!(status = status.as_u16(), body = %preview(&text), "payment sign request rejected");
            return Err(AutomationError::ApiRequest {
                message: format!(
                    "{} returned status {}: {}",
                    endpoint.path(),
                    status.as_u16(),
                    preview(&text)
                ),
                status: Some(status.as_u16()),
            });
        }

        let sign = text.trim();
        if sign.is_empty() {
            error!("payment sign response was empty");
            return Err(AutomationError::api_request(format!(
                "{} returned an empty body",
                endpoint.path()
            )));
        }
        info!(sign_prefix = %sign.chars().take(10).collect::<String>(), "payment sign received");
        Ok(sign.to_string())
    }

    /// Place a unified order. Any HTTP status is accepted; the body must be a
    /// valid [`CreateOrderResponse`].
    ///
    /// # Errors
    ///
    /// - `Validation` for invalid input
    /// - `ApiRequest` for transport failures
    /// - `ApiResponse` if the body is not JSON or fails validation
    pub async fn create_unified_order(
        &self,
        params: &OrderParams,
    ) -> AutomationResult<CreateOrderResponse> {
        let endpoint = PaymentEndpoint::UnifiedOrder;
        info!(endpoint = endpoint.path(), "creating unified order");

        let request = self.prepare_request(params);
        let body = self.signed_body(&request, endpoint)?;

        let (status, text) = self.post(endpoint, &body).await?;
        info!(status = status.as_u16(), "unified order response received");

        let json: Value = serde_json::from_str(&text).map_err(|e| {
            error!(body = %preview(&text), "response is not JSON");
            AutomationError::api_response(format!("response is not valid JSON: {e}"))
        })?;

        let response = CreateOrderResponse::from_json(json.clone()).map_err(|e| {
            error!(body = %json, error = %e, "response failed validation");
            AutomationError::api_response(format!("response failed validation: {e}"))
        })?;
        info!(
            return_code = %response.return_code,
            result_code = ?response.result_code,
            "unified order validated"
        );
        Ok(response)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::payment::models::OneData;

    fn configured() -> ConfigManager {
        let mut config = ConfigManager::empty();
        config.set("api.base_url", "https://pay.test/");
        config.set("api.payment.key", "secret");
        config.set("api.payment.mch_id", "1900000109");
        config.set("api.payment.device_info", "WEB");
        config
    }

    fn params() -> OrderParams {
        OrderParams::new(
            100,
            OneData::default(),
            "WECHAT_JSAPI",
            "https://pay.test/notify",
            "10.0.0.1",
        )
    }

    #[test]
    fn test_from_config() {
        let service = PaymentService::from_config(&configured(), None, None).unwrap();
        assert_eq!(service.base_url(), "https://pay.test");
        assert_eq!(service.mch_id.as_deref(), Some("1900000109"));
    }

    #[test]
    fn test_arguments_override_config() {
        let service = PaymentService::from_config(
            &configured(),
            Some("http://127.0.0.1:9000".into()),
            Some("k2".into()),
        )
        .unwrap();
        assert_eq!(service.base_url(), "http://127.0.0.1:9000");
        assert_eq!(service.api_key, "k2");
    }

    #[test]
    fn test_missing_base_url_or_key() {
        let mut config = ConfigManager::empty();
        config.set("api.payment.key", "secret");
        let err = PaymentService::from_config(&config, None, None).unwrap_err();
        assert!(matches!(err, AutomationError::ConfigKey { ref key } if key == "api.base_url"));

        let err = PaymentService::from_config(&ConfigManager::empty(), Some("https://p.test".into()), None)
            .unwrap_err();
        assert!(matches!(err, AutomationError::ConfigKey { ref key } if key == "api.payment.key"));
    }

    #[test]
    fn test_missing_merchant_is_only_a_warning() {
        let mut config = ConfigManager::empty();
        config.set("api.base_url", "https://pay.test");
        config.set("api.payment.key", "secret");
        let service = PaymentService::from_config(&config, None, None).unwrap();
        let request = service.prepare_request(&params());
        assert_eq!(request.mch_id, None);
        assert!(service
            .signed_body(&request, PaymentEndpoint::UnifiedOrder)
            .is_err());
    }

    #[test]
    fn test_prepare_request_fills_and_overrides() {
        let service = PaymentService::from_config(&configured(), None, None)
            .unwrap()
            .with_data_generator(DataGenerator::seeded(11));
        let mut p = params();
        p.device_info = Some("POS".into());
        p.out_trade_no = Some("ORDER-12345".into());

        let request = service.prepare_request(&p);
        assert_eq!(request.mch_id.as_deref(), Some("1900000109"));
        assert_eq!(request.device_info.as_deref(), Some("POS"));
        assert_eq!(request.out_trade_no.as_deref(), Some("ORDER-12345"));
        assert_eq!(request.nonce_str.len(), 32);
        assert_eq!(request.trade_expire_time.as_ref().map(String::len), Some(14));
        assert_eq!(request.charset, "UTF-8");
        assert_eq!(request.sign_type, "MD5");
    }

    #[test]
    fn test_signed_body_signs_without_app_key() {
        let service = PaymentService::from_config(&configured(), None, None).unwrap();
        let mut request = service.prepare_request(&params());
        request.app_key = Some("secret".into());
        let body = service
            .signed_body(&request, PaymentEndpoint::PaySign)
            .unwrap();

        let mut unsigned = body.clone();
        let sign = unsigned.remove("sign").unwrap();
        let _ = unsigned.remove("appKey");
        assert_eq!(sign, Value::String(md5_sign(&unsigned, "secret").unwrap()));
        assert_eq!(body["appKey"], Value::String("secret".into()));
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(600);
        assert_eq!(preview(&long).len(), 503);
        assert_eq!(preview("short"), "short");
    }
}
