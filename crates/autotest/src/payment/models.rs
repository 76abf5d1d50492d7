//! Payment request and response models.

use crate::result::{AutomationError, AutomationResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use url::Url;

/// Loose IPv4 shape for `spbill_create_id`
pub const IP_ADDRESS_PATTERN: &str = r"^(?:[0-9]{1,3}\.){3}[0-9]{1,3}$";
/// The only accepted charset
pub const CHARSET_UTF8: &str = "UTF-8";
/// The only accepted sign type
pub const SIGN_TYPE_MD5: &str = "MD5";

fn ip_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(IP_ADDRESS_PATTERN).unwrap()
    })
}

/// One line of `one_data.goodsDetail`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoodsDetailItem {
    pub category: String,
    pub sp_name: String,
    pub tax_rate: f64,
    pub total_amount: f64,
    pub need_deduction: i64,
    pub sort_no: i64,
    pub order_item_id: String,
}

/// Business payload sent as a JSON string in `one_data`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneData {
    pub one_user_id: String,
    pub consume_scene_id: String,
    pub biz_account_id: String,
    pub custom_param: Option<String>,
    pub goods_detail: Vec<GoodsDetailItem>,
}

/// What a test supplies for an order. The service adds the common fields
/// (merchant, nonce, order number, expiry, charset, sign type); any
/// `Some` override here replaces the generated value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderParams {
    /// Amount in cents
    pub total_fee: i64,
    pub one_data: OneData,
    pub sub_appid: Option<String>,
    pub sub_openid: Option<String>,
    pub pay_type: String,
    pub attach: Option<String>,
    pub detail: Option<String>,
    pub goods_detail: Option<String>,
    pub notify_url: String,
    pub return_url: Option<String>,
    /// Client IP
    pub spbill_create_id: String,
    pub division_flag: Option<String>,
    pub asyn_division_flag: Option<String>,

    pub mch_id: Option<String>,
    pub device_info: Option<String>,
    pub nonce_str: Option<String>,
    pub out_trade_no: Option<String>,
    pub trade_expire_time: Option<String>,
    pub charset: Option<String>,
    pub sign_type: Option<String>,
}

impl OrderParams {
    /// Order with the required business fields
    #[must_use]
    pub fn new(
        total_fee: i64,
        one_data: OneData,
        pay_type: impl Into<String>,
        notify_url: impl Into<String>,
        spbill_create_id: impl Into<String>,
    ) -> Self {
        Self {
            total_fee,
            one_data,
            pay_type: pay_type.into(),
            notify_url: notify_url.into(),
            spbill_create_id: spbill_create_id.into(),
            ..Self::default()
        }
    }

    /// Set the sub-merchant app and user
    #[must_use]
    pub fn sub_account(mut self, appid: impl Into<String>, openid: impl Into<String>) -> Self {
        self.sub_appid = Some(appid.into());
        self.sub_openid = Some(openid.into());
        self
    }

    /// Set the post-payment redirect
    #[must_use]
    pub fn return_url(mut self, url: impl Into<String>) -> Self {
        self.return_url = Some(url.into());
        self
    }

    /// Set the attach field
    #[must_use]
    pub fn attach(mut self, attach: impl Into<String>) -> Self {
        self.attach = Some(attach.into());
        self
    }
}

/// Which endpoint a request is validated for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEndpoint {
    /// `/open/sign/paySign`: needs `appKey`
    PaySign,
    /// `/payment/unifiedorder`: needs an order number
    UnifiedOrder,
}

impl PaymentEndpoint {
    /// Path below the base URL
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::PaySign => "/open/sign/paySign",
            Self::UnifiedOrder => "/payment/unifiedorder",
        }
    }

    const fn model_name(self) -> &'static str {
        match self {
            Self::PaySign => "GetSignRequest",
            Self::UnifiedOrder => "CreateOrderRequest",
        }
    }
}

/// Fully merged request, before wire conversion and signing
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub mch_id: Option<String>,
    pub device_info: Option<String>,
    pub nonce_str: String,
    pub out_trade_no: Option<String>,
    pub trade_expire_time: Option<String>,
    pub total_fee: i64,
    pub one_data: OneData,
    pub sub_appid: Option<String>,
    pub sub_openid: Option<String>,
    pub pay_type: String,
    pub attach: Option<String>,
    pub detail: Option<String>,
    pub goods_detail: Option<String>,
    pub notify_url: String,
    pub return_url: Option<String>,
    pub spbill_create_id: String,
    pub division_flag: Option<String>,
    pub asyn_division_flag: Option<String>,
    pub charset: String,
    pub sign_type: String,
    #[serde(rename = "appKey")]
    pub app_key: Option<String>,
}

fn check_http_url(field: &str, raw: &str, errors: &mut Vec<String>) {
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
        Ok(url) => errors.push(format!("{field}: unsupported URL scheme '{}'", url.scheme())),
        Err(e) => errors.push(format!("{field}: invalid URL ({e})")),
    }
}

fn is_blank(value: Option<&String>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

impl PaymentRequest {
    /// Check the request against the rules of `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` listing every failing field.
    pub fn validate(&self, endpoint: PaymentEndpoint) -> AutomationResult<()> {
        let mut errors = Vec::new();

        if is_blank(self.mch_id.as_ref()) {
            errors.push("mch_id: field required".to_string());
        }
        let nonce_len = self.nonce_str.chars().count();
        if !(1..=32).contains(&nonce_len) {
            errors.push(format!("nonce_str: length must be 1-32, got {nonce_len}"));
        }
        if self.total_fee <= 0 {
            errors.push(format!("total_fee: must be greater than 0, got {}", self.total_fee));
        }
        if self.pay_type.trim().is_empty() {
            errors.push("pay_type: field required".to_string());
        }
        check_http_url("notify_url", &self.notify_url, &mut errors);
        if let Some(url) = &self.return_url {
            check_http_url("return_url", url, &mut errors);
        }
        if !ip_pattern().is_match(&self.spbill_create_id) {
            errors.push(format!(
                "spbill_create_id: '{}' is not an IPv4 address",
                self.spbill_create_id
            ));
        }
        if self.charset != CHARSET_UTF8 {
            errors.push(format!("charset: must be {CHARSET_UTF8}, got '{}'", self.charset));
        }
        if self.sign_type != SIGN_TYPE_MD5 {
            errors.push(format!("sign_type: must be {SIGN_TYPE_MD5}, got '{}'", self.sign_type));
        }

        match endpoint {
            PaymentEndpoint::PaySign => {
                if is_blank(self.app_key.as_ref()) {
                    errors.push("appKey: field required".to_string());
                }
            }
            PaymentEndpoint::UnifiedOrder => {
                match self.out_trade_no.as_deref().map(|s| s.chars().count()) {
                    None => errors.push("out_trade_no: field required".to_string()),
                    Some(n) if !(5..=32).contains(&n) => {
                        errors.push(format!("out_trade_no: length must be 5-32, got {n}"));
                    }
                    Some(_) => {}
                }
                if let Some(t) = &self.trade_expire_time {
                    if t.len() != 14 || !t.chars().all(|c| c.is_ascii_digit()) {
                        errors.push(format!(
                            "trade_expire_time: '{t}' is not YYYYMMDDHHMMSS"
                        ));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AutomationError::Validation {
                model: endpoint.model_name().to_string(),
                errors,
            })
        }
    }

    /// Flat string map as posted: `one_data` as a JSON string, `total_fee`
    /// as a decimal string, unset fields omitted.
    ///
    /// # Errors
    ///
    /// Returns `Json` if `one_data` cannot be serialized.
    pub fn to_wire(&self) -> AutomationResult<BTreeMap<String, Value>> {
        let mut wire = BTreeMap::new();
        let mut put = |key: &str, value: Option<&str>| {
            if let Some(v) = value {
                let _ = wire.insert(key.to_string(), Value::String(v.to_string()));
            }
        };

        put("mch_id", self.mch_id.as_deref());
        put("device_info", self.device_info.as_deref());
        put("nonce_str", Some(self.nonce_str.as_str()));
        put("out_trade_no", self.out_trade_no.as_deref());
        put("trade_expire_time", self.trade_expire_time.as_deref());
        put("total_fee", Some(self.total_fee.to_string().as_str()));
        let one_data = serde_json::to_string(&self.one_data)?;
        put("one_data", Some(one_data.as_str()));
        put("sub_appid", self.sub_appid.as_deref());
        put("sub_openid", self.sub_openid.as_deref());
        put("pay_type", Some(self.pay_type.as_str()));
        put("attach", self.attach.as_deref());
        put("detail", self.detail.as_deref());
        put("goods_detail", self.goods_detail.as_deref());
        put("notify_url", Some(self.notify_url.as_str()));
        put("return_url", self.return_url.as_deref());
        put("spbill_create_id", Some(self.spbill_create_id.as_str()));
        put("division_flag", self.division_flag.as_deref());
        put("asyn_division_flag", self.asyn_division_flag.as_deref());
        put("charset", Some(self.charset.as_str()));
        put("sign_type", Some(self.sign_type.as_str()));
        put("appKey", self.app_key.as_deref());

        Ok(wire)
    }
}

/// Business outcome of an order call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResultCode {
    Success,
    Fail,
    Failed,
}

/// Error codes come back as either strings or numbers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrCode {
    Text(String),
    Number(i64),
}

impl fmt::Display for ErrCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// `/payment/unifiedorder` response
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    /// Transport outcome: `SUCCESS` or `FAIL`
    pub return_code: String,
    pub return_msg: Option<String>,
    pub result_code: Option<ResultCode>,
    pub err_code: Option<ErrCode>,
    pub err_msg: Option<String>,
    pub appid: Option<String>,
    pub mch_id: Option<String>,
    pub sub_appid: Option<String>,
    pub sub_mch_id: Option<String>,
    pub nonce_str: Option<String>,
    pub sign: Option<String>,
    pub pay_url: Option<String>,
}

impl CreateOrderResponse {
    /// Deserialize and check consistency.
    ///
    /// # Errors
    ///
    /// Returns `Json` for a shape mismatch and `Validation` for a
    /// consistency failure.
    pub fn from_json(value: Value) -> AutomationResult<Self> {
        let response: Self = serde_json::from_value(value)?;
        response.validate()?;
        Ok(response)
    }

    /// Check field consistency:
    ///
    /// - `return_code == SUCCESS` requires `result_code`
    /// - `result_code == SUCCESS` requires `pay_url`
    /// - `result_code` `FAIL`/`FAILED` requires `err_code` and `err_msg`
    ///
    /// # Errors
    ///
    /// Returns `Validation` listing the violations.
    pub fn validate(&self) -> AutomationResult<()> {
        let mut errors = Vec::new();

        if let Some(url) = &self.pay_url {
            check_http_url("pay_url", url, &mut errors);
        }

        if self.return_code == "SUCCESS" {
            match self.result_code {
                None => errors.push(
                    "result_code: required when return_code is SUCCESS".to_string(),
                ),
                Some(ResultCode::Success) if self.pay_url.is_none() => errors.push(
                    "pay_url: required when result_code is SUCCESS".to_string(),
                ),
                Some(ResultCode::Fail | ResultCode::Failed)
                    if self.err_code.is_none() || self.err_msg.is_none() =>
                {
                    errors.push(
                        "err_code, err_msg: required when result_code is FAIL/FAILED".to_string(),
                    );
                }
                Some(_) => {}
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AutomationError::Validation {
                model: "CreateOrderResponse".to_string(),
                errors,
            })
        }
    }

    /// Both transport and business succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.return_code == "SUCCESS" && self.result_code == Some(ResultCode::Success)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn one_data() -> OneData {
        OneData {
            one_user_id: "U1001".into(),
            consume_scene_id: "MONTHLY_CARD".into(),
            biz_account_id: "B2002".into(),
            custom_param: None,
            goods_detail: vec![GoodsDetailItem {
                category: "parking".into(),
                sp_name: "月卡".into(),
                tax_rate: 0.06,
                total_amount: 1.0,
                need_deduction: 0,
                sort_no: 1,
                order_item_id: "I-1".into(),
            }],
        }
    }

    fn request() -> PaymentRequest {
        PaymentRequest {
            mch_id: Some("1900000109".into()),
            device_info: Some("WEB".into()),
            nonce_str: "5K8264ILTKCH16CQ2502SI8ZNMTM67VS".into(),
            out_trade_no: Some("T20240101120000123456".into()),
            trade_expire_time: Some("20240101123000".into()),
            total_fee: 100,
            one_data: one_data(),
            pay_type: "WECHAT_JSAPI".into(),
            notify_url: "https://pay.test/notify".into(),
            spbill_create_id: "127.0.0.1".into(),
            charset: CHARSET_UTF8.into(),
            sign_type: SIGN_TYPE_MD5.into(),
            ..PaymentRequest::default()
        }
    }

    fn errors_of(result: AutomationResult<()>) -> Vec<String> {
        match result {
            Err(AutomationError::Validation { errors, .. }) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    mod request_tests {
        use super::*;

        #[test]
        fn test_one_data_uses_camel_case() {
            let text = serde_json::to_string(&one_data()).unwrap();
            assert!(text.contains("\"oneUserId\":\"U1001\""));
            assert!(text.contains("\"spName\":\"月卡\""));
            assert!(text.contains("\"customParam\":null"));
        }

        #[test]
        fn test_valid_order_request() {
            request().validate(PaymentEndpoint::UnifiedOrder).unwrap();
        }

        #[test]
        fn test_sign_request_requires_app_key() {
            let mut req = request();
            let errors = errors_of(req.validate(PaymentEndpoint::PaySign));
            assert_eq!(errors, vec!["appKey: field required".to_string()]);
            req.app_key = Some("k".into());
            req.out_trade_no = None;
            req.validate(PaymentEndpoint::PaySign).unwrap();
        }

        #[test]
        fn test_collects_every_failure() {
            let mut req = request();
            req.mch_id = None;
            req.nonce_str = "x".repeat(33);
            req.total_fee = 0;
            req.notify_url = "ftp://pay.test/notify".into();
            req.return_url = Some("not a url".into());
            req.spbill_create_id = "localhost".into();
            req.charset = "GBK".into();
            req.sign_type = "SHA256".into();
            req.out_trade_no = Some("T1".into());
            req.trade_expire_time = Some("2024-01-01".into());

            let errors = errors_of(req.validate(PaymentEndpoint::UnifiedOrder));
            let fields: Vec<&str> = errors
                .iter()
                .map(|e| e.split(':').next().unwrap())
                .collect();
            assert_eq!(
                fields,
                vec![
                    "mch_id",
                    "nonce_str",
                    "total_fee",
                    "notify_url",
                    "return_url",
                    "spbill_create_id",
                    "charset",
                    "sign_type",
                    "out_trade_no",
                    "trade_expire_time",
                ]
            );
        }

        #[test]
        fn test_wire_form() {
            let mut req = request();
            req.app_key = Some("k".into());
            let wire = req.to_wire().unwrap();
            assert_eq!(wire["total_fee"], json!("100"));
            assert_eq!(wire["appKey"], json!("k"));
            assert!(!wire.contains_key("attach"));
            let one: OneData =
                serde_json::from_str(wire["one_data"].as_str().unwrap()).unwrap();
            assert_eq!(one, one_data());
        }
    }

    mod response_tests {
        use super::*;

        #[test]
        fn test_success_response() {
            let resp = CreateOrderResponse::from_json(json!({
                "return_code": "SUCCESS",
                "result_code": "SUCCESS",
                "pay_url": "https://cashier.test/pay?id=1",
                "nonce_str": "abc"
            }))
            .unwrap();
            assert!(resp.is_success());
        }

        #[test]
        fn test_success_requires_pay_url() {
            let err = CreateOrderResponse::from_json(json!({
                "return_code": "SUCCESS",
                "result_code": "SUCCESS"
            }))
            .unwrap_err();
            assert!(err.to_string().contains("pay_url"));
        }

        #[test]
        fn test_failure_accepts_numeric_err_code() {
            let resp = CreateOrderResponse::from_json(json!({
                "return_code": "SUCCESS",
                "result_code": "FAILED",
                "err_code": 40001,
                "err_msg": "签名错误"
            }))
            .unwrap();
            assert_eq!(resp.err_code, Some(ErrCode::Number(40001)));
            assert_eq!(resp.err_code.as_ref().unwrap().to_string(), "40001");
            assert!(!resp.is_success());
        }

        #[test]
        fn test_failure_requires_err_fields() {
            let err = CreateOrderResponse::from_json(json!({
                "return_code": "SUCCESS",
                "result_code": "FAIL",
                "err_code": "SIGNERROR"
            }))
            .unwrap_err();
            assert!(err.to_string().contains("err_msg"));
        }

        #[test]
        fn test_transport_failure_needs_nothing_else() {
            let resp = CreateOrderResponse::from_json(json!({
                "return_code": "FAIL",
                "return_msg": "签名失败"
            }))
            .unwrap();
            assert!(!resp.is_success());
        }

        #[test]
        fn test_unknown_result_code_rejected() {
            let err = CreateOrderResponse::from_json(json!({
                "return_code": "SUCCESS",
                "result_code": "MAYBE"
            }))
            .unwrap_err();
            assert!(matches!(err, AutomationError::Json(_)));
        }

        #[test]
        fn test_missing_success_result_code() {
            let err = CreateOrderResponse::from_json(json!({"return_code": "SUCCESS"})).unwrap_err();
            assert!(err.to_string().contains("result_code"));
        }
    }
}
