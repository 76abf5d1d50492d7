//! Payment API test client.
//!
//! Requests are assembled from [`OrderParams`], validated per endpoint,
//! signed with [`crate::signature::md5_sign`] and posted as JSON.

mod models;
mod service;

pub use models::{
    CreateOrderResponse, ErrCode, GoodsDetailItem, OneData, OrderParams, PaymentEndpoint,
    PaymentRequest, ResultCode, CHARSET_UTF8, IP_ADDRESS_PATTERN, SIGN_TYPE_MD5,
};
pub use service::{PaymentService, REQUEST_TIMEOUT};
