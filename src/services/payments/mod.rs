pub mod momo;
pub mod vnpay;

use std::collections::HashMap;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

/// What a gateway needs to open a payment for one booking.
#[derive(Debug, Clone)]
pub struct PaymentOrder {
    pub booking_id: String,
    pub amount: i64,
    pub order_info: String,
    /// Where the customer's browser lands after paying.
    pub return_url: String,
    /// Server-to-server notification endpoint.
    pub notify_url: String,
    pub client_ip: String,
}

/// A verified gateway callback.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackOutcome {
    pub booking_id: String,
    pub success: bool,
    pub amount: i64,
    pub transaction_ref: String,
    pub message: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the URL the customer is sent to.
    async fn create_payment(&self, order: &PaymentOrder) -> anyhow::Result<String>;

    /// Checks the callback signature and extracts the outcome. Errors mean
    /// the callback cannot be trusted.
    fn verify_callback(&self, params: &HashMap<String, String>) -> anyhow::Result<CallbackOutcome>;
}

pub(crate) fn hmac_sha256_hex(secret: &str, data: &str) -> anyhow::Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| anyhow::anyhow!("HMAC key error"))?;
    mac.update(data.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub(crate) fn hmac_sha512_hex(secret: &str, data: &str) -> anyhow::Result<String> {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())
        .map_err(|_| anyhow::anyhow!("HMAC key error"))?;
    mac.update(data.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub(crate) fn verify_sha256(secret: &str, data: &str, signature: &str) -> anyhow::Result<()> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| anyhow::anyhow!("HMAC key error"))?;
    mac.update(data.as_bytes());
    let sig_bytes = hex::decode(signature.trim()).map_err(|_| anyhow::anyhow!("invalid signature hex"))?;
    mac.verify_slice(&sig_bytes)
        .map_err(|_| anyhow::anyhow!("signature mismatch"))
}

pub(crate) fn verify_sha512(secret: &str, data: &str, signature: &str) -> anyhow::Result<()> {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())
        .map_err(|_| anyhow::anyhow!("HMAC key error"))?;
    mac.update(data.as_bytes());
    // VNPay sends the digest in upper case.
    let sig_bytes = hex::decode(signature.trim().to_lowercase())
        .map_err(|_| anyhow::anyhow!("invalid signature hex"))?;
    mac.verify_slice(&sig_bytes)
        .map_err(|_| anyhow::anyhow!("signature mismatch"))
}

fn param<'a>(params: &'a HashMap<String, String>, key: &str) -> &'a str {
    params.get(key).map(String::as_str).unwrap_or("")
}
