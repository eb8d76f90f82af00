use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::json;

use super::{hmac_sha256_hex, param, verify_sha256, CallbackOutcome, PaymentGateway, PaymentOrder};
use crate::config::MomoConfig;

const REQUEST_TYPE: &str = "captureWallet";

pub struct MomoGateway {
    config: MomoConfig,
    client: reqwest::Client,
}

impl MomoGateway {
    pub fn new(config: MomoConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

/// Field order MoMo signs a create request with.
fn create_signature_data(
    access_key: &str,
    order: &PaymentOrder,
    order_id: &str,
    request_id: &str,
    partner_code: &str,
    extra_data: &str,
) -> String {
    format!(
        "accessKey={access_key}&amount={}&extraData={extra_data}&ipnUrl={}&orderId={order_id}&orderInfo={}&partnerCode={partner_code}&redirectUrl={}&requestId={request_id}&requestType={REQUEST_TYPE}",
        order.amount, order.notify_url, order.order_info, order.return_url,
    )
}

/// Field order MoMo signs an IPN with.
fn ipn_signature_data(access_key: &str, params: &HashMap<String, String>) -> String {
    const FIELDS: [&str; 12] = [
        "amount",
        "extraData",
        "message",
        "orderId",
        "orderInfo",
        "orderType",
        "partnerCode",
        "payType",
        "requestId",
        "responseTime",
        "resultCode",
        "transId",
    ];
    let mut data = format!("accessKey={access_key}");
    for field in FIELDS {
        data.push('&');
        data.push_str(field);
        data.push('=');
        data.push_str(param(params, field));
    }
    data
}

fn booking_id_from(params: &HashMap<String, String>) -> anyhow::Result<String> {
    let extra = param(params, "extraData");
    if !extra.is_empty() {
        let decoded = BASE64.decode(extra).context("extraData is not base64")?;
        let id = String::from_utf8(decoded).context("extraData is not utf-8")?;
        if !id.is_empty() {
            return Ok(id);
        }
    }
    // orderId is "<bookingId>-<millis>"
    let order_id = param(params, "orderId");
    order_id
        .rsplit_once('-')
        .map(|(id, _)| id.to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow::anyhow!("callback does not reference a booking"))
}

#[async_trait]
impl PaymentGateway for MomoGateway {
    fn name(&self) -> &'static str {
        "momo"
    }

    async fn create_payment(&self, order: &PaymentOrder) -> anyhow::Result<String> {
        let order_id = format!("{}-{}", order.booking_id, chrono::Utc::now().timestamp_millis());
        let request_id = order_id.clone();
        let extra_data = BASE64.encode(order.booking_id.as_bytes());

        let raw = create_signature_data(
            &self.config.access_key,
            order,
            &order_id,
            &request_id,
            &self.config.partner_code,
            &extra_data,
        );
        let signature = hmac_sha256_hex(&self.config.secret_key, &raw)?;

        let body = json!({
            "partnerCode": self.config.partner_code,
            "accessKey": self.config.access_key,
            "requestId": request_id,
            "amount": order.amount,
            "orderId": order_id,
            "orderInfo": order.order_info,
            "redirectUrl": order.return_url,
            "ipnUrl": order.notify_url,
            "extraData": extra_data,
            "requestType": REQUEST_TYPE,
            "signature": signature,
            "lang": "vi",
        });

        let resp = self
            .client
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .await
            .context("failed to call MoMo API")?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse MoMo response")?;

        if !status.is_success() || data["resultCode"].as_i64() != Some(0) {
            anyhow::bail!("MoMo API error ({}): {}", status, data["message"]);
        }

        data["payUrl"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing payUrl in MoMo response"))
    }

    fn verify_callback(&self, params: &HashMap<String, String>) -> anyhow::Result<CallbackOutcome> {
        let raw = ipn_signature_data(&self.config.access_key, params);
        verify_sha256(&self.config.secret_key, &raw, param(params, "signature"))?;

        Ok(CallbackOutcome {
            booking_id: booking_id_from(params)?,
            success: param(params, "resultCode") == "0",
            amount: param(params, "amount").parse().unwrap_or(0),
            transaction_ref: param(params, "transId").to_string(),
            message: param(params, "message").to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> MomoGateway {
        MomoGateway::new(MomoConfig {
            endpoint: "http://localhost:0/create".to_string(),
            partner_code: "MOMOTEST".to_string(),
            access_key: "access".to_string(),
            secret_key: "momo-secret".to_string(),
        })
    }

    fn signed_ipn(result_code: &str) -> HashMap<String, String> {
        let mut params: HashMap<String, String> = [
            ("partnerCode", "MOMOTEST"),
            ("orderId", "booking-42-1718000000000"),
            ("requestId", "booking-42-1718000000000"),
            ("amount", "1500000"),
            ("orderInfo", "Room booking"),
            ("orderType", "momo_wallet"),
            ("transId", "4088878653"),
            ("resultCode", result_code),
            ("message", "Successful."),
            ("payType", "qr"),
            ("responseTime", "1718000001000"),
            ("extraData", "Ym9va2luZy00Mg=="),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let raw = ipn_signature_data("access", &params);
        let signature = hmac_sha256_hex("momo-secret", &raw).unwrap();
        params.insert("signature".to_string(), signature);
        params
    }

    #[test]
    fn test_ipn_signature_field_order() {
        let params = signed_ipn("0");
        let raw = ipn_signature_data("access", &params);
        assert!(raw.starts_with("accessKey=access&amount=1500000&extraData=Ym9va2luZy00Mg==&message="));
        assert!(raw.ends_with("&resultCode=0&transId=4088878653"));
    }

    #[test]
    fn test_verify_successful_ipn() {
        let outcome = gateway().verify_callback(&signed_ipn("0")).unwrap();
        assert_eq!(outcome.booking_id, "booking-42");
        assert!(outcome.success);
        assert_eq!(outcome.amount, 1_500_000);
        assert_eq!(outcome.transaction_ref, "4088878653");
    }

    #[test]
    fn test_failed_result_code_is_not_success() {
        let outcome = gateway().verify_callback(&signed_ipn("1006")).unwrap();
        assert!(!outcome.success);
    }

    #[test]
    fn test_tampered_ipn_rejected() {
        let mut params = signed_ipn("0");
        params.insert("amount".to_string(), "1000".to_string());
        assert!(gateway().verify_callback(&params).is_err());
    }

    #[test]
    fn test_booking_id_falls_back_to_order_id() {
        let mut params = HashMap::new();
        params.insert("orderId".to_string(), "abc-def-123".to_string());
        assert_eq!(booking_id_from(&params).unwrap(), "abc-def");
    }
}
