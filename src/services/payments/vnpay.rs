use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::{hmac_sha512_hex, param, verify_sha512, CallbackOutcome, PaymentGateway, PaymentOrder};
use crate::config::VnpayConfig;

const VERSION: &str = "2.1.0";
const DATE_FORMAT: &str = "%Y%m%d%H%M%S";

pub struct VnpayGateway {
    config: VnpayConfig,
    window_minutes: i64,
}

impl VnpayGateway {
    pub fn new(config: VnpayConfig, window_minutes: i64) -> Self {
        Self {
            config,
            window_minutes,
        }
    }
}

/// Form-encoded query over the sorted parameters, the string VNPay signs.
fn sign_data(params: &BTreeMap<String, String>) -> anyhow::Result<String> {
    let mut scratch = reqwest::Url::parse("http://localhost/")?;
    scratch
        .query_pairs_mut()
        .extend_pairs(params.iter().filter(|(_, v)| !v.is_empty()));
    Ok(scratch.query().unwrap_or_default().to_string())
}

#[async_trait]
impl PaymentGateway for VnpayGateway {
    fn name(&self) -> &'static str {
        "vnpay"
    }

    async fn create_payment(&self, order: &PaymentOrder) -> anyhow::Result<String> {
        // VNPay expects Vietnam local time
        let created = Utc::now().naive_utc() + Duration::hours(7);
        let expires = created + Duration::minutes(self.window_minutes);

        let mut params = BTreeMap::new();
        params.insert("vnp_Version".to_string(), VERSION.to_string());
        params.insert("vnp_Command".to_string(), "pay".to_string());
        params.insert("vnp_TmnCode".to_string(), self.config.tmn_code.clone());
        params.insert("vnp_Amount".to_string(), (order.amount * 100).to_string());
        params.insert("vnp_CurrCode".to_string(), "VND".to_string());
        params.insert("vnp_TxnRef".to_string(), order.booking_id.clone());
        params.insert("vnp_OrderInfo".to_string(), order.order_info.clone());
        params.insert("vnp_OrderType".to_string(), "other".to_string());
        params.insert("vnp_Locale".to_string(), "vn".to_string());
        params.insert("vnp_ReturnUrl".to_string(), order.return_url.clone());
        params.insert("vnp_IpAddr".to_string(), order.client_ip.clone());
        params.insert("vnp_CreateDate".to_string(), created.format(DATE_FORMAT).to_string());
        params.insert("vnp_ExpireDate".to_string(), expires.format(DATE_FORMAT).to_string());

        let data = sign_data(&params)?;
        let signature = hmac_sha512_hex(&self.config.hash_secret, &data)?;

        let mut url = reqwest::Url::parse(&self.config.pay_url)?;
        url.set_query(Some(&data));
        url.query_pairs_mut().append_pair("vnp_SecureHash", &signature);
        Ok(url.to_string())
    }

    fn verify_callback(&self, params: &HashMap<String, String>) -> anyhow::Result<CallbackOutcome> {
        let signed: BTreeMap<String, String> = params
            .iter()
            .filter(|(k, _)| k.starts_with("vnp_") && !k.starts_with("vnp_SecureHash"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let data = sign_data(&signed)?;
        verify_sha512(&self.config.hash_secret, &data, param(params, "vnp_SecureHash"))?;

        let booking_id = param(params, "vnp_TxnRef");
        if booking_id.is_empty() {
            anyhow::bail!("callback does not reference a booking");
        }

        let response_code = param(params, "vnp_ResponseCode");
        let amount: i64 = param(params, "vnp_Amount").parse().unwrap_or(0);
        Ok(CallbackOutcome {
            booking_id: booking_id.to_string(),
            success: response_code == "00",
            amount: amount / 100,
            transaction_ref: param(params, "vnp_TransactionNo").to_string(),
            message: format!("response code {response_code}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> VnpayGateway {
        VnpayGateway::new(
            VnpayConfig {
                pay_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
                tmn_code: "TESTTMN1".to_string(),
                hash_secret: "vnpay-secret".to_string(),
            },
            15,
        )
    }

    fn order() -> PaymentOrder {
        PaymentOrder {
            booking_id: "booking-7".to_string(),
            amount: 1_250_000,
            order_info: "Thanh toan dat phong booking-7".to_string(),
            return_url: "http://localhost:5000/api/vnpay/return".to_string(),
            notify_url: "http://localhost:5000/api/vnpay/return".to_string(),
            client_ip: "127.0.0.1".to_string(),
        }
    }

    fn query_params(url: &str) -> HashMap<String, String> {
        reqwest::Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_sign_data_is_sorted_and_encoded() {
        let mut params = BTreeMap::new();
        params.insert("vnp_b".to_string(), "two words".to_string());
        params.insert("vnp_a".to_string(), "x/y".to_string());
        params.insert("vnp_empty".to_string(), String::new());
        assert_eq!(sign_data(&params).unwrap(), "vnp_a=x%2Fy&vnp_b=two+words");
    }

    #[tokio::test]
    async fn test_pay_url_round_trips_through_verification() {
        let gw = gateway();
        let url = gw.create_payment(&order()).await.unwrap();
        assert!(url.starts_with("https://sandbox.vnpayment.vn/paymentv2/vpcpay.html?"));

        let mut params = query_params(&url);
        assert_eq!(params["vnp_Amount"], "125000000");

        // The return carries the request fields plus the gateway's result
        params.remove("vnp_SecureHash");
        params.insert("vnp_ResponseCode".to_string(), "00".to_string());
        params.insert("vnp_TransactionNo".to_string(), "14000001".to_string());
        let signed: BTreeMap<_, _> = params.clone().into_iter().collect();
        let hash = hmac_sha512_hex("vnpay-secret", &sign_data(&signed).unwrap()).unwrap();
        params.insert("vnp_SecureHash".to_string(), hash.to_uppercase());
        params.insert("vnp_SecureHashType".to_string(), "HmacSHA512".to_string());

        let outcome = gw.verify_callback(&params).unwrap();
        assert_eq!(outcome.booking_id, "booking-7");
        assert!(outcome.success);
        assert_eq!(outcome.amount, 1_250_000);
        assert_eq!(outcome.transaction_ref, "14000001");
    }

    #[tokio::test]
    async fn test_tampered_return_rejected() {
        let gw = gateway();
        let url = gw.create_payment(&order()).await.unwrap();
        let mut params = query_params(&url);
        params.insert("vnp_Amount".to_string(), "100".to_string());
        assert!(gw.verify_callback(&params).is_err());
    }

    #[tokio::test]
    async fn test_unsigned_url_params_verify_as_is() {
        let gw = gateway();
        let url = gw.create_payment(&order()).await.unwrap();
        let params = query_params(&url);
        let outcome = gw.verify_callback(&params).unwrap();
        // No response code yet, so not a success
        assert!(!outcome.success);
    }
}
