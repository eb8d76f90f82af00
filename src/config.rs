use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub public_url: String,
    /// Browser app the gateways send customers back to.
    pub client_url: String,
    pub session_ttl_hours: i64,
    pub payment_window_minutes: i64,
    pub expiry_sweep_secs: u64,
    pub vnd_per_point: i64,
    pub admin_email: String,
    pub admin_password: String,
    pub bank: BankInfo,
    pub momo: MomoConfig,
    pub vnpay: VnpayConfig,
}

#[derive(Clone, Debug)]
pub struct BankInfo {
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
}

#[derive(Clone, Debug)]
pub struct MomoConfig {
    pub endpoint: String,
    pub partner_code: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Clone, Debug)]
pub struct VnpayConfig {
    pub pay_url: String,
    pub tmn_code: String,
    pub hash_secret: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let public_url =
            env::var("PUBLIC_URL").unwrap_or_else(|_| "http://localhost:5000".to_string());
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "hotelbook.db".to_string()),
            public_url,
            client_url: env::var("CLIENT_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            session_ttl_hours: parse_or("SESSION_TTL_HOURS", 72),
            payment_window_minutes: parse_or("PAYMENT_WINDOW_MINUTES", 15),
            expiry_sweep_secs: parse_or("EXPIRY_SWEEP_SECS", 60),
            vnd_per_point: parse_or("VND_PER_POINT", 10_000).max(1),
            admin_email: env::var("ADMIN_EMAIL").unwrap_or_default(),
            admin_password: env::var("ADMIN_PASSWORD").unwrap_or_default(),
            bank: BankInfo {
                bank_name: env::var("BANK_NAME").unwrap_or_default(),
                account_number: env::var("BANK_ACCOUNT_NUMBER").unwrap_or_default(),
                account_name: env::var("BANK_ACCOUNT_NAME").unwrap_or_default(),
            },
            momo: MomoConfig {
                endpoint: env::var("MOMO_ENDPOINT").unwrap_or_else(|_| {
                    "https://test-payment.momo.vn/v2/gateway/api/create".to_string()
                }),
                partner_code: env::var("MOMO_PARTNER_CODE").unwrap_or_default(),
                access_key: env::var("MOMO_ACCESS_KEY").unwrap_or_default(),
                secret_key: env::var("MOMO_SECRET_KEY").unwrap_or_default(),
            },
            vnpay: VnpayConfig {
                pay_url: env::var("VNPAY_URL").unwrap_or_else(|_| {
                    "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string()
                }),
                tmn_code: env::var("VNPAY_TMN_CODE").unwrap_or_default(),
                hash_secret: env::var("VNPAY_HASH_SECRET").unwrap_or_default(),
            },
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
