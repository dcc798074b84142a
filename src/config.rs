use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Base for the URLs handed back to clients, e.g. a CDN in front of the bucket.
    pub public_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: Option<String>,
    pub api_base: String,
    pub callback_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyConfig {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub smtp: SmtpConfig,
    pub razorpay: RazorpayConfig,
    pub pdf_renderer_url: String,
    pub company: CompanyConfig,
    pub outbound_timeout_secs: u64,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: env_or("JWT_ISSUER", "invoxa"),
            audience: env_or("JWT_AUDIENCE", "invoxa-users"),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60 * 24 * 7),
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 30),
        };
        let storage = StorageConfig {
            endpoint: env_or("S3_ENDPOINT", "http://localhost:9000"),
            bucket: env_or("S3_BUCKET", "invoxa"),
            access_key: std::env::var("S3_ACCESS_KEY")?,
            secret_key: std::env::var("S3_SECRET_KEY")?,
            region: env_or("S3_REGION", "us-east-1"),
            public_base_url: env_or("S3_PUBLIC_BASE_URL", "http://localhost:9000/invoxa"),
        };
        let smtp = SmtpConfig {
            host: env_or("SMTP_HOST", "smtp.gmail.com"),
            port: env_parse("SMTP_PORT", 587),
            username: std::env::var("SMTP_USER")?,
            password: std::env::var("SMTP_PASS")?,
            from: std::env::var("MAIL_FROM").or_else(|_| std::env::var("SMTP_USER"))?,
        };
        let razorpay = RazorpayConfig {
            key_id: std::env::var("RAZORPAY_KEY_ID")?,
            key_secret: std::env::var("RAZORPAY_KEY_SECRET")?,
            webhook_secret: std::env::var("RAZORPAY_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            api_base: env_or("RAZORPAY_API_BASE", "https://api.razorpay.com/v1"),
            callback_url: env_or("PAYMENT_CALLBACK_URL", "http://localhost:3000/payment-success"),
        };
        let company = CompanyConfig {
            name: env_or("COMPANY_NAME", "Invoxa"),
            email: env_or("COMPANY_EMAIL", "billing@invoxa.local"),
        };
        Ok(Self {
            database_url,
            jwt,
            storage,
            smtp,
            razorpay,
            pdf_renderer_url: env_or("PDF_RENDERER_URL", "http://localhost:3001"),
            company,
            outbound_timeout_secs: env_parse("OUTBOUND_TIMEOUT_SECS", 30),
        })
    }
}
