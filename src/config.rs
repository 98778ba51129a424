use secrecy::SecretBox;
use serde::Deserialize;

/// 実行環境
///
/// `Development` の場合のみリセットリンクをログに出力する。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    #[default]
    Production,
    Development,
}

impl AppEnv {
    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: SecretBox<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub app_env: AppEnv,

    // SMTP設定（オプション - email機能有効時のみ使用）
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<SecretBox<String>>,
    pub smtp_password: Option<SecretBox<String>>,
    #[serde(default)]
    pub smtp_from_address: Option<String>,

    // パスワードリセット設定
    #[serde(default = "default_password_reset_url_base")]
    pub password_reset_url_base: String,
    #[serde(default = "default_password_reset_token_ttl_secs")]
    pub password_reset_token_ttl_secs: i64,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_PASSWORD_RESET_URL_BASE: &str = "http://localhost:3000";
/// 24時間
const DEFAULT_PASSWORD_RESET_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;
/// 30日
const MAX_PASSWORD_RESET_TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_password_reset_url_base() -> String {
    DEFAULT_PASSWORD_RESET_URL_BASE.to_string()
}

fn default_password_reset_token_ttl_secs() -> i64 {
    DEFAULT_PASSWORD_RESET_TOKEN_TTL_SECS
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        Self::from_vars(std::env::vars())
    }

    /// 任意の (キー, 値) 列から読み込み、値の範囲を検証する
    pub fn from_vars<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), envy::Error> {
        let ttl = self.password_reset_token_ttl_secs;
        if !(1..=MAX_PASSWORD_RESET_TOKEN_TTL_SECS).contains(&ttl) {
            return Err(envy::Error::Custom(format!(
                "PASSWORD_RESET_TOKEN_TTL_SECS must be between 1 and {MAX_PASSWORD_RESET_TOKEN_TTL_SECS}, got {ttl}"
            )));
        }
        Ok(())
    }

    /// SMTP送信に必要な設定が揃っているか
    pub fn smtp_configured(&self) -> bool {
        self.smtp_host.is_some() && self.smtp_from_address.is_some()
    }
}
