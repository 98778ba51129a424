use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::models::User;
use crate::repositories::UserStore;
use crate::services::{EmailService, auth::hash_password_blocking};

/// 現在時刻の取得元（テストで差し替え可能）
pub type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

/// パスワードリセット設定
#[derive(Debug, Clone)]
pub struct ResetSettings {
    /// トークンの有効期間
    pub token_ttl: Duration,
    /// リセットURLのベース（末尾に `/reset-password/{token}` を付与）
    pub url_base: String,
    /// リセットリンクをログに出力するか（開発環境のみ）
    pub expose_links: bool,
}

impl ResetSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            token_ttl: Duration::seconds(config.password_reset_token_ttl_secs),
            url_base: config.password_reset_url_base.clone(),
            expose_links: config.app_env.is_development(),
        }
    }
}

/// パスワードリセットサービス
#[derive(Clone)]
pub struct PasswordResetService {
    user_store: Arc<dyn UserStore>,
    email_service: EmailService,
    settings: ResetSettings,
    clock: Clock,
}

impl PasswordResetService {
    /// 新しい PasswordResetService を作成
    pub fn new(
        user_store: Arc<dyn UserStore>,
        email_service: EmailService,
        settings: ResetSettings,
    ) -> Self {
        Self {
            user_store,
            email_service,
            settings,
            clock: Arc::new(OffsetDateTime::now_utc),
        }
    }

    /// 時刻取得元を差し替える
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// パスワードリセットをリクエスト
    ///
    /// # Security
    /// - ユーザーが存在しない場合も常に成功を返す（情報漏洩防止）
    /// - 両分岐で同じ形の UPDATE を1回発行する（不在時は `Uuid::nil()` 宛てで0行更新）
    /// - メール送信はバックグラウンドで実行する
    /// - トークン（平文）は開発環境以外ではログに出力しない
    pub async fn request_reset(&self, email: &str) -> Result<(), AppError> {
        tracing::info!(email = %email, "パスワードリセットリクエスト");

        let user = self.user_store.find_by_email(email).await?;

        let token = generate_token();
        let token_hash = hash_token(&token);
        let expires_at = self.expires_at()?;

        // 既存トークンは無条件に上書き（有効なトークンはユーザーごとに1つ）
        let target_id = user.as_ref().map_or(Uuid::nil(), |u| u.id);
        self.user_store
            .set_reset_token(target_id, &token_hash, expires_at)
            .await?;

        let Some(user) = user else {
            tracing::info!(email = %email, "パスワードリセット: ユーザー不在（成功レスポンス返却）");
            return Ok(());
        };

        let reset_url = self.build_reset_url(&token);

        if self.settings.expose_links {
            tracing::info!(email = %email, reset_url = %reset_url, "リセットURL（開発モード）");
        }

        self.dispatch_reset_email(user, reset_url);

        Ok(())
    }

    /// トークンの有効性を確認（副作用なし）
    ///
    /// 存在しない・期限切れ・空文字はすべて `false`
    pub async fn verify_token(&self, token: &str) -> Result<bool, AppError> {
        if token.trim().is_empty() {
            return Ok(false);
        }

        let user = self
            .user_store
            .find_by_valid_reset_token(&hash_token(token), self.now())
            .await?;

        Ok(user.is_some())
    }

    /// パスワードをリセット
    ///
    /// # Security
    /// - トークン・新パスワードはログに出力しない
    /// - パスワード更新とトークン削除は条件付き書き込み1回で行う
    pub async fn complete_reset(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        if token.trim().is_empty() {
            return Err(AppError::InvalidOrExpiredToken);
        }

        let token_hash = hash_token(token);

        if self
            .user_store
            .find_by_valid_reset_token(&token_hash, self.now())
            .await?
            .is_none()
        {
            tracing::warn!("無効または期限切れのトークン");
            return Err(AppError::InvalidOrExpiredToken);
        }

        let password_hash = hash_password_blocking(new_password).await?;

        let user = self
            .user_store
            .consume_reset_token(&token_hash, self.now(), &password_hash)
            .await?
            .ok_or_else(|| {
                tracing::warn!("トークンは既に消費済み（同時リクエスト）");
                AppError::InvalidOrExpiredToken
            })?;

        tracing::info!(user_id = %user.id, "パスワードリセット完了");

        Ok(())
    }

    /// リセットメールをバックグラウンドで送信
    ///
    /// 送信失敗はログのみ（トークンは保存済み）
    fn dispatch_reset_email(&self, user: User, reset_url: String) {
        let email_service = self.email_service.clone();
        tokio::spawn(async move {
            match email_service
                .send_password_reset_email(&user.email, user.name.as_deref(), &reset_url)
                .await
            {
                Ok(()) => {
                    tracing::info!(user_id = %user.id, "パスワードリセットメール送信完了");
                }
                Err(e) => {
                    tracing::error!(user_id = %user.id, error = %e, "パスワードリセットメール送信失敗");
                }
            }
        });
    }

    /// リセットURLを構築
    fn build_reset_url(&self, token: &str) -> String {
        format!(
            "{}/reset-password/{}",
            self.settings.url_base.trim_end_matches('/'),
            token
        )
    }

    /// 有効期限を計算（オーバーフロー時は内部エラー）
    fn expires_at(&self) -> Result<OffsetDateTime, AppError> {
        self.now()
            .checked_add(self.settings.token_ttl)
            .ok_or_else(|| {
                tracing::error!(ttl = %self.settings.token_ttl, "トークン有効期限の計算でオーバーフロー");
                AppError::Internal(anyhow::anyhow!("reset token expiry overflow"))
            })
    }

    fn now(&self) -> OffsetDateTime {
        (self.clock)()
    }
}

/// 32バイト（256ビット）のランダムトークンを生成
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// トークンをSHA256でハッシュ化
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
