use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// ユーザー
///
/// `reset_token_hash` と `reset_token_expires_at` は常に両方 NULL か両方設定済み。
/// トークン平文はDBに保存せず、SHA256ハッシュのみ保持する。
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    #[serde(skip)]
    pub password_hash: String,
    #[serde(skip)]
    pub reset_token_hash: Option<String>,
    #[serde(skip)]
    pub reset_token_expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    /// 指定ハッシュのリセットトークンが `now` 時点で有効か
    ///
    /// 期限は読み取り時に評価する（期限切れトークンも物理的には残る）
    pub fn has_valid_reset_token(&self, token_hash: &str, now: OffsetDateTime) -> bool {
        match (&self.reset_token_hash, self.reset_token_expires_at) {
            (Some(stored), Some(expires_at)) => stored == token_hash && expires_at > now,
            _ => false,
        }
    }
}
