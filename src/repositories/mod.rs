pub mod memory;
pub mod user;

pub use memory::InMemoryUserStore;
pub use user::UserRepository;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::User;

/// 永続化層のエラー
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("一意制約違反: {0}")]
    UniqueViolation(&'static str),

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),
}

/// ユーザーストア
///
/// リセットトークンは常にハッシュ値で受け渡す。
#[async_trait]
pub trait UserStore: Send + Sync {
    /// メールアドレス（完全一致）でユーザーを検索
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// 新しいユーザーを作成
    ///
    /// # Errors
    /// - メールアドレス重複時: `StoreError::UniqueViolation`
    async fn create_user(
        &self,
        email: &str,
        name: Option<&str>,
        password_hash: &str,
    ) -> Result<User, StoreError>;

    /// トークンハッシュが一致し、かつ `now` 時点で期限内のユーザーを検索
    async fn find_by_valid_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError>;

    /// リセットトークンを設定（既存トークンは無条件に上書き）
    ///
    /// 該当ユーザーがいない ID（`Uuid::nil()` など）では何も更新しない
    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// トークンを消費してパスワードを更新（条件付き書き込み）
    ///
    /// トークンが一致し期限内の場合のみ、パスワード更新とトークン削除を
    /// 1回の書き込みで行う。該当なし（期限切れ・消費済み）の場合は `None`。
    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
        new_password_hash: &str,
    ) -> Result<Option<User>, StoreError>;
}
