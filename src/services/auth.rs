use std::sync::{Arc, LazyLock};

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

use crate::error::AppError;
use crate::models::User;
use crate::repositories::UserStore;

/// タイミング攻撃対策用のダミーハッシュ（実ハッシュと同じパラメータ）
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("resetgate-dummy-password").ok());

/// パスワードをargon2idでハッシュ化
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            tracing::error!(error = ?e, "パスワードハッシュ生成エラー");
            AppError::Internal(anyhow::anyhow!("password hash error"))
        })?;
    Ok(hash.to_string())
}

/// パスワードハッシュ化をブロッキングスレッドで実行
///
/// argon2 は CPU 負荷が高いため、非同期ワーカーを占有しないようにする
pub async fn hash_password_blocking(password: &str) -> Result<String, AppError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "パスワードハッシュタスクの実行エラー");
            AppError::Internal(anyhow::anyhow!("password hash task failed"))
        })?
}

/// パスワードを検証
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| {
        tracing::error!(error = ?e, "パスワードハッシュのパースエラー");
        AppError::Internal(anyhow::anyhow!("password hash parse error"))
    })?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// 認証サービス
#[derive(Clone)]
pub struct AuthService {
    user_store: Arc<dyn UserStore>,
}

impl AuthService {
    /// 新しい AuthService を作成
    pub fn new(user_store: Arc<dyn UserStore>) -> Self {
        Self { user_store }
    }

    /// ユーザー登録
    ///
    /// # Security
    /// - パスワードは即座にハッシュ化し、ログに出力しない
    pub async fn register(
        &self,
        email: &str,
        name: Option<&str>,
        password: &str,
    ) -> Result<User, AppError> {
        let password_hash = hash_password_blocking(password).await?;
        let user = self
            .user_store
            .create_user(email, name, &password_hash)
            .await?;

        tracing::info!(user_id = %user.id, "ユーザー登録成功");

        Ok(user)
    }

    /// ユーザー認証を実行
    ///
    /// タイミング攻撃対策: ユーザーが存在しない場合もダミーのパスワード検証を実行
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AppError> {
        let user = self.user_store.find_by_email(email).await?;

        match user {
            Some(user) => {
                if verify_password(password, &user.password_hash)? {
                    tracing::info!(email = %email, "認証成功");
                    Ok(user)
                } else {
                    tracing::warn!(email = %email, "認証失敗: パスワード不一致");
                    Err(AppError::Authentication("invalid_credentials".to_string()))
                }
            }
            None => {
                // これにより、ユーザーの存在有無を応答時間から推測できなくなる
                if let Some(dummy_hash) = DUMMY_HASH.as_deref() {
                    let _ = verify_password(password, dummy_hash);
                }
                tracing::warn!(email = %email, "認証失敗: ユーザー不在");
                Err(AppError::Authentication("invalid_credentials".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryUserStore;

    fn service() -> AuthService {
        AuthService::new(Arc::new(InMemoryUserStore::new()))
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("password123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("password123", &hash).unwrap());
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[tokio::test]
    async fn test_hash_password_blocking() {
        let hash = hash_password_blocking("password123").await.unwrap();
        assert!(verify_password("password123", &hash).unwrap());
        assert!(!verify_password("password124", &hash).unwrap());
    }

    #[test]
    fn test_verify_password_invalid_hash() {
        assert!(verify_password("password123", "invalid_hash_format").is_err());
    }

    #[tokio::test]
    async fn test_register_then_authenticate() {
        let auth = service();
        let user = auth
            .register("test@example.com", Some("Test User"), "password123")
            .await
            .unwrap();
        assert_eq!(user.name.as_deref(), Some("Test User"));

        let authed = auth
            .authenticate("test@example.com", "password123")
            .await
            .unwrap();
        assert_eq!(authed.id, user.id);
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let auth = service();
        auth.register("test@example.com", None, "password123")
            .await
            .unwrap();

        let result = auth.register("test@example.com", None, "password456").await;
        assert!(matches!(result, Err(AppError::EmailAlreadyExists)));
    }

    #[tokio::test]
    async fn test_authenticate_wrong_password() {
        let auth = service();
        auth.register("test@example.com", None, "password123")
            .await
            .unwrap();

        let result = auth.authenticate("test@example.com", "password999").await;
        assert!(matches!(result, Err(AppError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_authenticate_unknown_user() {
        let result = service()
            .authenticate("nobody@example.com", "password123")
            .await;
        assert!(matches!(result, Err(AppError::Authentication(_))));
    }
}
