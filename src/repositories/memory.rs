use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{StoreError, UserStore};
use crate::models::User;

/// インメモリ実装（テスト・ローカル動作確認用）
///
/// 条件付き書き込みは単一ロック内で判定と更新を行う。
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<Mutex<HashMap<Uuid, User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 書き込み回数の確認などに使う全件スナップショット
    pub fn snapshot(&self) -> Vec<User> {
        self.lock().values().cloned().collect()
    }

    /// ID でユーザーを取得
    pub fn get(&self, user_id: Uuid) -> Option<User> {
        self.lock().get(&user_id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, User>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock().values().find(|u| u.email == email).cloned())
    }

    async fn create_user(
        &self,
        email: &str,
        name: Option<&str>,
        password_hash: &str,
    ) -> Result<User, StoreError> {
        let mut users = self.lock();
        if users.values().any(|u| u.email == email) {
            return Err(StoreError::UniqueViolation("users_email_key"));
        }

        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.map(str::to_string),
            password_hash: password_hash.to_string(),
            reset_token_hash: None,
            reset_token_expires_at: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn find_by_valid_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()
            .values()
            .find(|u| u.has_valid_reset_token(token_hash, now))
            .cloned())
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        if let Some(user) = self.lock().get_mut(&user_id) {
            user.reset_token_hash = Some(token_hash.to_string());
            user.reset_token_expires_at = Some(expires_at);
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
        new_password_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.lock();
        let Some(user) = users
            .values_mut()
            .find(|u| u.has_valid_reset_token(token_hash, now))
        else {
            return Ok(None);
        };

        user.password_hash = new_password_hash.to_string();
        user.reset_token_hash = None;
        user.reset_token_expires_at = None;
        user.updated_at = OffsetDateTime::now_utc();

        Ok(Some(user.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[tokio::test]
    async fn test_create_user_rejects_duplicate_email() {
        let store = InMemoryUserStore::new();
        store
            .create_user("a@example.com", None, "hash")
            .await
            .unwrap();

        let result = store.create_user("a@example.com", None, "hash").await;
        assert!(matches!(result, Err(StoreError::UniqueViolation(_))));
    }

    #[tokio::test]
    async fn test_email_lookup_is_case_sensitive() {
        let store = InMemoryUserStore::new();
        store
            .create_user("a@example.com", None, "hash")
            .await
            .unwrap();

        assert!(store.find_by_email("A@example.com").await.unwrap().is_none());
        assert!(store.find_by_email("a@example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_set_reset_token_overwrites_previous() {
        let store = InMemoryUserStore::new();
        let user = store
            .create_user("a@example.com", None, "hash")
            .await
            .unwrap();
        let now = OffsetDateTime::now_utc();
        let expires_at = now + Duration::hours(24);

        store
            .set_reset_token(user.id, "first", expires_at)
            .await
            .unwrap();
        store
            .set_reset_token(user.id, "second", expires_at)
            .await
            .unwrap();

        assert!(
            store
                .find_by_valid_reset_token("first", now)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .find_by_valid_reset_token("second", now)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_set_reset_token_nil_id_changes_nothing() {
        let store = InMemoryUserStore::new();
        store
            .create_user("a@example.com", None, "hash-a")
            .await
            .unwrap();
        let b = store
            .create_user("b@example.com", None, "hash-b")
            .await
            .unwrap();
        let now = OffsetDateTime::now_utc();
        store
            .set_reset_token(b.id, "existing", now + Duration::hours(1))
            .await
            .unwrap();
        let mut before = store.snapshot();
        before.sort_by_key(|u| u.id);

        store
            .set_reset_token(Uuid::nil(), "unused", now + Duration::hours(24))
            .await
            .unwrap();

        let mut after = store.snapshot();
        after.sort_by_key(|u| u.id);
        assert_eq!(before.len(), after.len());
        for (prev, next) in before.iter().zip(&after) {
            assert_eq!(next.id, prev.id);
            assert_eq!(next.password_hash, prev.password_hash);
            assert_eq!(next.reset_token_hash, prev.reset_token_hash);
            assert_eq!(next.reset_token_expires_at, prev.reset_token_expires_at);
            assert_eq!(next.updated_at, prev.updated_at);
        }
        assert!(
            store
                .find_by_valid_reset_token("unused", now)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_consume_reset_token_succeeds_once() {
        let store = InMemoryUserStore::new();
        let user = store
            .create_user("a@example.com", None, "old-hash")
            .await
            .unwrap();
        let now = OffsetDateTime::now_utc();
        store
            .set_reset_token(user.id, "token", now + Duration::hours(1))
            .await
            .unwrap();

        let first = store
            .consume_reset_token("token", now, "new-hash")
            .await
            .unwrap()
            .expect("first consume should succeed");
        assert_eq!(first.password_hash, "new-hash");
        assert!(first.reset_token_hash.is_none());
        assert!(first.reset_token_expires_at.is_none());

        let second = store
            .consume_reset_token("token", now, "other-hash")
            .await
            .unwrap();
        assert!(second.is_none());

        let stored = store.get(user.id).unwrap();
        assert_eq!(stored.password_hash, "new-hash");
    }

    #[tokio::test]
    async fn test_consume_expired_token_fails() {
        let store = InMemoryUserStore::new();
        let user = store
            .create_user("a@example.com", None, "old-hash")
            .await
            .unwrap();
        let now = OffsetDateTime::now_utc();
        store
            .set_reset_token(user.id, "token", now - Duration::minutes(1))
            .await
            .unwrap();

        let result = store
            .consume_reset_token("token", now, "new-hash")
            .await
            .unwrap();
        assert!(result.is_none());

        // 期限切れトークンは物理的には残る
        let stored = store.get(user.id).unwrap();
        assert_eq!(stored.password_hash, "old-hash");
        assert_eq!(stored.reset_token_hash.as_deref(), Some("token"));
    }
}
