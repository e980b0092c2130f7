//! User repository: accounts, credentials, WeChat identity, and activity log.

use sqlx::PgPool;
use tracing::instrument;

use freshmilk_core::{UserAction, UserId};

use super::{Page, Paginated, RepositoryError, contains_pattern};
use crate::models::user::{AuthRow, NewUser, UpdateProfile, User, UserFilter, UserLog, UserLogFilter};

/// Password hash and status for a login attempt.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserCredentials {
    pub id: UserId,
    pub password_hash: Option<String>,
    pub is_active: bool,
}

/// Map a unique violation on `shop.user` to a user-facing conflict.
fn user_conflict(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        let message = match db_err.constraint() {
            Some("user_phone_key") => "该手机号已被注册",
            Some("user_openid_key") => "该微信账号已绑定",
            _ => "用户名已存在",
        };
        return RepositoryError::Conflict(message.to_owned());
    }
    RepositoryError::Database(e)
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM shop.user WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(user)
    }

    /// Get a user by ID or fail with `NotFound`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no such user exists.
    pub async fn require(&self, id: UserId) -> Result<User, RepositoryError> {
        self.get_by_id(id).await?.ok_or(RepositoryError::NotFound)
    }

    /// Get a user by phone number.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_phone(&self, phone: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM shop.user WHERE phone = $1")
            .bind(phone)
            .fetch_optional(self.pool)
            .await?;
        Ok(user)
    }

    /// Get a user by WeChat openid.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_openid(&self, openid: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM shop.user WHERE openid = $1")
            .bind(openid)
            .fetch_optional(self.pool)
            .await?;
        Ok(user)
    }

    /// Look up credentials by username or phone.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn get_credentials(
        &self,
        login: &str,
    ) -> Result<Option<UserCredentials>, RepositoryError> {
        let creds = sqlx::query_as::<_, UserCredentials>(
            r"
            SELECT id, password_hash, is_active
            FROM shop.user
            WHERE username = $1 OR phone = $1
            ORDER BY (username = $1) DESC
            LIMIT 1
            ",
        )
        .bind(login)
        .fetch_optional(self.pool)
        .await?;
        Ok(creds)
    }

    /// Get the stored password hash of a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn get_password_hash(&self, id: UserId) -> Result<Option<String>, RepositoryError> {
        let hash: Option<Option<String>> =
            sqlx::query_scalar("SELECT password_hash FROM shop.user WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool)
                .await?;
        hash.ok_or(RepositoryError::NotFound)
    }

    /// Load the authorization context of a user, including any courier link.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_auth_row(&self, id: UserId) -> Result<Option<AuthRow>, RepositoryError> {
        let row = sqlx::query_as::<_, AuthRow>(
            r"
            SELECT u.id, u.username, u.is_admin, u.is_active,
                   u.member_level, u.member_expire_at,
                   dp.id AS courier_id
            FROM shop.user u
            LEFT JOIN shop.delivery_person dp
                   ON dp.user_id = u.id AND dp.is_active AND dp.status <> 'inactive'
            WHERE u.id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// Create a new user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the username, phone, or openid is taken.
    #[instrument(skip(self, new), fields(username = %new.username))]
    pub async fn create(&self, new: &NewUser) -> Result<User, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r"
            INSERT INTO shop.user
                (username, password_hash, phone, nickname, avatar,
                 openid, unionid, session_key, is_admin)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            ",
        )
        .bind(&new.username)
        .bind(&new.password_hash)
        .bind(&new.phone)
        .bind(&new.nickname)
        .bind(&new.avatar)
        .bind(&new.openid)
        .bind(&new.unionid)
        .bind(&new.session_key)
        .bind(new.is_admin)
        .fetch_one(self.pool)
        .await
        .map_err(user_conflict)?;
        Ok(user)
    }

    /// Whether a username is already registered.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn username_exists(&self, username: &str) -> Result<bool, RepositoryError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM shop.user WHERE username = $1)")
                .bind(username)
                .fetch_one(self.pool)
                .await?;
        Ok(exists)
    }

    /// Update the profile fields that are `Some`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the new phone is taken.
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    #[instrument(skip(self, update))]
    pub async fn update_profile(
        &self,
        id: UserId,
        update: &UpdateProfile,
    ) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(
            r"
            UPDATE shop.user SET
                nickname = COALESCE($2, nickname),
                avatar = COALESCE($3, avatar),
                gender = COALESCE($4, gender),
                birthday = COALESCE($5, birthday),
                email = COALESCE($6, email),
                phone = COALESCE($7, phone),
                address = COALESCE($8, address)
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(&update.nickname)
        .bind(&update.avatar)
        .bind(update.gender)
        .bind(update.birthday)
        .bind(&update.email)
        .bind(&update.phone)
        .bind(&update.address)
        .fetch_optional(self.pool)
        .await
        .map_err(user_conflict)?
        .ok_or(RepositoryError::NotFound)
    }

    /// Replace a user's password hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn set_password_hash(&self, id: UserId, hash: &str) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE shop.user SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Record a successful login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn touch_last_login(&self, id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE shop.user SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Store the latest WeChat session for a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn set_wechat_session(
        &self,
        id: UserId,
        session_key: &str,
        unionid: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE shop.user
            SET session_key = $2, unionid = COALESCE($3, unionid), last_login = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(session_key)
        .bind(unionid)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Enable or disable an account.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    #[instrument(skip(self))]
    pub async fn set_active(&self, id: UserId, is_active: bool) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>("UPDATE shop.user SET is_active = $2 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(is_active)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// List users for the admin console, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: &UserFilter,
        page: Page,
    ) -> Result<Paginated<User>, RepositoryError> {
        let username = filter.username.as_deref().map(contains_pattern);
        let phone = filter.phone.as_deref().map(contains_pattern);

        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM shop.user
            WHERE ($1::text IS NULL OR username ILIKE $1)
              AND ($2::text IS NULL OR phone ILIKE $2)
              AND ($3::boolean IS NULL OR is_active = $3)
            ",
        )
        .bind(&username)
        .bind(&phone)
        .bind(filter.is_active)
        .fetch_one(self.pool)
        .await?;

        let results = sqlx::query_as::<_, User>(
            r"
            SELECT * FROM shop.user
            WHERE ($1::text IS NULL OR username ILIKE $1)
              AND ($2::text IS NULL OR phone ILIKE $2)
              AND ($3::boolean IS NULL OR is_active = $3)
            ORDER BY date_joined DESC, id DESC
            LIMIT $4 OFFSET $5
            ",
        )
        .bind(&username)
        .bind(&phone)
        .bind(filter.is_active)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await?;

        Ok(Paginated { count, results })
    }

    /// IDs of every active user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn active_ids(&self) -> Result<Vec<UserId>, RepositoryError> {
        let ids = sqlx::query_scalar::<_, UserId>(
            "SELECT id FROM shop.user WHERE is_active ORDER BY id",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(ids)
    }

    // =========================================================================
    // Activity log
    // =========================================================================

    /// Append an activity log entry.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn log_action(
        &self,
        user_id: UserId,
        action: UserAction,
        ip: Option<&str>,
        user_agent: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO shop.user_log (user_id, action, ip, user_agent) VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(action)
        .bind(ip)
        .bind(user_agent)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// List activity log entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_logs(
        &self,
        filter: &UserLogFilter,
        page: Page,
    ) -> Result<Paginated<UserLog>, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM shop.user_log
            WHERE ($1::integer IS NULL OR user_id = $1)
              AND ($2::shop.user_action IS NULL OR action = $2)
            ",
        )
        .bind(filter.user_id)
        .bind(filter.action)
        .fetch_one(self.pool)
        .await?;

        let results = sqlx::query_as::<_, UserLog>(
            r"
            SELECT l.id, l.user_id, u.username, l.action, l.ip, l.user_agent, l.created_at
            FROM shop.user_log l
            JOIN shop.user u ON u.id = l.user_id
            WHERE ($1::integer IS NULL OR l.user_id = $1)
              AND ($2::shop.user_action IS NULL OR l.action = $2)
            ORDER BY l.created_at DESC, l.id DESC
            LIMIT $3 OFFSET $4
            ",
        )
        .bind(filter.user_id)
        .bind(filter.action)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await?;

        Ok(Paginated { count, results })
    }
}
