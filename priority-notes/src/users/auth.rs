use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rusqlite::{named_params, ErrorCode, Row};

use crate::{
    db::{self, DB},
    Error, Result,
};

use super::*;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Clone)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("name", &self.name)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("password_hash", &"[redacted]")
            .finish()
    }
}

impl<'a> TryFrom<&Row<'a>> for User {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'a>) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            password_hash: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            created_at: user.created_at,
        }
    }
}

impl From<&User> for crate::ctx::User {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
        }
    }
}

pub async fn register(db: DB, RegisterUser { email, password, name }: RegisterUser) -> Result<User> {
    let email = normalize_email(&email)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| Error::Unexpected(e.to_string()))??;

    let user = db
        .call(move |conn| {
            let now = chrono::Utc::now();
            let inserted = conn.query_row(
                r#"INSERT INTO users (email, name, password_hash, created_at) VALUES (:email, :name, :password_hash, :now)
                RETURNING id, email, name, password_hash, created_at, updated_at"#,
                named_params! {
                    ":email": email,
                    ":name": name,
                    ":password_hash": password_hash,
                    ":now": now,
                },
                |r| User::try_from(r),
            );

            match inserted {
                Ok(user) => Ok(user),
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                    Err(Error::Conflict("Email is already registered".into()).into())
                }
                Err(e) => Err(e.into()),
            }
        })
        .await?;

    tracing::info!("{} registered", user.email);

    Ok(user)
}

/// Looks the user up by email and checks the password.
/// Unknown emails and wrong passwords are indistinguishable to the caller.
pub async fn authenticate(db: DB, Credentials { email, password }: Credentials) -> Result<User> {
    let email = email.trim().to_lowercase();
    let user = match find_one_by_email(db, &email).await {
        Ok(user) => user,
        Err(db::Error::NotFound(_)) => return Err(Error::InvalidCredentials),
        Err(e) => return Err(e.into()),
    };

    let hash = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&hash, &password))
        .await
        .map_err(|e| Error::Unexpected(e.to_string()))?;

    if !verified {
        return Err(Error::InvalidCredentials);
    }

    Ok(user)
}

pub async fn find_one_by_id(db: DB, user_id: UserId) -> db::Result<User> {
    db.call(move |conn| {
        conn.query_row(
            "SELECT id, email, name, password_hash, created_at, updated_at FROM users WHERE id = ?",
            [user_id],
            |r| User::try_from(r),
        )
        .map_err(|e| e.into())
    })
    .await
    .map_err(db::Error::from)
    .map_err(|e| e.not_found_message(format!("User '{}' not found", user_id)))
}

pub async fn find_one_by_email(db: DB, email: &str) -> db::Result<User> {
    let user_email = email.to_owned();
    db.call(move |conn| {
        conn.query_row(
            "SELECT id, email, name, password_hash, created_at, updated_at FROM users WHERE email = ?",
            [user_email],
            |r| User::try_from(r),
        )
        .map_err(|e| e.into())
    })
    .await
    .map_err(db::Error::from)
    .map_err(|e| e.not_found_message(format!("User '{}' not found", email)))
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(Error::Validation("A valid email is required".into())),
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Unexpected(e.to_string()))
}

fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(hash) => Argon2::default().verify_password(password.as_bytes(), &hash).is_ok(),
        Err(e) => {
            tracing::warn!("stored password hash is malformed: {e}");
            false
        }
    }
}
