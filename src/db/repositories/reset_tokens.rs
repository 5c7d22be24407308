use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait, sea_query::Expr,
};

use super::credentials::update_password_hash_on;
use crate::entities::password_reset_tokens;

/// Result of trying to spend a reset token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemOutcome {
    Redeemed { email: String },
    NotFound,
    AlreadyUsed,
    Expired,
}

/// Read-only view of a token's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Valid { email: String },
    NotFound,
    AlreadyUsed,
    Expired,
}

pub struct ResetTokenRepository {
    conn: DatabaseConnection,
}

impl ResetTokenRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, email: &str, token_hash: &str, expires_at: i64) -> Result<()> {
        let active = password_reset_tokens::ActiveModel {
            email: Set(email.to_string()),
            token_hash: Set(token_hash.to_string()),
            expires_at: Set(expires_at),
            used: Set(false),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        active
            .insert(&self.conn)
            .await
            .context("Failed to store password reset token")?;

        Ok(())
    }

    pub async fn state(&self, token_hash: &str, now: i64) -> Result<TokenState> {
        let row = password_reset_tokens::Entity::find()
            .filter(password_reset_tokens::Column::TokenHash.eq(token_hash))
            .one(&self.conn)
            .await
            .context("Failed to query password reset token")?;

        Ok(match row {
            None => TokenState::NotFound,
            Some(row) if row.used => TokenState::AlreadyUsed,
            Some(row) if now >= row.expires_at => TokenState::Expired,
            Some(row) => TokenState::Valid { email: row.email },
        })
    }

    /// Marks the token used and stores the new password hash in one transaction.
    ///
    /// The conditional `used` flip is the first statement, so the transaction
    /// takes the write lock before reading anything and a concurrent redemption
    /// waits instead of failing on a stale snapshot. Exactly one caller sees one
    /// affected row. If the credential update does not land, the transaction is
    /// dropped and the token stays unused.
    pub async fn redeem(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: i64,
    ) -> Result<RedeemOutcome> {
        let txn = self
            .conn
            .begin()
            .await
            .context("Failed to begin reset transaction")?;

        let consumed = password_reset_tokens::Entity::update_many()
            .col_expr(password_reset_tokens::Column::Used, Expr::value(true))
            .filter(password_reset_tokens::Column::TokenHash.eq(token_hash))
            .filter(password_reset_tokens::Column::Used.eq(false))
            .filter(password_reset_tokens::Column::ExpiresAt.gt(now))
            .exec(&txn)
            .await
            .context("Failed to consume password reset token")?;

        let row = password_reset_tokens::Entity::find()
            .filter(password_reset_tokens::Column::TokenHash.eq(token_hash))
            .one(&txn)
            .await
            .context("Failed to query password reset token")?;

        let Some(row) = row else {
            return Ok(RedeemOutcome::NotFound);
        };

        if consumed.rows_affected != 1 {
            return Ok(if now >= row.expires_at && !row.used {
                RedeemOutcome::Expired
            } else {
                RedeemOutcome::AlreadyUsed
            });
        }

        let updated = update_password_hash_on(&txn, &row.email, new_password_hash).await?;
        if !updated {
            anyhow::bail!("Reset token refers to a missing admin credential");
        }

        txn.commit()
            .await
            .context("Failed to commit reset transaction")?;

        Ok(RedeemOutcome::Redeemed { email: row.email })
    }

    /// Deletes expired or used tokens. Returns the number of rows removed.
    pub async fn purge(&self, now: i64) -> Result<u64> {
        let result = password_reset_tokens::Entity::delete_many()
            .filter(
                Condition::any()
                    .add(password_reset_tokens::Column::ExpiresAt.lte(now))
                    .add(password_reset_tokens::Column::Used.eq(true)),
            )
            .exec(&self.conn)
            .await
            .context("Failed to purge password reset tokens")?;

        Ok(result.rows_affected)
    }
}
