use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    sea_query::Expr,
};
use serde::Serialize;

use crate::entities::reviews;

#[derive(Debug, Clone, Serialize)]
pub struct Review {
    pub id: i32,
    pub author: String,
    pub body: String,
    pub rating: i32,
    pub status: String,
    pub created_at: String,
    pub moderated_at: Option<String>,
}

impl From<reviews::Model> for Review {
    fn from(model: reviews::Model) -> Self {
        Self {
            id: model.id,
            author: model.author,
            body: model.body,
            rating: model.rating,
            status: model.status,
            created_at: model.created_at,
            moderated_at: model.moderated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub author: String,
    pub body: String,
    pub rating: i32,
}

pub struct ReviewRepository {
    conn: DatabaseConnection,
}

impl ReviewRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, review: &NewReview) -> Result<Review> {
        let active = reviews::ActiveModel {
            author: Set(review.author.clone()),
            body: Set(review.body.clone()),
            rating: Set(review.rating),
            status: Set("pending".to_string()),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            moderated_at: Set(None),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert review")?;

        Ok(model.into())
    }

    pub async fn get(&self, id: i32) -> Result<Option<Review>> {
        let row = reviews::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query review")?;

        Ok(row.map(Review::from))
    }

    pub async fn list_by_status(&self, status: Option<&str>) -> Result<Vec<Review>> {
        let mut query = reviews::Entity::find().order_by_desc(reviews::Column::Id);

        if let Some(status) = status {
            query = query.filter(reviews::Column::Status.eq(status));
        }

        let rows = query.all(&self.conn).await.context("Failed to list reviews")?;
        Ok(rows.into_iter().map(Review::from).collect())
    }

    pub async fn set_status(&self, id: i32, status: &str) -> Result<bool> {
        let result = reviews::Entity::update_many()
            .col_expr(reviews::Column::Status, Expr::value(status.to_string()))
            .col_expr(
                reviews::Column::ModeratedAt,
                Expr::value(chrono::Utc::now().to_rfc3339()),
            )
            .filter(reviews::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to update review status")?;

        Ok(result.rows_affected > 0)
    }
}
