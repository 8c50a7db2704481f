//! Reference list queries
//!
//! Active projects and spend categories, read-only to the pipeline.

use fieldbook_common::Result;
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, FromRow)]
pub struct ProjectRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct CategoryRef {
    pub id: i64,
    pub name: String,
}

pub async fn active_projects(pool: &SqlitePool) -> Result<Vec<ProjectRef>> {
    let projects =
        sqlx::query_as::<_, ProjectRef>("SELECT id, name FROM projects WHERE is_active = 1")
            .fetch_all(pool)
            .await?;
    Ok(projects)
}

pub async fn active_categories(pool: &SqlitePool) -> Result<Vec<CategoryRef>> {
    let categories = sqlx::query_as::<_, CategoryRef>(
        "SELECT id, name FROM categories WHERE is_active = 1 ORDER BY display_order",
    )
    .fetch_all(pool)
    .await?;
    Ok(categories)
}

/// Lookup a category by exact name, active or not (historical labels stay
/// resolvable after soft-deactivation).
pub async fn category_by_name(pool: &SqlitePool, name: &str) -> Result<Option<CategoryRef>> {
    let category =
        sqlx::query_as::<_, CategoryRef>("SELECT id, name FROM categories WHERE name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await?;
    Ok(category)
}
