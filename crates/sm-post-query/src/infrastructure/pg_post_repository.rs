//! `PostgreSQL` implementation of the `PostRepository` trait.

use std::collections::HashMap;

use async_trait::async_trait;
use sm_post_core::error::DomainError;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::entities::{CommentEntity, PostEntity};
use crate::domain::repositories::PostRepository;

const POST_COLUMNS: &str = "post_id, author, message, date_posted, likes, version";

const SELECT_COMMENTS_FOR_POSTS: &str = r"
SELECT comment_id, post_id, username, comment, comment_date, is_edited
FROM comments
WHERE post_id = ANY($1)
ORDER BY comment_date ASC, comment_id ASC
";

const INSERT_POST: &str = r"
INSERT INTO posts (post_id, author, message, date_posted, likes, version)
VALUES ($1, $2, $3, $4, $5, $6)
";

const UPSERT_POST: &str = r"
INSERT INTO posts (post_id, author, message, date_posted, likes, version)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (post_id) DO UPDATE
SET author = EXCLUDED.author,
    message = EXCLUDED.message,
    date_posted = EXCLUDED.date_posted,
    likes = EXCLUDED.likes,
    version = EXCLUDED.version
";

const DELETE_COMMENTS: &str = "DELETE FROM comments WHERE post_id = $1";

const INSERT_COMMENT: &str = r"
INSERT INTO comments (comment_id, post_id, username, comment, comment_date, is_edited)
VALUES ($1, $2, $3, $4, $5, $6)
";

const DELETE_POST: &str = "DELETE FROM posts WHERE post_id = $1";

const UPSERT_REMOVED_POST: &str = r"
INSERT INTO removed_posts (post_id, version)
VALUES ($1, $2)
ON CONFLICT (post_id) DO UPDATE
SET version = GREATEST(removed_posts.version, EXCLUDED.version)
";

const SELECT_REMOVED_VERSION: &str = "SELECT version FROM removed_posts WHERE post_id = $1";

/// PostgreSQL-backed read store over the `posts` and `comments` tables.
#[derive(Debug, Clone)]
pub struct PgPostRepository {
    pool: PgPool,
}

impl PgPostRepository {
    /// Creates a new `PgPostRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_posts(
        &self,
        filter: &str,
        bind: Option<Bind<'_>>,
    ) -> Result<Vec<PostEntity>, DomainError> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts {filter} ORDER BY date_posted ASC, post_id ASC"
        );
        let query = sqlx::query(&sql);
        let query = match bind {
            Some(Bind::Id(id)) => query.bind(id),
            Some(Bind::Text(text)) => query.bind(text),
            Some(Bind::Int(n)) => query.bind(n),
            None => query,
        };
        let rows = query.fetch_all(&self.pool).await.map_err(infrastructure)?;
        let mut posts = rows
            .iter()
            .map(post_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(infrastructure)?;
        self.attach_comments(&mut posts).await?;
        Ok(posts)
    }

    async fn attach_comments(&self, posts: &mut [PostEntity]) -> Result<(), DomainError> {
        if posts.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = posts.iter().map(|p| p.post_id).collect();
        let rows = sqlx::query(SELECT_COMMENTS_FOR_POSTS)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;

        let mut by_post: HashMap<Uuid, Vec<CommentEntity>> = HashMap::new();
        for row in &rows {
            let comment = comment_from_row(row).map_err(infrastructure)?;
            by_post.entry(comment.post_id).or_default().push(comment);
        }
        for post in posts.iter_mut() {
            post.comments = by_post.remove(&post.post_id).unwrap_or_default();
        }
        Ok(())
    }
}

enum Bind<'a> {
    Id(Uuid),
    Text(&'a str),
    Int(i32),
}

fn infrastructure(e: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("read model database error: {e}"))
}

fn post_from_row(row: &PgRow) -> Result<PostEntity, sqlx::Error> {
    Ok(PostEntity {
        post_id: row.try_get("post_id")?,
        author: row.try_get("author")?,
        message: row.try_get("message")?,
        date_posted: row.try_get("date_posted")?,
        likes: row.try_get("likes")?,
        comments: Vec::new(),
        version: row.try_get("version")?,
    })
}

fn comment_from_row(row: &PgRow) -> Result<CommentEntity, sqlx::Error> {
    Ok(CommentEntity {
        comment_id: row.try_get("comment_id")?,
        post_id: row.try_get("post_id")?,
        username: row.try_get("username")?,
        comment: row.try_get("comment")?,
        comment_date: row.try_get("comment_date")?,
        is_edited: row.try_get("is_edited")?,
    })
}

async fn write_post(
    tx: &mut Transaction<'_, Postgres>,
    sql: &str,
    post: &PostEntity,
) -> Result<(), sqlx::Error> {
    sqlx::query(sql)
        .bind(post.post_id)
        .bind(&post.author)
        .bind(&post.message)
        .bind(post.date_posted)
        .bind(post.likes)
        .bind(post.version)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn write_comments(
    tx: &mut Transaction<'_, Postgres>,
    post: &PostEntity,
) -> Result<(), sqlx::Error> {
    for comment in &post.comments {
        sqlx::query(INSERT_COMMENT)
            .bind(comment.comment_id)
            .bind(post.post_id)
            .bind(&comment.username)
            .bind(&comment.comment)
            .bind(comment.comment_date)
            .bind(comment.is_edited)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl PostRepository for PgPostRepository {
    async fn create(&self, post: &PostEntity) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(infrastructure)?;
        if let Err(e) = write_post(&mut tx, INSERT_POST, post).await {
            if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
                return Err(DomainError::InvalidState(format!(
                    "post view {} already exists",
                    post.post_id
                )));
            }
            return Err(infrastructure(e));
        }
        write_comments(&mut tx, post).await.map_err(infrastructure)?;
        tx.commit().await.map_err(infrastructure)
    }

    async fn update(&self, post: &PostEntity) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(infrastructure)?;
        write_post(&mut tx, UPSERT_POST, post)
            .await
            .map_err(infrastructure)?;
        sqlx::query(DELETE_COMMENTS)
            .bind(post.post_id)
            .execute(&mut *tx)
            .await
            .map_err(infrastructure)?;
        write_comments(&mut tx, post).await.map_err(infrastructure)?;
        tx.commit().await.map_err(infrastructure)
    }

    async fn delete(&self, post_id: Uuid, version: i64) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(infrastructure)?;
        sqlx::query(DELETE_POST)
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .map_err(infrastructure)?;
        sqlx::query(UPSERT_REMOVED_POST)
            .bind(post_id)
            .bind(version)
            .execute(&mut *tx)
            .await
            .map_err(infrastructure)?;
        tx.commit().await.map_err(infrastructure)
    }

    async fn removed_version(&self, post_id: Uuid) -> Result<Option<i64>, DomainError> {
        sqlx::query_scalar::<_, i64>(SELECT_REMOVED_VERSION)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)
    }

    async fn get_by_id(&self, post_id: Uuid) -> Result<Option<PostEntity>, DomainError> {
        Ok(self
            .fetch_posts("WHERE post_id = $1", Some(Bind::Id(post_id)))
            .await?
            .into_iter()
            .next())
    }

    async fn get_all(&self) -> Result<Vec<PostEntity>, DomainError> {
        self.fetch_posts("", None).await
    }

    async fn get_by_author(&self, author: &str) -> Result<Vec<PostEntity>, DomainError> {
        self.fetch_posts("WHERE strpos(author, $1) > 0", Some(Bind::Text(author)))
            .await
    }

    async fn get_with_likes(&self, likes: i32) -> Result<Vec<PostEntity>, DomainError> {
        self.fetch_posts("WHERE likes >= $1", Some(Bind::Int(likes)))
            .await
    }

    async fn get_with_comments(&self) -> Result<Vec<PostEntity>, DomainError> {
        self.fetch_posts(
            "WHERE EXISTS (SELECT 1 FROM comments c WHERE c.post_id = posts.post_id)",
            None,
        )
        .await
    }
}
