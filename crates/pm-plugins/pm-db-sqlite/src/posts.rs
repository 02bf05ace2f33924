use async_trait::async_trait;
use pm_core::models::{Post, PostKind};
use pm_core::traits::{CreatePostOutcome, PostRepo, PromoteOutcome};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use crate::{blob_to_uuid, uuid_column, uuid_to_blob, SqliteStore};

/// Post columns with links, tags and promoters folded into JSON arrays.
const POST_SELECT: &str = "SELECT p.id, p.user_id, p.username, p.content, p.kind, p.promotions, p.created_at, \
    (SELECT json_group_array(l.link) FROM post_links l WHERE l.post_id = p.id) AS links, \
    (SELECT json_group_array(t.tag) FROM post_tags t WHERE t.post_id = p.id) AS tags, \
    (SELECT json_group_array(r.user_id) FROM post_promoters r WHERE r.post_id = p.id) AS promoted_by \
    FROM posts p";

fn post_from_row(row: &SqliteRow) -> anyhow::Result<Post> {
    let kind: String = row.try_get("kind")?;
    Ok(Post {
        id: uuid_column(row, "id")?,
        user_id: row.try_get("user_id")?,
        username: row.try_get("username")?,
        content: row.try_get("content")?,
        kind: kind.parse().map_err(anyhow::Error::msg)?,
        links: serde_json::from_str(&row.try_get::<String, _>("links")?)?,
        tags: serde_json::from_str(&row.try_get::<String, _>("tags")?)?,
        promotions: row.try_get("promotions")?,
        promoted_by: serde_json::from_str(&row.try_get::<String, _>("promoted_by")?)?,
        created_at: row.try_get("created_at")?,
    })
}

async fn fetch_post<'e, E>(executor: E, id: Uuid) -> anyhow::Result<Option<Post>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("{POST_SELECT} WHERE p.id = ?");
    let row = sqlx::query(&sql)
        .bind(uuid_to_blob(id))
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(post_from_row).transpose()
}

async fn insert_links_and_tags(
    conn: &mut SqliteConnection,
    id: Uuid,
    links: &[String],
    tags: &[String],
) -> anyhow::Result<()> {
    for (position, link) in links.iter().enumerate() {
        sqlx::query("INSERT INTO post_links (post_id, position, link) VALUES (?, ?, ?)")
            .bind(uuid_to_blob(id))
            .bind(position as i64)
            .bind(link)
            .execute(&mut *conn)
            .await?;
    }
    for (position, tag) in tags.iter().enumerate() {
        sqlx::query("INSERT INTO post_tags (post_id, position, tag) VALUES (?, ?, ?)")
            .bind(uuid_to_blob(id))
            .bind(position as i64)
            .bind(tag)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

impl SqliteStore {
    async fn fetch_posts(&self, filter: &str, bind: Option<&str>) -> anyhow::Result<Vec<Post>> {
        let sql = format!("{POST_SELECT} {filter} ORDER BY p.created_at DESC, p.rowid DESC");
        let mut query = sqlx::query(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(post_from_row).collect()
    }
}

#[async_trait]
impl PostRepo for SqliteStore {
    async fn create_post(&self, post: &Post) -> anyhow::Result<CreatePostOutcome> {
        let mut tx = self.pool.begin().await?;

        // Inserting first takes the write lock, so the duplicate check below
        // cannot race another create.
        sqlx::query(
            "INSERT INTO posts (id, user_id, username, content, kind, promotions, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(post.id))
        .bind(post.user_id)
        .bind(&post.username)
        .bind(&post.content)
        .bind(post.kind.as_str())
        .bind(post.promotions)
        .bind(post.created_at)
        .execute(&mut *tx)
        .await?;

        insert_links_and_tags(&mut *tx, post.id, &post.links, &post.tags).await?;

        for link in &post.links {
            let holder: Option<Vec<u8>> = sqlx::query_scalar(
                "SELECT post_id FROM post_links WHERE link = ? AND post_id <> ? LIMIT 1",
            )
            .bind(link)
            .bind(uuid_to_blob(post.id))
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(blob) = holder {
                let existing = fetch_post(&mut *tx, blob_to_uuid(&blob)?).await?;
                tx.rollback().await?;
                let existing = existing
                    .ok_or_else(|| anyhow::anyhow!("post holding link {} vanished", link))?;
                return Ok(CreatePostOutcome::Duplicate {
                    link: link.clone(),
                    existing,
                });
            }
        }

        tx.commit().await?;
        Ok(CreatePostOutcome::Created(post.clone()))
    }

    async fn get_post(&self, id: Uuid) -> anyhow::Result<Option<Post>> {
        fetch_post(&self.pool, id).await
    }

    async fn list_recent(&self) -> anyhow::Result<Vec<Post>> {
        self.fetch_posts("", None).await
    }

    async fn list_by_tag(&self, tag: &str) -> anyhow::Result<Vec<Post>> {
        self.fetch_posts(
            "WHERE EXISTS (SELECT 1 FROM post_tags t WHERE t.post_id = p.id AND t.tag = ?)",
            Some(tag),
        )
        .await
    }

    async fn find_by_link(&self, link: &str) -> anyhow::Result<Option<Post>> {
        let posts = self
            .fetch_posts(
                "WHERE EXISTS (SELECT 1 FROM post_links l WHERE l.post_id = p.id AND l.link = ?)",
                Some(link),
            )
            .await?;
        Ok(posts.into_iter().next())
    }

    async fn update_content(
        &self,
        id: Uuid,
        content: &str,
        kind: PostKind,
        links: &[String],
        tags: &[String],
    ) -> anyhow::Result<Option<Post>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE posts SET content = ?, kind = ? WHERE id = ?")
            .bind(content)
            .bind(kind.as_str())
            .bind(uuid_to_blob(id))
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query("DELETE FROM post_links WHERE post_id = ?")
            .bind(uuid_to_blob(id))
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
            .bind(uuid_to_blob(id))
            .execute(&mut *tx)
            .await?;
        insert_links_and_tags(&mut *tx, id, links, tags).await?;

        let post = fetch_post(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(post)
    }

    async fn delete_post(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(uuid_to_blob(id))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn promote(&self, id: Uuid, user_id: i64) -> anyhow::Result<PromoteOutcome> {
        let mut tx = self.pool.begin().await?;

        // The (post_id, user_id) key admits each promoter once.
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO post_promoters (post_id, user_id, promoted_at) \
             SELECT id, ?, ? FROM posts WHERE id = ?",
        )
        .bind(user_id)
        .bind(chrono::Utc::now())
        .bind(uuid_to_blob(id))
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 1 {
            sqlx::query("UPDATE posts SET promotions = promotions + 1 WHERE id = ?")
                .bind(uuid_to_blob(id))
                .execute(&mut *tx)
                .await?;
            let post = fetch_post(&mut *tx, id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("promoted post {} vanished", id))?;
            tx.commit().await?;
            return Ok(PromoteOutcome::Promoted(post));
        }

        let current = fetch_post(&mut *tx, id).await?;
        tx.rollback().await?;
        Ok(match current {
            Some(post) => PromoteOutcome::AlreadyPromoted(post),
            None => PromoteOutcome::NotFound,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post(content: &str, links: &[&str], tags: &[&str]) -> Post {
        let links: Vec<String> = links.iter().map(|l| l.to_string()).collect();
        Post {
            id: Uuid::now_v7(),
            user_id: 21,
            username: "brock".into(),
            content: content.into(),
            kind: PostKind::for_links(&links),
            links,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            promotions: 0,
            promoted_by: vec![],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_post_hydrates_links_and_tags() {
        let store = SqliteStore::new("sqlite::memory:").await.unwrap();
        let draft = post(
            "https://a.example https://b.example",
            &["https://a.example", "https://b.example"],
            &["rust"],
        );
        assert!(matches!(
            store.create_post(&draft).await.unwrap(),
            CreatePostOutcome::Created(_)
        ));

        let loaded = store.get_post(draft.id).await.unwrap().unwrap();
        assert_eq!(loaded.links, draft.links);
        assert_eq!(loaded.tags, vec!["rust".to_string()]);
        assert_eq!(loaded.kind, PostKind::Url);
        assert!(loaded.promoted_by.is_empty());

        assert_eq!(store.list_by_tag("rust").await.unwrap().len(), 1);
        assert!(store.list_by_tag("go").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_link_is_rejected_without_writing() {
        let store = SqliteStore::new("sqlite::memory:").await.unwrap();
        let first = post("https://dup.example", &["https://dup.example"], &[]);
        store.create_post(&first).await.unwrap();

        let second = post("again https://dup.example", &["https://dup.example"], &[]);
        match store.create_post(&second).await.unwrap() {
            CreatePostOutcome::Duplicate { link, existing } => {
                assert_eq!(link, "https://dup.example");
                assert_eq!(existing.id, first.id);
            }
            other => panic!("expected duplicate, got {:?}", other),
        }
        assert!(store.get_post(second.id).await.unwrap().is_none());
        assert_eq!(store.list_recent().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_promote_once_per_user() {
        let store = SqliteStore::new("sqlite::memory:").await.unwrap();
        let draft = post("hello", &[], &[]);
        store.create_post(&draft).await.unwrap();

        let first = store.promote(draft.id, 99).await.unwrap();
        assert!(matches!(first, PromoteOutcome::Promoted(ref p) if p.promotions == 1 && p.promoted_by == vec![99]));

        let again = store.promote(draft.id, 99).await.unwrap();
        assert!(matches!(again, PromoteOutcome::AlreadyPromoted(ref p) if p.promotions == 1));

        assert_eq!(
            store.promote(Uuid::now_v7(), 99).await.unwrap(),
            PromoteOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_update_replaces_links_and_delete_cascades() {
        let store = SqliteStore::new("sqlite::memory:").await.unwrap();
        let draft = post("https://old.example", &["https://old.example"], &["a"]);
        store.create_post(&draft).await.unwrap();

        let updated = store
            .update_content(draft.id, "just text", PostKind::Text, &[], &["b".into()])
            .await
            .unwrap()
            .unwrap();
        assert!(updated.links.is_empty());
        assert_eq!(updated.tags, vec!["b".to_string()]);
        assert!(store.find_by_link("https://old.example").await.unwrap().is_none());

        assert!(store.delete_post(draft.id).await.unwrap());
        assert!(!store.delete_post(draft.id).await.unwrap());
        assert!(store
            .update_content(draft.id, "x", PostKind::Text, &[], &[])
            .await
            .unwrap()
            .is_none());
    }
}
