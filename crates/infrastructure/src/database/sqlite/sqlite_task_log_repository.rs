use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use clusterops_domain::{OpsError, OpsResult, TaskLogEntry, TaskLogRepository};

pub struct SqliteTaskLogRepository {
    pool: SqlitePool,
}

impl SqliteTaskLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 建表与索引，幂等，进程启动时调用一次
    pub async fn initialize_schema(&self) -> OpsResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                cluster_id TEXT NOT NULL,
                node_id TEXT,
                token TEXT NOT NULL,
                status TEXT NOT NULL,
                params TEXT NOT NULL,
                operator TEXT NOT NULL,
                oper_type TEXT NOT NULL,
                task_id TEXT,
                is_polling INTEGER NOT NULL DEFAULT 0,
                is_finished INTEGER NOT NULL DEFAULT 0,
                log TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_task_logs_cluster_id ON task_logs (cluster_id)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_task_log(row: &sqlx::sqlite::SqliteRow) -> OpsResult<TaskLogEntry> {
        let params: String = row.try_get("params")?;
        Ok(TaskLogEntry {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            cluster_id: row.try_get("cluster_id")?,
            node_id: row.try_get("node_id")?,
            token: row.try_get("token")?,
            status: row.try_get("status")?,
            params: serde_json::from_str(&params)?,
            operator: row.try_get("operator")?,
            oper_type: row.try_get("oper_type")?,
            task_id: row.try_get("task_id")?,
            is_polling: row.try_get("is_polling")?,
            is_finished: row.try_get("is_finished")?,
            log: row.try_get("log")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl TaskLogRepository for SqliteTaskLogRepository {
    #[instrument(skip(self, entry), fields(
        cluster_id = %entry.cluster_id,
        oper_type = ?entry.oper_type,
    ))]
    async fn create(&self, entry: &TaskLogEntry) -> OpsResult<TaskLogEntry> {
        let params = serde_json::to_string(&entry.params)?;
        let row = sqlx::query(
            r#"
            INSERT INTO task_logs (project_id, cluster_id, node_id, token, status, params,
                                   operator, oper_type, task_id, is_polling, is_finished, log,
                                   created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING id, project_id, cluster_id, node_id, token, status, params,
                      operator, oper_type, task_id, is_polling, is_finished, log,
                      created_at, updated_at
            "#,
        )
        .bind(&entry.project_id)
        .bind(&entry.cluster_id)
        .bind(&entry.node_id)
        .bind(&entry.token)
        .bind(entry.status)
        .bind(&params)
        .bind(&entry.operator)
        .bind(entry.oper_type)
        .bind(&entry.task_id)
        .bind(entry.is_polling)
        .bind(entry.is_finished)
        .bind(&entry.log)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .fetch_one(&self.pool)
        .await?;

        let created = Self::row_to_task_log(&row)?;
        debug!("创建任务记录成功: ID {}", created.id);
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> OpsResult<Option<TaskLogEntry>> {
        let row = sqlx::query(
            "SELECT id, project_id, cluster_id, node_id, token, status, params,
                    operator, oper_type, task_id, is_polling, is_finished, log,
                    created_at, updated_at
             FROM task_logs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_task_log(&row)?)),
            None => Ok(None),
        }
    }

    async fn latest_for_cluster(&self, cluster_id: &str) -> OpsResult<Option<TaskLogEntry>> {
        let row = sqlx::query(
            "SELECT id, project_id, cluster_id, node_id, token, status, params,
                    operator, oper_type, task_id, is_polling, is_finished, log,
                    created_at, updated_at
             FROM task_logs WHERE cluster_id = $1 ORDER BY id DESC LIMIT 1",
        )
        .bind(cluster_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_task_log(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_by_cluster(&self, cluster_id: &str) -> OpsResult<Vec<TaskLogEntry>> {
        let rows = sqlx::query(
            "SELECT id, project_id, cluster_id, node_id, token, status, params,
                    operator, oper_type, task_id, is_polling, is_finished, log,
                    created_at, updated_at
             FROM task_logs WHERE cluster_id = $1 ORDER BY id DESC",
        )
        .bind(cluster_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_task_log).collect()
    }

    async fn update(&self, entry: &TaskLogEntry) -> OpsResult<()> {
        let params = serde_json::to_string(&entry.params)?;
        let result = sqlx::query(
            r#"
            UPDATE task_logs
            SET status = $2, params = $3, task_id = $4, is_polling = $5,
                is_finished = $6, log = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(entry.id)
        .bind(entry.status)
        .bind(&params)
        .bind(&entry.task_id)
        .bind(entry.is_polling)
        .bind(entry.is_finished)
        .bind(&entry.log)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OpsError::task_log_not_found(entry.id));
        }

        debug!("更新任务记录成功: ID {}", entry.id);
        Ok(())
    }
}
