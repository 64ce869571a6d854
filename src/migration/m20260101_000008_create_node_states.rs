use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20260101_000008_create_node_states"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(
            r#"
            CREATE TABLE node_state (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                node_id BIGINT NOT NULL,
                time_stamp BIGINT NOT NULL,
                node_state VARCHAR(64) NOT NULL,
                health_state VARCHAR(64) NOT NULL,
                cpus_allocated INTEGER NOT NULL DEFAULT 0,
                memory_allocated BIGINT NOT NULL DEFAULT 0,
                gpus_allocated INTEGER NOT NULL DEFAULT 0,
                jobs_running INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (node_id) REFERENCES node (id)
            )
            "#,
        )
        .await?;
        db.execute_unprepared(
            "CREATE INDEX node_state_node_id_time_stamp_idx ON node_state (node_id, time_stamp)",
        )
        .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE node_state")
            .await?;
        Ok(())
    }
}
