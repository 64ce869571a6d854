use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20260101_000001_create_jobs"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(
            r#"
            CREATE TABLE job (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id BIGINT NOT NULL,
                hpc_user VARCHAR(255) NOT NULL,
                project VARCHAR(255) NOT NULL,
                cluster VARCHAR(255) NOT NULL,
                subcluster VARCHAR(255) NOT NULL,
                cluster_partition VARCHAR(255) NOT NULL,
                array_job_id BIGINT NOT NULL DEFAULT 0,
                num_nodes INTEGER NOT NULL DEFAULT 0,
                num_hwthreads INTEGER NOT NULL DEFAULT 0,
                num_acc INTEGER NOT NULL DEFAULT 0,
                shared VARCHAR(64) NOT NULL DEFAULT 'none',
                monitoring_status INTEGER NOT NULL DEFAULT 0,
                smt INTEGER NOT NULL DEFAULT 0,
                job_state VARCHAR(32) NOT NULL,
                start_time BIGINT NOT NULL,
                duration BIGINT NOT NULL DEFAULT 0,
                walltime BIGINT NOT NULL DEFAULT 0,
                resources TEXT NOT NULL,
                footprint TEXT NOT NULL,
                energy DOUBLE PRECISION NOT NULL DEFAULT 0,
                energy_footprint TEXT NOT NULL,
                meta_data TEXT NOT NULL,
                CONSTRAINT job_id_cluster_start_time_unique UNIQUE (job_id, cluster, start_time)
            )
            "#,
        )
        .await?;
        db.execute_unprepared("CREATE INDEX job_hpc_user_idx ON job (hpc_user)")
            .await?;
        db.execute_unprepared("CREATE INDEX job_project_idx ON job (project)")
            .await?;
        db.execute_unprepared("CREATE INDEX job_job_state_idx ON job (job_state)")
            .await?;
        db.execute_unprepared("CREATE INDEX job_start_time_idx ON job (start_time)")
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE job")
            .await?;
        Ok(())
    }
}
