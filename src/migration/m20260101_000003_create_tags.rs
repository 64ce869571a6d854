use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20260101_000003_create_tags"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE tag (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    tag_type VARCHAR(255) NOT NULL,
                    tag_name VARCHAR(255) NOT NULL,
                    tag_scope VARCHAR(255) NOT NULL DEFAULT 'global',
                    CONSTRAINT tag_type_name_scope_unique UNIQUE (tag_type, tag_name, tag_scope)
                )
                "#,
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE tag")
            .await?;
        Ok(())
    }
}
