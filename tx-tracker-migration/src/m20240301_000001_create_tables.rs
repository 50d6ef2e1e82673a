use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            CREATE TYPE "origin_tx_status" AS ENUM (
                'confirmed',
                'internal-error'
            );

            CREATE TABLE "vaas" (
                "id" varchar PRIMARY KEY,
                "emitter_chain" integer NOT NULL,
                "emitter_address" varchar NOT NULL,
                "sequence" varchar NOT NULL,
                "tx_hash" varchar,
                "timestamp" timestamp NOT NULL,
                "vaa" bytea,
                "indexed_at" timestamp NOT NULL DEFAULT (now())
            );

            CREATE INDEX "vaas_timestamp_id_index" ON "vaas" ("timestamp" DESC, "id" ASC);

            CREATE TABLE "global_transactions" (
                "id" varchar PRIMARY KEY,
                "origin_status" origin_tx_status,
                "origin_native_tx_hash" varchar,
                "origin_from" varchar,
                "origin_timestamp" timestamp,
                "origin_attribute" jsonb,
                "destination_tx" jsonb,
                "created_at" timestamp NOT NULL DEFAULT (now()),
                "updated_at" timestamp NOT NULL DEFAULT (now())
            );

            CREATE INDEX "global_transactions_incomplete_index" ON "global_transactions" ("id")
                WHERE "origin_status" IS NULL OR "origin_status" = 'internal-error';

            COMMENT ON TABLE "vaas" IS 'Raw cross-chain messages keyed by chain/emitter/sequence';

            COMMENT ON TABLE "global_transactions" IS 'Resolved origin and destination transactions of each message';

            COMMENT ON COLUMN "global_transactions"."origin_status" IS 'NULL while the origin transaction has not been resolved';
        "#;
        crate::from_sql(manager, sql).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            DROP TABLE "global_transactions";
            DROP TABLE "vaas";
            DROP TYPE "origin_tx_status";
        "#;

        crate::from_sql(manager, sql).await
    }
}
