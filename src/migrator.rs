use anyhow::Result;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::prelude::*;
use std::time::Duration;
use tracing::{error, info};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240401_000001_create_forecast_runs_table::Migration),
            Box::new(m20240401_000002_create_forecast_points_table::Migration),
            Box::new(m20240401_000003_create_forecast_metrics_table::Migration),
            Box::new(m20240401_000004_create_feature_metadata_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240401_000001_create_forecast_runs_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240401_000001_create_forecast_runs_table"
        }
    }

    #[async_trait::async_trait]
    #[allow(elided_lifetimes_in_paths)]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Append-only run log aligned with models::forecast_run
            manager
                .create_table(
                    Table::create()
                        .table(ForecastRuns::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ForecastRuns::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ForecastRuns::ModelName).string().not_null())
                        .col(ColumnDef::new(ForecastRuns::Identifier).string().null())
                        .col(
                            ColumnDef::new(ForecastRuns::TotalSeries)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(ForecastRuns::SummaryWmape).double().null())
                        .col(
                            ColumnDef::new(ForecastRuns::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_forecast_runs_model_name")
                        .table(ForecastRuns::Table)
                        .col(ForecastRuns::ModelName)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_forecast_runs_created_at")
                        .table(ForecastRuns::Table)
                        .col(ForecastRuns::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ForecastRuns::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ForecastRuns {
        Table,
        Id,
        ModelName,
        Identifier,
        TotalSeries,
        SummaryWmape,
        CreatedAt,
    }
}

mod m20240401_000002_create_forecast_points_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240401_000002_create_forecast_points_table"
        }
    }

    #[async_trait::async_trait]
    #[allow(elided_lifetimes_in_paths)]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ForecastPoints::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ForecastPoints::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ForecastPoints::RunId).uuid().not_null())
                        .col(
                            ColumnDef::new(ForecastPoints::TargetCode)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ForecastPoints::ForecastDate)
                                .date()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ForecastPoints::HorizonIndex)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ForecastPoints::PointEstimate)
                                .double()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ForecastPoints::LowerBound).double().null())
                        .col(ColumnDef::new(ForecastPoints::UpperBound).double().null())
                        .col(
                            ColumnDef::new(ForecastPoints::ModelName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ForecastPoints::GeneratedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_forecast_points_run_id")
                                .from(ForecastPoints::Table, ForecastPoints::RunId)
                                .to(ForecastRuns::Table, ForecastRuns::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_forecast_points_run_id")
                        .table(ForecastPoints::Table)
                        .col(ForecastPoints::RunId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_forecast_points_target_code")
                        .table(ForecastPoints::Table)
                        .col(ForecastPoints::TargetCode)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ForecastPoints::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ForecastPoints {
        Table,
        Id,
        RunId,
        TargetCode,
        ForecastDate,
        HorizonIndex,
        PointEstimate,
        LowerBound,
        UpperBound,
        ModelName,
        GeneratedAt,
    }

    #[derive(DeriveIden)]
    enum ForecastRuns {
        Table,
        Id,
    }
}

mod m20240401_000003_create_forecast_metrics_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240401_000003_create_forecast_metrics_table"
        }
    }

    #[async_trait::async_trait]
    #[allow(elided_lifetimes_in_paths)]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ForecastMetrics::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ForecastMetrics::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ForecastMetrics::Sku).string().not_null())
                        .col(
                            ColumnDef::new(ForecastMetrics::ModelName)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ForecastMetrics::Wmape).double().null())
                        .col(ColumnDef::new(ForecastMetrics::Bias).double().null())
                        .col(ColumnDef::new(ForecastMetrics::BiasPct).double().null())
                        .col(ColumnDef::new(ForecastMetrics::Fva).double().null())
                        .col(ColumnDef::new(ForecastMetrics::Mae).double().null())
                        .col(ColumnDef::new(ForecastMetrics::Rmse).double().null())
                        .col(ColumnDef::new(ForecastMetrics::Mape).double().null())
                        .col(ColumnDef::new(ForecastMetrics::SeriesMean).double().null())
                        .col(
                            ColumnDef::new(ForecastMetrics::CoefficientOfVariation)
                                .double()
                                .null(),
                        )
                        .col(ColumnDef::new(ForecastMetrics::Trend).double().null())
                        .col(
                            ColumnDef::new(ForecastMetrics::SeasonalStrength)
                                .double()
                                .null(),
                        )
                        .col(ColumnDef::new(ForecastMetrics::ZeroRatio).double().null())
                        .col(
                            ColumnDef::new(ForecastMetrics::Hyperparameters)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ForecastMetrics::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_forecast_metrics_sku")
                        .table(ForecastMetrics::Table)
                        .col(ForecastMetrics::Sku)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_forecast_metrics_model_name")
                        .table(ForecastMetrics::Table)
                        .col(ForecastMetrics::ModelName)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ForecastMetrics::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ForecastMetrics {
        Table,
        Id,
        Sku,
        ModelName,
        Wmape,
        Bias,
        BiasPct,
        Fva,
        Mae,
        Rmse,
        Mape,
        SeriesMean,
        CoefficientOfVariation,
        Trend,
        SeasonalStrength,
        ZeroRatio,
        Hyperparameters,
        CreatedAt,
    }
}

mod m20240401_000004_create_feature_metadata_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240401_000004_create_feature_metadata_table"
        }
    }

    #[async_trait::async_trait]
    #[allow(elided_lifetimes_in_paths)]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(FeatureMetadata::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(FeatureMetadata::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FeatureMetadata::FeatureName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FeatureMetadata::TableName)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(FeatureMetadata::Columns).json().not_null())
                        .col(ColumnDef::new(FeatureMetadata::DateStart).date().null())
                        .col(ColumnDef::new(FeatureMetadata::DateEnd).date().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_feature_metadata_feature_name")
                        .table(FeatureMetadata::Table)
                        .col(FeatureMetadata::FeatureName)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(FeatureMetadata::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum FeatureMetadata {
        Table,
        Id,
        FeatureName,
        TableName,
        Columns,
        DateStart,
        DateEnd,
    }
}

// Database migration CLI runner
pub async fn run_migration(db_url: &str) -> Result<()> {
    info!("Setting up database connection for migrations");

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(300))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;

    info!("Running database migrations");

    let result = Migrator::up(&db, None).await;

    match result {
        Ok(_) => {
            info!("Migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Migration failed: {}", e);
            Err(e.into())
        }
    }
}
