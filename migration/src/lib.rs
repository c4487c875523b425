pub use sea_orm_migration::prelude::*;

mod m20261001_000001_create_subscriptions;
mod m20261001_000002_create_vouchers;
mod m20261001_000003_create_coupons;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_subscriptions::Migration),
            Box::new(m20261001_000002_create_vouchers::Migration),
            Box::new(m20261001_000003_create_coupons::Migration),
        ]
    }
}
