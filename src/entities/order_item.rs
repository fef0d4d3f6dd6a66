use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable order line, priced at order-creation time and never recomputed.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: String,
    pub name: String,
    #[sea_orm(nullable)]
    pub image: Option<String>,
    pub quantity: i32,
    /// Unit amount actually charged; 0 for free-gift lines.
    pub unit_amount: i64,
    pub total_amount: i64,
    pub is_free_gift: bool,
    /// Price/option snapshot taken at checkout. Free-gift lines keep the
    /// original unit amount here for audit and analytics.
    #[sea_orm(column_type = "Json", nullable)]
    pub snapshot: Option<Json>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
