use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "crew_members")]
pub struct Model {
    /// 自然键，由上游数据源给出
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub name: String,
    pub rank: String,
    pub division: String,
    /// 上级引用，指向同表的另一行；根节点为空
    #[sea_orm(nullable)]
    pub manager_id: Option<i64>,
    pub salary: f64,
    pub source: String, // dev / prod
    pub fetched_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
