use serde::Serialize;
use thiserror::Error;

/// 单个成员的团队合计：本人薪资加上全部传递下属的薪资
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamTotal {
    pub id: i64,
    pub total: f64,
}

/// 一组构成闭环的成员
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleGroup {
    pub members: Vec<i64>,
}

/// 聚合输出：干净节点的合计（按 id 升序）加上被剔除的闭环报告
#[derive(Debug, Clone, Default)]
pub struct RollupReport {
    pub totals: Vec<TeamTotal>,
    pub cycles: Vec<CycleGroup>,
}

#[derive(Error, Debug)]
pub enum RollupError {
    #[error("上级链接存在闭环，无法完成聚合: {0:?}")]
    HierarchyCycle(Vec<i64>),
    #[error("数据库错误: {0}")]
    Db(#[from] sea_orm::DbErr),
}
