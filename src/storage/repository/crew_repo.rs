use crate::storage::entity::crew_member::{
    ActiveModel as CrewActiveModel, Column as CrewColumn, Entity as CrewMember,
    Model as CrewModel,
};
use crate::transform::CrewRecord;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("数据库错误: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("成员 {member} 的上级 {manager} 不存在于库中或本批数据中")]
    DanglingManager { member: i64, manager: i64 },
    #[error("成员 {0} 不能以自己为上级")]
    SelfManager(i64),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
}

pub struct CrewRepository;

impl CrewRepository {
    /// 单事务批量 upsert
    ///
    /// 两遍写入：第一遍按自然键插入或更新所有行（上级引用先置空），
    /// 第二遍统一回填上级链接并校验引用。任何一条校验失败都会回滚
    /// 整个批次，并发读者不会看到半写状态。
    pub async fn upsert_batch(
        db: &DatabaseConnection,
        records: &[CrewRecord],
    ) -> Result<UpsertStats, PersistenceError> {
        if records.is_empty() {
            return Ok(UpsertStats::default());
        }

        // 批内同键去重，保留最后一条
        let mut by_id: BTreeMap<i64, &CrewRecord> = BTreeMap::new();
        for record in records {
            by_id.insert(record.id, record);
        }

        let now = Utc::now().timestamp();
        let txn = db.begin().await?;

        let ids: Vec<i64> = by_id.keys().copied().collect();
        let existing: HashSet<i64> = CrewMember::find()
            .filter(CrewColumn::Id.is_in(ids))
            .all(&txn)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();

        // 第一遍：上级引用置空落行
        let mut stats = UpsertStats::default();
        for record in by_id.values() {
            if existing.contains(&record.id) {
                CrewMember::update_many()
                    .col_expr(CrewColumn::Name, Expr::value(record.name.clone()))
                    .col_expr(CrewColumn::Rank, Expr::value(record.rank.clone()))
                    .col_expr(CrewColumn::Division, Expr::value(record.division.clone()))
                    .col_expr(CrewColumn::ManagerId, Expr::value(Option::<i64>::None))
                    .col_expr(CrewColumn::Salary, Expr::value(record.salary))
                    .col_expr(
                        CrewColumn::Source,
                        Expr::value(record.source.as_str().to_string()),
                    )
                    .col_expr(CrewColumn::FetchedAt, Expr::value(record.fetched_at))
                    .col_expr(CrewColumn::UpdatedAt, Expr::value(now))
                    .filter(CrewColumn::Id.eq(record.id))
                    .exec(&txn)
                    .await?;
                stats.updated += 1;
            } else {
                let model = CrewActiveModel {
                    id: Set(record.id),
                    name: Set(record.name.clone()),
                    rank: Set(record.rank.clone()),
                    division: Set(record.division.clone()),
                    manager_id: Set(None),
                    salary: Set(record.salary),
                    source: Set(record.source.as_str().to_string()),
                    fetched_at: Set(record.fetched_at),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                CrewMember::insert(model).exec(&txn).await?;
                stats.inserted += 1;
            }
        }

        // 第一遍之后库内已包含本批所有行，一次查询即可校验全部上级引用
        let manager_refs: Vec<i64> = by_id
            .values()
            .filter_map(|r| r.manager_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let present: HashSet<i64> = CrewMember::find()
            .filter(CrewColumn::Id.is_in(manager_refs))
            .all(&txn)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();

        // 第二遍：回填上级链接
        for record in by_id.values() {
            let Some(manager) = record.manager_id else {
                continue;
            };
            if manager == record.id {
                txn.rollback().await?;
                return Err(PersistenceError::SelfManager(record.id));
            }
            if !present.contains(&manager) {
                txn.rollback().await?;
                return Err(PersistenceError::DanglingManager {
                    member: record.id,
                    manager,
                });
            }
            CrewMember::update_many()
                .col_expr(CrewColumn::ManagerId, Expr::value(Some(manager)))
                .filter(CrewColumn::Id.eq(record.id))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(stats)
    }

    /// 读取全部成员，按自然键升序
    pub async fn load_all(db: &DatabaseConnection) -> Result<Vec<CrewModel>, sea_orm::DbErr> {
        CrewMember::find()
            .order_by_asc(CrewColumn::Id)
            .all(db)
            .await
    }

    pub async fn count(db: &DatabaseConnection) -> Result<u64, sea_orm::DbErr> {
        use sea_orm::PaginatorTrait;
        CrewMember::find().count(db).await
    }

    /// 清空表。管道自身从不删除数据，删除是显式的外部操作。
    pub async fn delete_all(db: &DatabaseConnection) -> Result<u64, sea_orm::DbErr> {
        let res = CrewMember::delete_many().exec(db).await?;
        Ok(res.rows_affected)
    }
}
