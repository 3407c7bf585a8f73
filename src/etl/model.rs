use crate::config::{ConfigError, SourceKind};
use crate::fetch::model::FetchError;
use crate::storage::repository::PersistenceError;
use crate::transform::TransformWarning;
use thiserror::Error;

/// 一次完整管道运行的汇总
#[derive(Debug)]
pub struct EtlReport {
    pub source: SourceKind,
    pub fetched: usize,
    pub filtered_out: usize,
    pub enriched: usize,
    pub enrich_failures: usize,
    pub inserted: usize,
    pub updated: usize,
    pub warnings: Vec<TransformWarning>,
}

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    #[error("抓取失败: {0}")]
    Fetch(#[from] FetchError),
    #[error("持久化失败: {0}")]
    Persistence(#[from] PersistenceError),
}
